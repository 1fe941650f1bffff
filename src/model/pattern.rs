use std::fmt;

use super::{Term, Triple, Var};
use crate::query::binding::Binding;

/// One position of a triple pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PatternTerm {
    /// A variable to be bound.
    Var(Var),
    /// A constant term.
    Term(Term),
    /// A nested triple pattern (RDF-star quoted triple with variables).
    Triple(Box<TriplePattern>),
}

impl PatternTerm {
    /// A position is concrete when it holds no variable, transitively.
    pub fn is_concrete(&self) -> bool {
        match self {
            PatternTerm::Var(_) => false,
            PatternTerm::Term(_) => true,
            PatternTerm::Triple(nested) => nested.is_concrete(),
        }
    }

    /// Returns the variable at this position.
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            PatternTerm::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Converts a concrete position into a term.
    pub fn to_term(&self) -> Option<Term> {
        match self {
            PatternTerm::Var(_) => None,
            PatternTerm::Term(term) => Some(term.clone()),
            PatternTerm::Triple(nested) => nested.to_triple().map(|t| Term::Triple(Box::new(t))),
        }
    }

    /// `true` for a nested pattern that still contains variables.
    pub fn is_open_triple(&self) -> bool {
        matches!(self, PatternTerm::Triple(nested) if !nested.is_concrete())
    }

    /// Replaces bound variables with their values and folds concrete nested
    /// patterns into triple terms.
    pub fn substitute(&self, binding: &Binding) -> PatternTerm {
        match self {
            PatternTerm::Var(var) => match binding.get(var) {
                Some(term) => PatternTerm::Term(term.clone()),
                None => self.clone(),
            },
            PatternTerm::Term(_) => self.clone(),
            PatternTerm::Triple(nested) => {
                PatternTerm::Triple(Box::new(nested.substitute(binding))).normalize()
            }
        }
    }

    /// Folds a concrete nested pattern into a [`Term::Triple`].
    pub fn normalize(self) -> PatternTerm {
        match self {
            PatternTerm::Triple(nested) => {
                let nested = nested.normalize();
                match nested.to_triple() {
                    Some(triple) => PatternTerm::Term(Term::Triple(Box::new(triple))),
                    None => PatternTerm::Triple(Box::new(nested)),
                }
            }
            other => other,
        }
    }

    fn collect_vars(&self, out: &mut Vec<Var>) {
        match self {
            PatternTerm::Var(var) => {
                if !out.contains(var) {
                    out.push(var.clone());
                }
            }
            PatternTerm::Term(_) => {}
            PatternTerm::Triple(nested) => {
                nested.subject.collect_vars(out);
                nested.predicate.collect_vars(out);
                nested.object.collect_vars(out);
            }
        }
    }
}

impl From<Var> for PatternTerm {
    fn from(var: Var) -> Self {
        PatternTerm::Var(var)
    }
}

impl From<Term> for PatternTerm {
    fn from(term: Term) -> Self {
        PatternTerm::Term(term)
    }
}

impl From<TriplePattern> for PatternTerm {
    fn from(pattern: TriplePattern) -> Self {
        PatternTerm::Triple(Box::new(pattern)).normalize()
    }
}

impl fmt::Display for PatternTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternTerm::Var(var) => write!(f, "{var}"),
            PatternTerm::Term(term) => write!(f, "{term}"),
            PatternTerm::Triple(nested) => write!(f, "<< {nested} >>"),
        }
    }
}

/// A subject/predicate/object pattern. Predicates are never triple terms.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    /// Subject position.
    pub subject: PatternTerm,
    /// Predicate position.
    pub predicate: PatternTerm,
    /// Object position.
    pub object: PatternTerm,
}

impl TriplePattern {
    /// Creates a pattern, folding any concrete nested pattern into a term.
    pub fn new(
        subject: impl Into<PatternTerm>,
        predicate: impl Into<PatternTerm>,
        object: impl Into<PatternTerm>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
        .normalize()
    }

    /// No variables anywhere, including inside nested patterns.
    pub fn is_concrete(&self) -> bool {
        self.subject.is_concrete() && self.predicate.is_concrete() && self.object.is_concrete()
    }

    /// `true` when subject or object holds a nested pattern with variables.
    pub fn has_open_triple(&self) -> bool {
        self.subject.is_open_triple() || self.object.is_open_triple()
    }

    /// Converts a concrete pattern into a triple.
    pub fn to_triple(&self) -> Option<Triple> {
        Some(Triple::new(
            self.subject.to_term()?,
            self.predicate.to_term()?,
            self.object.to_term()?,
        ))
    }

    /// Grounds every variable bound in `binding`.
    pub fn substitute(&self, binding: &Binding) -> TriplePattern {
        TriplePattern {
            subject: self.subject.substitute(binding),
            predicate: self.predicate.substitute(binding),
            object: self.object.substitute(binding),
        }
    }

    /// Folds concrete nested patterns into triple terms.
    pub fn normalize(self) -> TriplePattern {
        TriplePattern {
            subject: self.subject.normalize(),
            predicate: self.predicate.normalize(),
            object: self.object.normalize(),
        }
    }

    /// Distinct variables in order of first appearance.
    pub fn vars(&self) -> Vec<Var> {
        let mut out = Vec::new();
        self.subject.collect_vars(&mut out);
        self.predicate.collect_vars(&mut out);
        self.object.collect_vars(&mut out);
        out
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> Term {
        Term::iri(format!("http://example/{s}"))
    }

    #[test]
    fn concrete_nested_pattern_folds_into_term() {
        let inner = TriplePattern::new(iri("a"), iri("p"), iri("b"));
        let outer = TriplePattern::new(inner, iri("q"), Var::new("x"));
        assert!(matches!(outer.subject, PatternTerm::Term(Term::Triple(_))));
        assert!(!outer.has_open_triple());
        assert!(!outer.is_concrete());
    }

    #[test]
    fn open_nested_pattern_is_detected() {
        let inner = TriplePattern::new(Var::new("s"), iri("p"), Var::new("o"));
        let outer = TriplePattern::new(inner, iri("q"), Var::new("x"));
        assert!(outer.has_open_triple());
        assert_eq!(
            outer.vars(),
            vec![Var::new("s"), Var::new("o"), Var::new("x")]
        );
    }

    #[test]
    fn substitution_grounds_nested_patterns() {
        let inner = TriplePattern::new(Var::new("s"), iri("p"), Var::new("o"));
        let outer = TriplePattern::new(inner, iri("q"), Var::new("x"));
        let binding = Binding::empty()
            .extend(Var::new("s"), iri("a"))
            .extend(Var::new("o"), iri("b"));
        let grounded = outer.substitute(&binding);
        assert_eq!(
            grounded.subject,
            PatternTerm::Term(Term::triple(iri("a"), iri("p"), iri("b")))
        );
        assert_eq!(grounded.object, PatternTerm::Var(Var::new("x")));
    }
}
