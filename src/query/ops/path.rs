//! Property path evaluation.
//!
//! A path is evaluated per input row through [`lateral`]: once the row is
//! substituted, the concrete end of the path is used as the starting point
//! and the path is walked forward (or reversed when only the object is
//! known). Arbitrary-length paths are walked breadth first with a visited
//! set, so each reachable node is reported once per start node and cycles
//! terminate.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::error::Result;
use crate::graph::Graph;
use crate::model::{PatternTerm, Term};
use crate::query::binding::Binding;
use crate::query::context::ExecContext;
use crate::query::iter::QueryIter;

use super::lateral::{lateral, SubPlan};

/// A SPARQL property path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Path {
    /// A single predicate.
    Link(Term),
    /// `^path`
    Inverse(Box<Path>),
    /// `a / b`
    Seq(Box<Path>, Box<Path>),
    /// `a | b`
    Alt(Box<Path>, Box<Path>),
    /// `path?`
    ZeroOrOne(Box<Path>),
    /// `path*`
    ZeroOrMore(Box<Path>),
    /// `path+`
    OneOrMore(Box<Path>),
    /// `!(p1 | ... | ^q1 | ...)`
    NegatedSet {
        /// Excluded forward predicates.
        forward: Vec<Term>,
        /// Excluded inverse predicates.
        inverse: Vec<Term>,
    },
}

impl Path {
    /// `p`
    pub fn link(predicate: Term) -> Path {
        Path::Link(predicate)
    }

    /// `^self`
    pub fn inverse(self) -> Path {
        Path::Inverse(Box::new(self))
    }

    /// `self / next`
    pub fn then(self, next: Path) -> Path {
        Path::Seq(Box::new(self), Box::new(next))
    }

    /// `self | other`
    pub fn or(self, other: Path) -> Path {
        Path::Alt(Box::new(self), Box::new(other))
    }

    /// `self?`
    pub fn optional(self) -> Path {
        Path::ZeroOrOne(Box::new(self))
    }

    /// `self*`
    pub fn star(self) -> Path {
        Path::ZeroOrMore(Box::new(self))
    }

    /// `self+`
    pub fn plus(self) -> Path {
        Path::OneOrMore(Box::new(self))
    }

    /// The path read from object to subject.
    pub fn reverse(&self) -> Path {
        match self {
            Path::Link(_) => Path::Inverse(Box::new(self.clone())),
            Path::Inverse(inner) => (**inner).clone(),
            Path::Seq(a, b) => Path::Seq(Box::new(b.reverse()), Box::new(a.reverse())),
            Path::Alt(a, b) => Path::Alt(Box::new(a.reverse()), Box::new(b.reverse())),
            Path::ZeroOrOne(inner) => Path::ZeroOrOne(Box::new(inner.reverse())),
            Path::ZeroOrMore(inner) => Path::ZeroOrMore(Box::new(inner.reverse())),
            Path::OneOrMore(inner) => Path::OneOrMore(Box::new(inner.reverse())),
            Path::NegatedSet { forward, inverse } => Path::NegatedSet {
                forward: inverse.clone(),
                inverse: forward.clone(),
            },
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Link(p) => write!(f, "{p}"),
            Path::Inverse(inner) => write!(f, "^({inner})"),
            Path::Seq(a, b) => write!(f, "({a} / {b})"),
            Path::Alt(a, b) => write!(f, "({a} | {b})"),
            Path::ZeroOrOne(inner) => write!(f, "({inner})?"),
            Path::ZeroOrMore(inner) => write!(f, "({inner})*"),
            Path::OneOrMore(inner) => write!(f, "({inner})+"),
            Path::NegatedSet { forward, inverse } => {
                let items: Vec<String> = forward
                    .iter()
                    .map(ToString::to_string)
                    .chain(inverse.iter().map(|p| format!("^{p}")))
                    .collect();
                write!(f, "!({})", items.join(" | "))
            }
        }
    }
}

/// Nodes reachable from `node` along `path`. Non-closure paths keep
/// multiplicity; closures report each node once.
fn walk(graph: &dyn Graph, path: &Path, node: &Term, out: &mut Vec<Term>) {
    match path {
        Path::Link(p) => out.extend(graph.find(Some(node), Some(p), None).map(|t| t.object)),
        Path::Inverse(inner) => match &**inner {
            Path::Link(p) => {
                out.extend(graph.find(None, Some(p), Some(node)).map(|t| t.subject));
            }
            other => walk(graph, &other.reverse(), node, out),
        },
        Path::Seq(a, b) => {
            let mut middle = Vec::new();
            walk(graph, a, node, &mut middle);
            for mid in &middle {
                walk(graph, b, mid, out);
            }
        }
        Path::Alt(a, b) => {
            walk(graph, a, node, out);
            walk(graph, b, node, out);
        }
        Path::ZeroOrOne(inner) => {
            let mut step = vec![node.clone()];
            walk(graph, inner, node, &mut step);
            let mut seen = FxHashSet::default();
            out.extend(step.into_iter().filter(|n| seen.insert(n.clone())));
        }
        Path::ZeroOrMore(inner) => closure(graph, inner, node, true, out),
        Path::OneOrMore(inner) => closure(graph, inner, node, false, out),
        Path::NegatedSet { forward, inverse } => {
            if !forward.is_empty() || inverse.is_empty() {
                out.extend(
                    graph
                        .find(Some(node), None, None)
                        .filter(|t| !forward.contains(&t.predicate))
                        .map(|t| t.object),
                );
            }
            if !inverse.is_empty() {
                out.extend(
                    graph
                        .find(None, None, Some(node))
                        .filter(|t| !inverse.contains(&t.predicate))
                        .map(|t| t.subject),
                );
            }
        }
    }
}

fn closure(
    graph: &dyn Graph,
    step: &Path,
    start: &Term,
    include_start: bool,
    out: &mut Vec<Term>,
) {
    let mut visited: FxHashSet<Term> = FxHashSet::default();
    if include_start {
        visited.insert(start.clone());
        out.push(start.clone());
    }
    let mut frontier = VecDeque::from([start.clone()]);
    let mut next = Vec::new();
    while let Some(node) = frontier.pop_front() {
        next.clear();
        walk(graph, step, &node, &mut next);
        for reached in next.drain(..) {
            if visited.insert(reached.clone()) {
                out.push(reached.clone());
                frontier.push_back(reached);
            }
        }
    }
}

/// Every subject and object in the graph, each once.
fn all_nodes(graph: &dyn Graph) -> Vec<Term> {
    let mut seen = FxHashSet::default();
    let mut nodes = Vec::new();
    for triple in graph.find(None, None, None) {
        for node in [triple.subject, triple.object] {
            if seen.insert(node.clone()) {
                nodes.push(node);
            }
        }
    }
    nodes
}

struct PathPlan {
    subject: PatternTerm,
    path: Path,
    reversed: Path,
    object: PatternTerm,
}

impl PathPlan {
    fn row(
        outer: &Binding,
        subject: &PatternTerm,
        s: Term,
        object: &PatternTerm,
        o: Term,
    ) -> Option<Binding> {
        let mut builder = outer.builder();
        for (position, value) in [(subject, s), (object, o)] {
            let accepted = match position {
                PatternTerm::Var(var) => builder.try_add(var.clone(), value),
                concrete => concrete.to_term().as_ref() == Some(&value),
            };
            if !accepted {
                return None;
            }
        }
        Some(builder.build())
    }
}

impl SubPlan for PathPlan {
    fn execute(&self, binding: &Binding, ctx: &ExecContext) -> Result<QueryIter> {
        let graph: &dyn Graph = &**ctx.graph();
        let subject = self.subject.substitute(binding);
        let object = self.object.substitute(binding);
        let mut rows = Vec::new();
        match (subject.to_term(), object.to_term()) {
            (Some(start), _) => {
                let mut ends = Vec::new();
                walk(graph, &self.path, &start, &mut ends);
                for end in ends {
                    rows.extend(Self::row(binding, &subject, start.clone(), &object, end));
                }
            }
            (None, Some(end)) => {
                let mut starts = Vec::new();
                walk(graph, &self.reversed, &end, &mut starts);
                for start in starts {
                    rows.extend(Self::row(binding, &subject, start, &object, end.clone()));
                }
            }
            (None, None) => {
                for start in all_nodes(graph) {
                    let mut ends = Vec::new();
                    walk(graph, &self.path, &start, &mut ends);
                    for end in ends {
                        rows.extend(Self::row(binding, &subject, start.clone(), &object, end));
                    }
                }
            }
        }
        trace!(path = %self.path, rows = rows.len(), "query.path.evaluated");
        Ok(QueryIter::from_bindings(rows))
    }
}

/// Evaluates `subject path object` for every input row.
pub fn path(
    input: QueryIter,
    subject: PatternTerm,
    path: Path,
    object: PatternTerm,
    ctx: &ExecContext,
) -> QueryIter {
    let reversed = path.reverse();
    let plan = PathPlan {
        subject,
        path,
        reversed,
        object,
    };
    lateral(input, Arc::new(plan), ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Var;
    use crate::query::ops::triple::fixtures::{context, iri, t};

    fn v(name: &str) -> PatternTerm {
        PatternTerm::Var(Var::new(name))
    }

    fn objects(rows: &[Binding], var: &str) -> Vec<Term> {
        let mut out: Vec<Term> = rows
            .iter()
            .filter_map(|r| r.get(&Var::new(var)).cloned())
            .collect();
        out.sort();
        out
    }

    fn chain() -> ExecContext {
        context(vec![
            t("a", "next", "b"),
            t("b", "next", "c"),
            t("c", "next", "a"),
            t("c", "label", "end"),
        ])
    }

    #[test]
    fn star_closure_terminates_on_cycles() {
        let ctx = chain();
        let rows = path(
            QueryIter::root(),
            PatternTerm::Term(iri("a")),
            Path::link(iri("next")).star(),
            v("x"),
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(objects(&rows, "x"), vec![iri("a"), iri("b"), iri("c")]);
    }

    #[test]
    fn plus_excludes_start_unless_reachable() {
        let ctx = context(vec![t("a", "next", "b"), t("b", "next", "c")]);
        let rows = path(
            QueryIter::root(),
            PatternTerm::Term(iri("a")),
            Path::link(iri("next")).plus(),
            v("x"),
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(objects(&rows, "x"), vec![iri("b"), iri("c")]);
    }

    #[test]
    fn sequence_inverse_and_alternative() {
        let ctx = chain();
        let seq = path(
            QueryIter::root(),
            PatternTerm::Term(iri("a")),
            Path::link(iri("next"))
                .then(Path::link(iri("next")))
                .then(Path::link(iri("label"))),
            v("x"),
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(objects(&seq, "x"), vec![iri("end")]);

        let inverse = path(
            QueryIter::root(),
            PatternTerm::Term(iri("b")),
            Path::link(iri("next")).inverse(),
            v("x"),
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(objects(&inverse, "x"), vec![iri("a")]);

        let alt = path(
            QueryIter::root(),
            PatternTerm::Term(iri("c")),
            Path::link(iri("next")).or(Path::link(iri("label"))),
            v("x"),
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(objects(&alt, "x"), vec![iri("a"), iri("end")]);
    }

    #[test]
    fn unbound_subject_walks_the_reversed_path() {
        let ctx = chain();
        let rows = path(
            QueryIter::root(),
            v("s"),
            Path::link(iri("next")).then(Path::link(iri("label"))),
            PatternTerm::Term(iri("end")),
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(objects(&rows, "s"), vec![iri("b")]);
    }

    #[test]
    fn both_ends_free_and_shared_variable() {
        let ctx = chain();
        let rows = path(
            QueryIter::root(),
            v("x"),
            Path::link(iri("next")).plus(),
            v("x"),
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(objects(&rows, "x"), vec![iri("a"), iri("b"), iri("c")]);
    }

    #[test]
    fn negated_property_set() {
        let ctx = chain();
        let rows = path(
            QueryIter::root(),
            PatternTerm::Term(iri("c")),
            Path::NegatedSet {
                forward: vec![iri("next")],
                inverse: Vec::new(),
            },
            v("x"),
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(objects(&rows, "x"), vec![iri("end")]);
    }

    #[test]
    fn subject_bound_by_input_row() {
        let ctx = chain();
        let input = QueryIter::from_bindings(vec![
            Binding::empty().extend(Var::new("s"), iri("a")),
            Binding::empty().extend(Var::new("s"), iri("c")),
        ]);
        let rows = path(input, v("s"), Path::link(iri("next")), v("o"), &ctx)
            .collect_bindings()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(&Var::new("o")), Some(&iri("b")));
        assert_eq!(rows[1].get(&Var::new("o")), Some(&iri("a")));
    }

    #[test]
    fn reverse_round_trips() {
        let p = Path::link(iri("a")).then(Path::link(iri("b")).star());
        assert_eq!(p.reverse().reverse(), p);
    }
}
