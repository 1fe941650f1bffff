//! RDF-star pattern resolution with nested patterns staged through
//! synthetic variables.
//!
//! `<< ?s :p ?o >> :q ?x` is evaluated as two stages. The first binds a
//! fresh `~t` variable to every quoted triple matching `?s :p ?o`; the
//! second matches `?~t :q ?x` as a flat pattern. Nested patterns inside
//! nested patterns are staged the same way, innermost first. The synthetic
//! variables are projected away before rows leave the resolver.

use tracing::trace;

use crate::config::RdfStarMode;
use crate::error::Result;
use crate::graph::TripleIter;
use crate::model::{PatternTerm, Term, TriplePattern, Var};
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::iter::{QueryIter, UnaryOp};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

use super::project::remove;
use super::rdf_star_inline::triple_star_inline;
use super::triple::{triple, unify};

struct Pending {
    outer: Binding,
    pattern: TriplePattern,
    quoted: TripleIter,
}

/// Binds `var` to each quoted triple matching `pattern`.
struct BindQuoted {
    pattern: TriplePattern,
    var: Var,
    ctx: ExecContext,
    pending: Option<Pending>,
}

impl BindQuoted {
    fn bind(outer: &Binding, var: &Var, term: Term) -> Option<Binding> {
        let mut builder = outer.builder();
        // A row that already holds a different triple term under `var`
        // is filtered out, as BIND would.
        if builder.try_add(var.clone(), term) {
            Some(builder.build())
        } else {
            None
        }
    }
}

impl UnaryOp for BindQuoted {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        loop {
            cancel.check()?;
            if let Some(pending) = self.pending.as_mut() {
                for quoted in pending.quoted.by_ref() {
                    let mut builder = pending.outer.builder();
                    if !unify(&pending.pattern, &quoted, &mut builder) {
                        continue;
                    }
                    let grounded = builder.build();
                    let term = Term::Triple(Box::new(quoted));
                    if let Some(row) = Self::bind(&grounded, &self.var, term) {
                        return Ok(Some(row));
                    }
                }
                self.pending = None;
            }
            if !input.has_next()? {
                return Ok(None);
            }
            let outer = input.next_binding()?;
            let pattern = self.pattern.substitute(&outer);
            if let Some(triple) = pattern.to_triple() {
                let term = Term::Triple(Box::new(triple));
                if let Some(row) = Self::bind(&outer, &self.var, term) {
                    return Ok(Some(row));
                }
                continue;
            }
            let timer = profile_timer();
            let quoted = self.ctx.graph().find_quoted(
                pattern.subject.to_term().as_ref(),
                pattern.predicate.to_term().as_ref(),
                pattern.object.to_term().as_ref(),
            );
            record_profile_timer(QueryProfileKind::TripleMatch, timer);
            self.pending = Some(Pending {
                outer,
                pattern,
                quoted,
            });
        }
    }

    fn close(&mut self) {
        self.pending = None;
    }
}

fn bind_quoted(input: QueryIter, pattern: TriplePattern, var: Var, ctx: &ExecContext) -> QueryIter {
    QueryIter::unary(
        "bind_quoted",
        input,
        BindQuoted {
            pattern,
            var,
            ctx: ctx.clone(),
            pending: None,
        },
    )
}

/// Replaces an open nested pattern at one position by a fresh variable,
/// staging the nested match in front of `input`.
fn stage_position(
    input: QueryIter,
    position: PatternTerm,
    ctx: &ExecContext,
    allocated: &mut Vec<Var>,
) -> (QueryIter, PatternTerm) {
    match position {
        PatternTerm::Triple(nested) if !nested.is_concrete() => {
            let var = ctx.triple_vars().alloc();
            allocated.push(var.clone());
            let (input, flat) = stage(input, *nested, ctx, allocated);
            trace!(var = %var, pattern = %flat, "query.rdf_star.staged");
            (bind_quoted(input, flat, var.clone(), ctx), PatternTerm::Var(var))
        }
        other => (input, other),
    }
}

fn stage(
    input: QueryIter,
    pattern: TriplePattern,
    ctx: &ExecContext,
    allocated: &mut Vec<Var>,
) -> (QueryIter, TriplePattern) {
    let TriplePattern {
        subject,
        predicate,
        object,
    } = pattern;
    let (input, subject) = stage_position(input, subject, ctx, allocated);
    let (input, object) = stage_position(input, object, ctx, allocated);
    (
        input,
        TriplePattern {
            subject,
            predicate,
            object,
        },
    )
}

/// Matches a pattern that may contain nested triple patterns. Patterns
/// without open nested patterns go straight to [`triple`].
pub fn triple_star(input: QueryIter, pattern: TriplePattern, ctx: &ExecContext) -> QueryIter {
    if !pattern.has_open_triple() {
        return triple(input, pattern, ctx);
    }
    let mut allocated = Vec::new();
    let (staged, flat) = stage(input, pattern, ctx, &mut allocated);
    remove(triple(staged, flat, ctx), allocated)
}

/// Matches any triple pattern with the resolver selected by
/// [`ExecConfig::rdf_star`](crate::config::ExecConfig::rdf_star).
pub fn triple_pattern(input: QueryIter, pattern: TriplePattern, ctx: &ExecContext) -> QueryIter {
    match ctx.config().rdf_star {
        RdfStarMode::Staged => triple_star(input, pattern, ctx),
        RdfStarMode::Inline => triple_star_inline(input, pattern, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Triple;
    use crate::query::ops::triple::fixtures::{context, iri, t};

    fn v(name: &str) -> PatternTerm {
        PatternTerm::Var(Var::new(name))
    }

    fn quoted(s: &str, p: &str, o: &str) -> Term {
        Term::Triple(Box::new(t(s, p, o)))
    }

    fn annotated_graph() -> Vec<Triple> {
        vec![
            Triple::new(quoted("a", "p", "b"), iri("q"), iri("c")),
            Triple::new(quoted("a", "r", "b"), iri("q"), iri("d")),
            t("a", "p", "b"),
        ]
    }

    #[test]
    fn binds_nested_variables_and_hides_synthetic_ones() {
        let ctx = context(annotated_graph());
        let pattern = TriplePattern::new(
            TriplePattern::new(v("s"), iri("p"), v("o")),
            iri("q"),
            v("x"),
        );
        let rows = triple_star(QueryIter::root(), pattern, &ctx)
            .collect_bindings()
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get(&Var::new("s")), Some(&iri("a")));
        assert_eq!(row.get(&Var::new("o")), Some(&iri("b")));
        assert_eq!(row.get(&Var::new("x")), Some(&iri("c")));
        assert_eq!(row.len(), 3);
        assert!(ctx.triple_vars().allocated() >= 1);
    }

    #[test]
    fn no_matching_quoted_triple_yields_nothing() {
        let ctx = context(vec![t("a", "p", "b")]);
        let pattern = TriplePattern::new(
            TriplePattern::new(v("s"), iri("p"), v("o")),
            iri("q"),
            v("x"),
        );
        let rows = triple_star(QueryIter::root(), pattern, &ctx)
            .collect_bindings()
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn conflicting_triple_term_rebind_is_filtered() {
        let outer = quoted("a", "p", "b");
        let row = Binding::empty().extend(Var::new("t"), outer.clone());
        assert!(BindQuoted::bind(&row, &Var::new("t"), outer).is_some());
        assert!(BindQuoted::bind(&row, &Var::new("t"), quoted("a", "r", "b")).is_none());
    }

    #[test]
    fn doubly_nested_pattern() {
        let inner = quoted("a", "p", "b");
        let middle = Term::Triple(Box::new(Triple::new(inner, iri("says"), iri("bob"))));
        let ctx = context(vec![Triple::new(middle, iri("at"), iri("noon"))]);
        let pattern = TriplePattern::new(
            TriplePattern::new(TriplePattern::new(v("s"), iri("p"), v("o")), v("how"), v("who")),
            iri("at"),
            v("when"),
        );
        let rows = triple_star(QueryIter::root(), pattern, &ctx)
            .collect_bindings()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(&Var::new("s")), Some(&iri("a")));
        assert_eq!(rows[0].get(&Var::new("who")), Some(&iri("bob")));
        assert_eq!(rows[0].get(&Var::new("when")), Some(&iri("noon")));
        assert!(rows[0].iter().all(|(var, _)| var.is_named()));
    }

    #[test]
    fn flat_patterns_take_the_fast_path() {
        let ctx = context(annotated_graph());
        let pattern = TriplePattern::new(v("s"), iri("p"), v("o"));
        let iter = triple_star(QueryIter::root(), pattern, &ctx);
        assert_eq!(iter.name(), "triple");
        assert_eq!(ctx.triple_vars().allocated(), 0);
    }
}
