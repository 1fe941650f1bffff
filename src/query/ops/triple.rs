use tracing::trace;

use crate::error::{QueryError, Result};
use crate::graph::TripleIter;
use crate::model::{PatternTerm, Term, Triple, TriplePattern};
use crate::query::binding::{Binding, BindingBuilder};
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::iter::{QueryIter, UnaryOp};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

/// Binds the variables of `pattern` against `term`. Nested patterns are
/// unified position by position. Returns `false` on a mismatch or on a
/// variable that is already bound to something else.
pub(crate) fn unify_term(pattern: &PatternTerm, term: &Term, builder: &mut BindingBuilder) -> bool {
    match pattern {
        PatternTerm::Var(var) => builder.try_add(var.clone(), term.clone()),
        PatternTerm::Term(expected) => expected == term,
        PatternTerm::Triple(nested) => match term.as_triple() {
            Some(triple) => unify(nested, triple, builder),
            None => false,
        },
    }
}

/// [`unify_term`] for every position of a triple.
pub(crate) fn unify(pattern: &TriplePattern, triple: &Triple, builder: &mut BindingBuilder) -> bool {
    unify_term(&pattern.subject, &triple.subject, builder)
        && unify_term(&pattern.predicate, &triple.predicate, builder)
        && unify_term(&pattern.object, &triple.object, builder)
}

/// Looks up candidates for `pattern`. Variables and open nested patterns
/// become wildcards.
pub(crate) fn find_candidates(ctx: &ExecContext, pattern: &TriplePattern) -> TripleIter {
    let timer = profile_timer();
    let subject = pattern.subject.to_term();
    let predicate = pattern.predicate.to_term();
    let object = pattern.object.to_term();
    let found = ctx
        .graph()
        .find(subject.as_ref(), predicate.as_ref(), object.as_ref());
    record_profile_timer(QueryProfileKind::TripleMatch, timer);
    found
}

struct Current {
    outer: Binding,
    pattern: TriplePattern,
    triples: TripleIter,
}

/// What a matcher does with a nested pattern that still holds variables
/// after substitution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NestedPatterns {
    Reject,
    Unify,
}

struct TripleMatch {
    pattern: TriplePattern,
    nested: NestedPatterns,
    ctx: ExecContext,
    current: Option<Current>,
}

impl UnaryOp for TripleMatch {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        loop {
            cancel.check()?;
            if let Some(current) = self.current.as_mut() {
                for triple in current.triples.by_ref() {
                    let mut builder = current.outer.builder();
                    if unify(&current.pattern, &triple, &mut builder) {
                        return Ok(Some(builder.build()));
                    }
                }
                self.current = None;
            }
            if !input.has_next()? {
                return Ok(None);
            }
            let outer = input.next_binding()?;
            let pattern = self.pattern.substitute(&outer);
            if self.nested == NestedPatterns::Reject && pattern.has_open_triple() {
                return Err(QueryError::internal(format!(
                    "plain triple matcher given nested pattern {pattern}"
                )));
            }
            trace!(pattern = %pattern, "query.triple.lookup");
            let triples = find_candidates(&self.ctx, &pattern);
            self.current = Some(Current {
                outer,
                pattern,
                triples,
            });
        }
    }

    fn close(&mut self) {
        self.current = None;
    }
}

/// Matches a flat triple pattern against the active graph for every input
/// row. Nested patterns must be fully concrete once the row is substituted;
/// use [`triple_star`](super::triple_star) otherwise.
pub fn triple(input: QueryIter, pattern: TriplePattern, ctx: &ExecContext) -> QueryIter {
    matcher("triple", input, pattern, NestedPatterns::Reject, ctx)
}

pub(crate) fn matcher(
    name: &'static str,
    input: QueryIter,
    pattern: TriplePattern,
    nested: NestedPatterns,
    ctx: &ExecContext,
) -> QueryIter {
    QueryIter::unary(
        name,
        input,
        TripleMatch {
            pattern,
            nested,
            ctx: ctx.clone(),
            current: None,
        },
    )
}
