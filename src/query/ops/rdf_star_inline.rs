use crate::model::TriplePattern;
use crate::query::context::ExecContext;
use crate::query::iter::QueryIter;

use super::triple::{matcher, NestedPatterns};

/// Matches a pattern that may contain nested triple patterns by looking up
/// the outer triple with open nested positions as wildcards and unifying
/// each candidate recursively. No synthetic variables are introduced.
pub fn triple_star_inline(input: QueryIter, pattern: TriplePattern, ctx: &ExecContext) -> QueryIter {
    matcher("triple_star_inline", input, pattern, NestedPatterns::Unify, ctx)
}
