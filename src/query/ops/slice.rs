use tracing::trace;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::iter::{QueryIter, UnaryOp};

struct Slice {
    to_skip: usize,
    remaining: Option<usize>,
}

impl UnaryOp for Slice {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        while self.to_skip > 0 {
            cancel.check()?;
            if !input.has_next()? {
                return Ok(None);
            }
            input.next_binding()?;
            self.to_skip -= 1;
        }
        if !input.has_next()? {
            return Ok(None);
        }
        let binding = input.next_binding()?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                trace!("query.slice.limit_reached");
                input.close();
            }
        }
        Ok(Some(binding))
    }
}

/// OFFSET / LIMIT. The input is closed as soon as the limit is reached.
pub fn slice(mut input: QueryIter, offset: usize, limit: Option<usize>) -> QueryIter {
    if limit == Some(0) {
        input.close();
    }
    QueryIter::unary(
        "slice",
        input,
        Slice {
            to_skip: offset,
            remaining: limit,
        },
    )
}
