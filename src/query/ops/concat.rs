use tracing::trace;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::iter::{MultiOp, QueryIter};

struct Concat {
    current: usize,
}

impl MultiOp for Concat {
    fn next_from(
        &mut self,
        inputs: &mut [QueryIter],
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        while let Some(input) = inputs.get_mut(self.current) {
            cancel.check()?;
            if input.has_next()? {
                return input.next_binding().map(Some);
            }
            trace!(index = self.current, "query.concat.advance");
            self.current += 1;
        }
        Ok(None)
    }
}

/// Ordered union: every row of the first input, then the second, and so
/// on. Closing or cancelling reaches every input, consumed or not.
pub fn concat(inputs: Vec<QueryIter>) -> QueryIter {
    QueryIter::multi("concat", inputs, Concat { current: 0 })
}
