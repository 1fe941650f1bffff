use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{QueryError, Result};
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::iter::{QueryIter, UnaryOp};

struct Abortable {
    switches: Vec<Arc<AtomicBool>>,
}

impl Abortable {
    fn tripped(&self) -> bool {
        self.switches.iter().any(|flag| flag.load(Ordering::Acquire))
    }
}

impl UnaryOp for Abortable {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        _cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        if self.tripped() {
            return Err(QueryError::Cancelled);
        }
        if !input.has_next()? {
            return Ok(None);
        }
        input.next_binding().map(Some)
    }
}

/// Fails with [`QueryError::Cancelled`] on the first pull after any of the
/// kill switches is set. The failure cancels everything upstream.
pub fn abortable(input: QueryIter, switches: Vec<Arc<AtomicBool>>) -> QueryIter {
    QueryIter::unary("abortable", input, Abortable { switches })
}
