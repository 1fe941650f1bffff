//! Root driver for operator trees.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::iter::QueryIter;
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

/// Materialised result returned by `execute`.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// The rows returned by the query, internal variables removed.
    pub rows: Vec<Binding>,
}

/// Streaming handle over the rows of an operator tree.
///
/// Rows are projected onto named variables, so variables allocated by the
/// engine never reach the caller. Setting the cancel token cancels the whole
/// tree; the next call to `next` yields [`QueryError::Cancelled`] unless the
/// tree had already been exhausted.
///
/// [`QueryError::Cancelled`]: crate::error::QueryError::Cancelled
pub struct ResultStream {
    root: QueryIter,
    cancel_token: Option<Arc<AtomicBool>>,
    rows: usize,
}

impl ResultStream {
    fn new(root: QueryIter, cancel_token: Option<Arc<AtomicBool>>) -> Self {
        Self {
            root,
            cancel_token,
            rows: 0,
        }
    }

    fn check_cancel(&self) {
        if let Some(flag) = &self.cancel_token {
            if flag.load(Ordering::SeqCst) {
                self.root.cancel();
            }
        }
    }

    /// Thread-safe handle that cancels the tree.
    pub fn cancel_handle(&self) -> Arc<CancelSignal> {
        self.root.cancel_handle()
    }

    /// Rows yielded so far.
    pub fn rows_returned(&self) -> usize {
        self.rows
    }

    /// Releases the tree without draining it.
    pub fn close(&mut self) {
        self.root.close();
    }
}

impl Iterator for ResultStream {
    type Item = Result<Binding>;

    fn next(&mut self) -> Option<Self::Item> {
        self.check_cancel();
        match self.root.next()? {
            Ok(binding) => {
                self.rows += 1;
                Some(Ok(binding.project_named()))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Runs operator trees built against one execution context.
pub struct Executor {
    ctx: ExecContext,
}

impl Executor {
    /// Creates an executor for trees built with `ctx`.
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }

    /// The context operator trees should be built with.
    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    /// Drives `root` to completion and materializes all results.
    pub fn execute(
        &self,
        root: QueryIter,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<QueryResult> {
        let mut stream = self.stream(root, cancel);
        let iter_timer = profile_timer();
        let rows: Vec<Binding> = stream.by_ref().collect::<Result<_>>()?;
        record_profile_timer(QueryProfileKind::StreamIter, iter_timer);
        debug!(rows = rows.len(), "query.execute.finished");
        Ok(QueryResult { rows })
    }

    /// Returns a streaming iterator over the results of `root`.
    pub fn stream(&self, root: QueryIter, cancel: Option<Arc<AtomicBool>>) -> ResultStream {
        debug!(
            root = root.name(),
            spill_threshold = ?self.ctx.config().spill_threshold,
            "query.execute.started"
        );
        ResultStream::new(root, cancel)
    }
}
