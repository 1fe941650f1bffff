use std::io;

use thiserror::Error;
use tracing::error;

/// Result alias used throughout the query engine.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors that escape a query iterator.
///
/// Row-level rejections and expression evaluation failures never show up
/// here; operators swallow them and drop the row. What remains is the set of
/// conditions a caller at the root of an operator tree has to tell apart:
/// the query was cancelled, the caller misused the protocol, the engine hit
/// an internal bug, or execution failed for an environmental reason.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Cancellation was requested and observed by the iterator.
    #[error("query cancelled")]
    Cancelled,
    /// `next` was called on an exhausted or closed iterator.
    #[error("no such element: iterator is exhausted")]
    NoSuchElement,
    /// An operator reached a state it structurally should never reach.
    #[error("internal error: {0}")]
    Internal(String),
    /// A query-level execution failure (for example rebinding a variable
    /// under strict assignment).
    #[error("execution error: {0}")]
    Execution(String),
    /// Failure in the spill-to-disk layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Failure encoding or decoding spilled bindings.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueryError {
    /// Returns `true` when the error is the cooperative cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Cancelled)
    }

    /// Returns `true` for invariant violations that callers must not retry.
    pub fn is_internal(&self) -> bool {
        matches!(self, QueryError::Internal(_))
    }

    /// Builds an [`QueryError::Internal`], logging it at error level.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(%message, "query.internal_error");
        QueryError::Internal(message)
    }
}
