//! Cooperative cancellation shared between a consumer and a watchdog thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{QueryError, Result};

/// Cancellation flag owned by one query iterator.
///
/// A signal knows the signals of the iterators directly upstream of it. The
/// first call to [`CancelSignal::cancel`] raises this flag and then raises
/// every upstream flag, so cancelling the root of an operator tree reaches
/// every leaf, including inputs that were never pulled. Reading the flag
/// never takes a lock.
pub struct CancelSignal {
    requested: AtomicBool,
    propagated: AtomicBool,
    upstream: Vec<Arc<CancelSignal>>,
}

impl CancelSignal {
    /// A signal with no upstream iterators.
    pub fn new() -> Self {
        Self::linked(Vec::new())
    }

    /// A signal that forwards cancellation to `upstream`.
    pub fn linked(upstream: Vec<Arc<CancelSignal>>) -> Self {
        Self {
            requested: AtomicBool::new(false),
            propagated: AtomicBool::new(false),
            upstream,
        }
    }

    /// Requests cancellation. Safe to call from any thread, any number of
    /// times; upstream propagation happens exactly once.
    pub fn cancel(&self) {
        // The flag goes up before propagation so a concurrent pull on this
        // iterator cannot slip one more row out while upstream is notified.
        self.requested.store(true, Ordering::SeqCst);
        if self
            .propagated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            for signal in &self.upstream {
                signal.cancel();
            }
        }
    }

    /// `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Fails with [`QueryError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Number of directly linked upstream signals.
    pub fn upstream_len(&self) -> usize {
        self.upstream.len()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("requested", &self.is_cancelled())
            .field("upstream", &self.upstream.len())
            .finish()
    }
}
