//! The pull-based iterator protocol shared by every operator.
//!
//! Operators implement [`BindingStream`], the "do the real work" hook. The
//! [`QueryIter`] wrapper owns a stream and enforces the public contract in one
//! place: lookahead caching, auto-close on exhaustion, the cancellation check
//! before every pull and exactly-once resource release.
//!
//! [`SingleInput`], [`DualInput`] and [`MultiInput`] are plumbing for
//! operators with one, two or many upstream iterators. They close and cancel
//! their inputs whether or not the operator ever produced a row.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{QueryError, Result};
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;

/// Implementation hook behind a [`QueryIter`].
///
/// `try_next` returns `Ok(None)` once the stream is exhausted. The signal
/// passed in belongs to the owning iterator; streams that loop over many
/// upstream rows per call check it so a long pull can be interrupted.
pub trait BindingStream: Send {
    /// Produces the next binding, or `None` when exhausted.
    fn try_next(&mut self, cancel: &CancelSignal) -> Result<Option<Binding>>;

    /// Releases resources. Called exactly once by the owning iterator.
    fn close(&mut self) {}

    /// Propagates an observed cancellation to nested resources (spill bags,
    /// inner iterators). Called at most once, always before `close`.
    fn request_cancel(&mut self) {}
}

impl<F> BindingStream for F
where
    F: FnMut(&CancelSignal) -> Result<Option<Binding>> + Send,
{
    fn try_next(&mut self, cancel: &CancelSignal) -> Result<Option<Binding>> {
        self(cancel)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IterState {
    Open,
    Exhausted,
    Closed,
    Cancelled,
    Failed,
}

/// A lazily evaluated, cancellable stream of bindings.
///
/// A `QueryIter` is single-owner and single-consumer. The only thing that
/// may cross threads is the handle returned by [`QueryIter::cancel_handle`];
/// a cancellation requested through it is observed by the next call to
/// [`QueryIter::has_next`] or [`QueryIter::next_binding`], which then releases
/// resources and fails with [`QueryError::Cancelled`].
pub struct QueryIter {
    name: &'static str,
    stream: Box<dyn BindingStream>,
    signal: Arc<CancelSignal>,
    state: IterState,
    lookahead: Option<Binding>,
    failure: Option<String>,
    released: bool,
}

impl QueryIter {
    /// Wraps a stream with no upstream iterators.
    pub fn new(name: &'static str, stream: impl BindingStream + 'static) -> Self {
        Self::with_upstream(name, stream, Vec::new())
    }

    /// Wraps a stream whose cancellation must reach the given upstream
    /// signals.
    pub fn with_upstream(
        name: &'static str,
        stream: impl BindingStream + 'static,
        upstream: Vec<Arc<CancelSignal>>,
    ) -> Self {
        Self {
            name,
            stream: Box::new(stream),
            signal: Arc::new(CancelSignal::linked(upstream)),
            state: IterState::Open,
            lookahead: None,
            failure: None,
            released: false,
        }
    }

    /// Builds an operator over one upstream iterator.
    pub fn unary<O: UnaryOp + 'static>(name: &'static str, input: QueryIter, op: O) -> Self {
        let upstream = vec![input.cancel_handle()];
        Self::with_upstream(name, SingleInput::new(input, op), upstream)
    }

    /// Builds an operator over a left and a right upstream iterator.
    pub fn binary<O: BinaryOp + 'static>(
        name: &'static str,
        left: QueryIter,
        right: QueryIter,
        op: O,
    ) -> Self {
        let upstream = vec![left.cancel_handle(), right.cancel_handle()];
        Self::with_upstream(name, DualInput::new(left, right, op), upstream)
    }

    /// Builds an operator over any number of upstream iterators.
    pub fn multi<O: MultiOp + 'static>(name: &'static str, inputs: Vec<QueryIter>, op: O) -> Self {
        let upstream = inputs.iter().map(QueryIter::cancel_handle).collect();
        Self::with_upstream(name, MultiInput::new(inputs, op), upstream)
    }

    /// Operator name, used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `true` when another binding is available. Repeated calls only cache a
    /// lookahead. Auto-closes on exhaustion.
    ///
    /// A failure is sticky: once the stream has returned an error, every
    /// later call reports it again as [`QueryError::Execution`] instead of
    /// looking like a normal end of stream.
    pub fn has_next(&mut self) -> Result<bool> {
        match self.state {
            IterState::Exhausted | IterState::Closed => return Ok(false),
            IterState::Cancelled => return Err(QueryError::Cancelled),
            IterState::Failed => {
                let message = self.failure.clone().unwrap_or_default();
                return Err(QueryError::Execution(message));
            }
            IterState::Open => {}
        }
        if self.signal.is_cancelled() {
            return Err(self.abort());
        }
        if self.lookahead.is_some() {
            return Ok(true);
        }
        match self.stream.try_next(&self.signal) {
            Ok(Some(binding)) => {
                self.lookahead = Some(binding);
                Ok(true)
            }
            Ok(None) => {
                trace!(iter = self.name, "query.iter.exhausted");
                self.state = IterState::Exhausted;
                self.release();
                Ok(false)
            }
            Err(err) if err.is_cancelled() => Err(self.abort()),
            Err(err) => {
                debug!(iter = self.name, error = %err, "query.iter.failed");
                self.state = IterState::Failed;
                self.failure = Some(match &err {
                    QueryError::Execution(message) => message.clone(),
                    other => other.to_string(),
                });
                self.release();
                Err(err)
            }
        }
    }

    /// Returns the next binding, failing with [`QueryError::NoSuchElement`]
    /// after exhaustion and with [`QueryError::Cancelled`] after an observed
    /// cancellation.
    pub fn next_binding(&mut self) -> Result<Binding> {
        if !self.has_next()? {
            return Err(QueryError::NoSuchElement);
        }
        self.lookahead.take().ok_or(QueryError::NoSuchElement)
    }

    /// Idempotent. Safe on an iterator that was never touched.
    pub fn close(&mut self) {
        if self.state == IterState::Open {
            self.state = IterState::Closed;
        }
        self.lookahead = None;
        self.release();
    }

    /// Requests cancellation. Callable through a shared reference; the
    /// effect is observed on the next pull.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// A thread-safe handle that cancels this iterator and everything
    /// upstream of it.
    pub fn cancel_handle(&self) -> Arc<CancelSignal> {
        Arc::clone(&self.signal)
    }

    /// `true` once cancellation was requested, observed or not.
    pub fn is_cancel_requested(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// `true` once the iterator has released its resources.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Drains the remaining bindings.
    pub fn collect_bindings(mut self) -> Result<Vec<Binding>> {
        let mut out = Vec::new();
        while self.has_next()? {
            out.push(self.next_binding()?);
        }
        Ok(out)
    }

    fn abort(&mut self) -> QueryError {
        if self.state != IterState::Cancelled {
            debug!(iter = self.name, "query.iter.cancelled");
        }
        // A stream may report cancellation from a source other than this
        // signal (an external kill switch); raise ours so upstream agrees.
        self.signal.cancel();
        self.state = IterState::Cancelled;
        self.lookahead = None;
        self.release();
        QueryError::Cancelled
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.signal.is_cancelled() {
            self.stream.request_cancel();
        }
        self.stream.close();
    }
}

impl Iterator for QueryIter {
    type Item = Result<Binding>;

    /// Fused after an error: the failure is yielded once, then `None`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.state == IterState::Failed {
            return None;
        }
        match self.has_next() {
            Ok(true) => self.lookahead.take().map(Ok),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Drop for QueryIter {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for QueryIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIter")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("cancel_requested", &self.signal.is_cancelled())
            .finish()
    }
}

/// Operator logic over exactly one upstream iterator.
pub trait UnaryOp: Send {
    /// Produces the next output row, pulling from `input` as needed.
    fn next_from(&mut self, input: &mut QueryIter, cancel: &CancelSignal)
        -> Result<Option<Binding>>;

    /// Releases operator-owned resources. The input is closed separately.
    fn close(&mut self) {}

    /// Cancels operator-owned resources. The input is cancelled separately.
    fn request_cancel(&mut self) {}
}

/// Owns one upstream iterator on behalf of a [`UnaryOp`].
pub struct SingleInput<O> {
    input: QueryIter,
    op: O,
}

impl<O: UnaryOp> SingleInput<O> {
    /// Pairs an operator with its input.
    pub fn new(input: QueryIter, op: O) -> Self {
        Self { input, op }
    }
}

impl<O: UnaryOp> BindingStream for SingleInput<O> {
    fn try_next(&mut self, cancel: &CancelSignal) -> Result<Option<Binding>> {
        self.op.next_from(&mut self.input, cancel)
    }

    fn close(&mut self) {
        self.op.close();
        self.input.close();
    }

    fn request_cancel(&mut self) {
        self.op.request_cancel();
        self.input.cancel();
    }
}

/// Operator logic over a left and a right upstream iterator.
pub trait BinaryOp: Send {
    /// Produces the next output row.
    fn next_from(
        &mut self,
        left: &mut QueryIter,
        right: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>>;

    /// Releases operator-owned resources.
    fn close(&mut self) {}
}

/// Owns a left and a right upstream iterator on behalf of a [`BinaryOp`].
pub struct DualInput<O> {
    left: QueryIter,
    right: QueryIter,
    op: O,
}

impl<O: BinaryOp> DualInput<O> {
    /// Pairs an operator with its inputs.
    pub fn new(left: QueryIter, right: QueryIter, op: O) -> Self {
        Self { left, right, op }
    }
}

impl<O: BinaryOp> BindingStream for DualInput<O> {
    fn try_next(&mut self, cancel: &CancelSignal) -> Result<Option<Binding>> {
        self.op.next_from(&mut self.left, &mut self.right, cancel)
    }

    fn close(&mut self) {
        self.op.close();
        self.left.close();
        self.right.close();
    }

    fn request_cancel(&mut self) {
        self.left.cancel();
        self.right.cancel();
    }
}

/// Operator logic over an ordered list of upstream iterators.
pub trait MultiOp: Send {
    /// Produces the next output row.
    fn next_from(&mut self, inputs: &mut [QueryIter], cancel: &CancelSignal)
        -> Result<Option<Binding>>;
}

/// Owns every registered upstream iterator on behalf of a [`MultiOp`].
pub struct MultiInput<O> {
    inputs: Vec<QueryIter>,
    op: O,
}

impl<O: MultiOp> MultiInput<O> {
    /// Pairs an operator with its inputs.
    pub fn new(inputs: Vec<QueryIter>, op: O) -> Self {
        Self { inputs, op }
    }
}

impl<O: MultiOp> BindingStream for MultiInput<O> {
    fn try_next(&mut self, cancel: &CancelSignal) -> Result<Option<Binding>> {
        self.op.next_from(&mut self.inputs, cancel)
    }

    fn close(&mut self) {
        for input in &mut self.inputs {
            input.close();
        }
    }

    fn request_cancel(&mut self) {
        for input in &self.inputs {
            input.cancel();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Instrumented streams shared by operator tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::model::{Term, Var};

    /// Counts lifecycle calls on a [`MockStream`].
    #[derive(Debug, Default)]
    pub struct Probe {
        pub pulls: AtomicUsize,
        pub closes: AtomicUsize,
        pub cancels: AtomicUsize,
    }

    impl Probe {
        pub fn pulls(&self) -> usize {
            self.pulls.load(Ordering::SeqCst)
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        pub fn cancels(&self) -> usize {
            self.cancels.load(Ordering::SeqCst)
        }
    }

    /// A vector-backed stream that records what happened to it.
    pub struct MockStream {
        rows: std::vec::IntoIter<Binding>,
        probe: Arc<Probe>,
    }

    impl BindingStream for MockStream {
        fn try_next(&mut self, _cancel: &CancelSignal) -> Result<Option<Binding>> {
            self.probe.pulls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.next())
        }

        fn close(&mut self) {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn request_cancel(&mut self) {
            self.probe.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// An iterator over `rows` plus the probe observing it.
    pub fn mock(rows: Vec<Binding>) -> (QueryIter, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let stream = MockStream {
            rows: rows.into_iter(),
            probe: Arc::clone(&probe),
        };
        (QueryIter::new("mock", stream), probe)
    }

    /// Bindings of one integer-valued variable.
    pub fn ints(var: &str, values: &[i64]) -> Vec<Binding> {
        values
            .iter()
            .map(|value| Binding::empty().extend(Var::new(var), Term::integer(*value)))
            .collect()
    }

    /// Integer values bound to `var`, in order.
    pub fn values_of(var: &str, rows: &[Binding]) -> Vec<Option<i64>> {
        let var = Var::new(var);
        rows.iter()
            .map(|row| row.get(&var).and_then(Term::as_integer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ints, mock, values_of};
    use super::*;

    struct Passthrough;

    impl UnaryOp for Passthrough {
        fn next_from(
            &mut self,
            input: &mut QueryIter,
            _cancel: &CancelSignal,
        ) -> Result<Option<Binding>> {
            if input.has_next()? {
                input.next_binding().map(Some)
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn has_next_is_repeatable_and_auto_closes() {
        let (mut iter, probe) = mock(ints("x", &[1]));
        assert!(iter.has_next().unwrap());
        assert!(iter.has_next().unwrap());
        assert_eq!(probe.pulls(), 1);
        iter.next_binding().unwrap();
        assert!(!iter.has_next().unwrap());
        assert_eq!(probe.closes(), 1);
        assert!(iter.is_released());
        assert!(matches!(iter.next_binding(), Err(QueryError::NoSuchElement)));
    }

    #[test]
    fn close_is_idempotent_and_safe_before_first_touch() {
        let (mut iter, probe) = mock(ints("x", &[1, 2]));
        iter.close();
        iter.close();
        assert_eq!(probe.closes(), 1);
        assert!(!iter.has_next().unwrap());
        drop(iter);
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn observed_cancel_closes_and_fails() {
        let (mut iter, probe) = mock(ints("x", &[1, 2, 3]));
        assert!(iter.has_next().unwrap());
        iter.cancel();
        assert!(matches!(iter.has_next(), Err(QueryError::Cancelled)));
        assert!(matches!(iter.next_binding(), Err(QueryError::Cancelled)));
        assert_eq!(probe.cancels(), 1);
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn exhaustion_is_sticky_across_cancel() {
        let (mut iter, _probe) = mock(ints("x", &[1]));
        let rows: Vec<_> = iter.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 1);
        iter.cancel();
        assert!(!iter.has_next().unwrap());
    }

    #[test]
    fn failure_is_sticky_until_the_iterator_is_dropped() {
        let mut pulls = 0;
        let mut iter = QueryIter::new("flaky", move |_: &CancelSignal| -> Result<Option<Binding>> {
            pulls += 1;
            if pulls == 2 {
                return Err(QueryError::Execution("disk unplugged".into()));
            }
            Ok(Some(ints("n", &[pulls])[0].clone()))
        });
        assert!(iter.next_binding().is_ok());
        assert!(matches!(iter.has_next(), Err(QueryError::Execution(m)) if m == "disk unplugged"));
        assert!(iter.is_released());
        // Later pulls keep failing rather than reporting a clean end.
        assert!(matches!(iter.has_next(), Err(QueryError::Execution(m)) if m == "disk unplugged"));
        assert!(matches!(iter.next_binding(), Err(QueryError::Execution(_))));
        iter.close();
        assert!(iter.has_next().is_err());
    }

    #[test]
    fn iterator_yields_a_failure_once() {
        let mut failed = false;
        let iter = QueryIter::new("broken", move |_: &CancelSignal| -> Result<Option<Binding>> {
            if failed {
                return Ok(None);
            }
            failed = true;
            Err(QueryError::Execution("boom".into()))
        });
        let items: Vec<_> = iter.collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(QueryError::Execution(_))));
    }

    #[test]
    fn single_input_closes_upstream_once() {
        let (input, probe) = mock(ints("x", &[1, 2]));
        let mut iter = QueryIter::unary("passthrough", input, Passthrough);
        iter.close();
        iter.close();
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.pulls(), 0);
    }

    #[test]
    fn cancel_on_wrapper_reaches_untouched_upstream() {
        let (input, probe) = mock(ints("x", &[1, 2]));
        let upstream = input.cancel_handle();
        let mut iter = QueryIter::unary("passthrough", input, Passthrough);
        assert_eq!(iter.cancel_handle().upstream_len(), 1);
        iter.cancel();
        assert!(upstream.is_cancelled());
        assert!(iter.has_next().unwrap_err().is_cancelled());
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.pulls(), 0);
    }

    #[test]
    fn closure_streams_are_iterators() {
        let mut remaining = 3;
        let iter = QueryIter::new("countdown", move |_: &CancelSignal| -> Result<Option<Binding>> {
            if remaining == 0 {
                return Ok(None);
            }
            remaining -= 1;
            Ok(Some(ints("n", &[remaining])[0].clone()))
        });
        let rows = iter.collect_bindings().unwrap();
        assert_eq!(values_of("n", &rows), vec![Some(2), Some(1), Some(0)]);
    }
}
