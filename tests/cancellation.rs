use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Once};
use std::thread;
use std::time::Duration;

use sparql_iter::model::{Term, Var};
use sparql_iter::query::expr::{var, SortCondition};
use sparql_iter::query::ops::{abortable, concat, distinct, filter, sort};
use sparql_iter::query::{Binding, BindingStream, CancelSignal, ExecContext, Executor, QueryIter};
use sparql_iter::{QueryError, Result};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sparql_iter=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

#[derive(Default)]
struct Counters {
    produced: AtomicUsize,
    cancels: AtomicUsize,
    closes: AtomicUsize,
}

/// Counts upward forever.
struct Endless {
    next: i64,
    counters: Arc<Counters>,
}

impl BindingStream for Endless {
    fn try_next(&mut self, _cancel: &CancelSignal) -> Result<Option<Binding>> {
        let value = self.next;
        self.next += 1;
        self.counters.produced.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Binding::empty().extend(Var::new("x"), Term::integer(value))))
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn request_cancel(&mut self) {
        self.counters.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

fn endless() -> (QueryIter, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let iter = QueryIter::new(
        "endless",
        Endless {
            next: 0,
            counters: Arc::clone(&counters),
        },
    );
    (iter, counters)
}

#[test]
fn cancel_from_watchdog_thread_ends_the_stream() {
    init_tracing();
    let ctx = ExecContext::detached();
    let (source, counters) = endless();
    let mut tree = filter(source, Vec::new(), &ctx);
    let handle = tree.cancel_handle();
    let started = Arc::new(Barrier::new(2));

    let watchdog = {
        let started = Arc::clone(&started);
        thread::spawn(move || {
            started.wait();
            thread::sleep(Duration::from_millis(5));
            handle.cancel();
        })
    };

    started.wait();
    let mut expected = 0i64;
    let outcome = loop {
        match tree.next_binding() {
            Ok(binding) => {
                // Every row seen is the next one in sequence; nothing extra
                // or out of order slips through.
                let value = binding.get(&Var::new("x")).and_then(Term::as_integer);
                assert_eq!(value, Some(expected));
                expected += 1;
            }
            Err(err) => break err,
        }
    };
    watchdog.join().unwrap();

    assert!(outcome.is_cancelled());
    assert!(matches!(tree.has_next(), Err(QueryError::Cancelled)));
    assert!(matches!(tree.next_binding(), Err(QueryError::Cancelled)));
    assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert!(counters.produced.load(Ordering::SeqCst) as i64 >= expected);
}

#[test]
fn racing_cancels_propagate_exactly_once() {
    init_tracing();
    let ctx = ExecContext::detached();
    let (a, ca) = endless();
    let (b, cb) = endless();
    let mut tree = distinct(concat(vec![a, b]), None, &ctx);
    let handle = tree.cancel_handle();
    let barrier = Arc::new(Barrier::new(8));
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let handle = Arc::clone(&handle);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                handle.cancel();
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    assert!(tree.has_next().unwrap_err().is_cancelled());
    for counters in [&ca, &cb] {
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.produced.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn cancel_interrupts_a_blocking_sort_drain() {
    init_tracing();
    let ctx = ExecContext::detached();
    let (source, counters) = endless();
    let mut tree = sort(source, vec![SortCondition::asc(var("x"))], &ctx);
    let handle = tree.cancel_handle();
    let watchdog = thread::spawn(move || {
        thread::sleep(Duration::from_millis(5));
        handle.cancel();
    });
    // The drain never finishes on its own; only cancellation ends it.
    let err = tree.has_next().unwrap_err();
    watchdog.join().unwrap();
    assert!(err.is_cancelled());
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert!(counters.produced.load(Ordering::SeqCst) > 0);
}

#[test]
fn executor_token_and_abortable_switch_both_cancel() {
    init_tracing();
    let executor = Executor::new(ExecContext::detached());
    let token = Arc::new(AtomicBool::new(false));
    let (source, counters) = endless();
    let mut stream = executor.stream(source, Some(Arc::clone(&token)));
    assert!(stream.next().unwrap().is_ok());
    token.store(true, Ordering::SeqCst);
    assert!(matches!(stream.next(), Some(Err(QueryError::Cancelled))));
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

    let switch = Arc::new(AtomicBool::new(false));
    let (source, counters) = endless();
    let mut tree = abortable(source, vec![Arc::clone(&switch)]);
    let flipper = {
        let switch = Arc::clone(&switch);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(2));
            switch.store(true, Ordering::SeqCst);
        })
    };
    let err = loop {
        if let Err(err) = tree.next_binding() {
            break err;
        }
    };
    flipper.join().unwrap();
    assert!(err.is_cancelled());
    assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}
