use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Environment variable that turns profiling on.
pub const PROFILE_ENV: &str = "SPARQL_ITER_PROFILE";

/// A snapshot of operator profiling counters.
///
/// Profiling is enabled via the `SPARQL_ITER_PROFILE` environment variable
/// and accumulates wall-clock time per operator phase across all queries in
/// the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryProfileSnapshot {
    /// Total nanoseconds spent evaluating filter predicates.
    pub filter_ns: u64,
    /// Number of filter evaluations.
    pub filter_count: u64,
    /// Total nanoseconds spent draining ORDER BY input.
    pub sort_drain_ns: u64,
    /// Number of sort drains.
    pub sort_drain_count: u64,
    /// Total nanoseconds spent building group tables.
    pub group_build_ns: u64,
    /// Number of group table builds.
    pub group_build_count: u64,
    /// Total nanoseconds DISTINCT spent draining into its spill bag.
    pub distinct_spill_ns: u64,
    /// Number of DISTINCT spills.
    pub distinct_spill_count: u64,
    /// Total nanoseconds spent in graph lookups for triple patterns.
    pub triple_match_ns: u64,
    /// Number of graph lookups.
    pub triple_match_count: u64,
    /// Total nanoseconds spent pulling result streams to completion.
    pub stream_iter_ns: u64,
    /// Number of streams pulled to completion.
    pub stream_iter_count: u64,
}

#[derive(Default)]
struct QueryProfileCounters {
    filter_ns: AtomicU64,
    filter_count: AtomicU64,
    sort_drain_ns: AtomicU64,
    sort_drain_count: AtomicU64,
    group_build_ns: AtomicU64,
    group_build_count: AtomicU64,
    distinct_spill_ns: AtomicU64,
    distinct_spill_count: AtomicU64,
    triple_match_ns: AtomicU64,
    triple_match_count: AtomicU64,
    stream_iter_ns: AtomicU64,
    stream_iter_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<QueryProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os(PROFILE_ENV).is_some())
}

fn counters() -> Option<&'static QueryProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(QueryProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum QueryProfileKind {
    Filter,
    SortDrain,
    GroupBuild,
    DistinctSpill,
    TripleMatch,
    StreamIter,
}

pub(crate) fn record_profile_timer(kind: QueryProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        QueryProfileKind::Filter => (&counters.filter_ns, &counters.filter_count),
        QueryProfileKind::SortDrain => (&counters.sort_drain_ns, &counters.sort_drain_count),
        QueryProfileKind::GroupBuild => (&counters.group_build_ns, &counters.group_build_count),
        QueryProfileKind::DistinctSpill => {
            (&counters.distinct_spill_ns, &counters.distinct_spill_count)
        }
        QueryProfileKind::TripleMatch => (&counters.triple_match_ns, &counters.triple_match_count),
        QueryProfileKind::StreamIter => (&counters.stream_iter_ns, &counters.stream_iter_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

/// Retrieves a snapshot of the profiling counters.
///
/// Returns `None` unless `SPARQL_ITER_PROFILE` is set. With `reset`, the
/// counters are zeroed as they are read.
///
/// ```no_run
/// use sparql_iter::query::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(false) {
///     println!("filter evaluations: {}", snapshot.filter_count);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<QueryProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(QueryProfileSnapshot {
        filter_ns: load(&counters.filter_ns),
        filter_count: load(&counters.filter_count),
        sort_drain_ns: load(&counters.sort_drain_ns),
        sort_drain_count: load(&counters.sort_drain_count),
        group_build_ns: load(&counters.group_build_ns),
        group_build_count: load(&counters.group_build_count),
        distinct_spill_ns: load(&counters.distinct_spill_ns),
        distinct_spill_count: load(&counters.distinct_spill_count),
        triple_match_ns: load(&counters.triple_match_ns),
        triple_match_count: load(&counters.triple_match_count),
        stream_iter_ns: load(&counters.stream_iter_ns),
        stream_iter_count: load(&counters.stream_iter_count),
    })
}
