//! Spill-to-disk buffers for sorting and de-duplicating bindings.
//!
//! A bag accumulates bindings in memory until its [`ThresholdPolicy`] trips,
//! then sorts the buffer and writes it out as a run: one JSON-encoded
//! binding per line in an anonymous temp file. Iteration merges every run
//! plus the in-memory tail with a k-way heap merge. Temp files disappear when
//! the bag or its iterator is dropped.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::ThresholdPolicy;
use crate::error::{QueryError, Result};
use crate::query::binding::Binding;
use crate::query::context::ExecContext;
use crate::query::expr::{BindingOrder, OrderRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BagState {
    Accumulating,
    Iterating,
    Closed,
    Cancelled,
}

/// Order used inside a bag. De-duplicating bags extend the caller's order
/// with the canonical binding order so equal bindings end up adjacent.
#[derive(Clone)]
struct RunOrder {
    hint: Option<OrderRef>,
    total: bool,
}

impl RunOrder {
    fn compare(&self, a: &Binding, b: &Binding) -> Ordering {
        let ordering = self
            .hint
            .as_ref()
            .map_or(Ordering::Equal, |hint| hint.compare(a, b));
        if ordering == Ordering::Equal && self.total {
            return a.canonical_cmp(b);
        }
        ordering
    }
}

struct SpillRun {
    file: File,
    items: usize,
}

struct BagCore {
    label: &'static str,
    order: RunOrder,
    dedup: bool,
    policy: ThresholdPolicy,
    dir: Option<PathBuf>,
    buffer: Vec<Binding>,
    buffer_bytes: usize,
    runs: Vec<SpillRun>,
    state: BagState,
}

impl BagCore {
    fn add(&mut self, binding: Binding) -> Result<()> {
        match self.state {
            BagState::Accumulating => {}
            BagState::Cancelled => return Err(QueryError::Cancelled),
            BagState::Iterating | BagState::Closed => {
                return Err(QueryError::internal(format!(
                    "{} bag no longer accepts bindings",
                    self.label
                )))
            }
        }
        if matches!(self.policy, ThresholdPolicy::Bytes(_)) {
            self.buffer_bytes += binding.estimated_bytes();
        }
        self.buffer.push(binding);
        if self
            .policy
            .is_exceeded(self.buffer.len(), self.buffer_bytes)
        {
            self.spill()?;
        }
        Ok(())
    }

    fn sort_buffer(&mut self) {
        let order = self.order.clone();
        self.buffer.sort_by(|a, b| order.compare(a, b));
        if self.dedup {
            self.buffer.dedup();
        }
    }

    fn spill(&mut self) -> Result<()> {
        self.sort_buffer();
        let file = match &self.dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        let mut writer = BufWriter::new(file);
        for binding in &self.buffer {
            serde_json::to_writer(&mut writer, binding)?;
            writer.write_all(b"\n")?;
        }
        let mut file = writer.into_inner().map_err(|err| err.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        let items = self.buffer.len();
        debug!(
            bag = self.label,
            run = self.runs.len(),
            items,
            "query.bag.spill"
        );
        self.runs.push(SpillRun { file, items });
        self.buffer.clear();
        self.buffer_bytes = 0;
        Ok(())
    }

    fn iter(&mut self) -> Result<BagIter> {
        match self.state {
            BagState::Accumulating => {}
            BagState::Cancelled => return Err(QueryError::Cancelled),
            BagState::Iterating | BagState::Closed => {
                return Err(QueryError::internal(format!(
                    "{} bag iterated twice",
                    self.label
                )))
            }
        }
        self.state = BagState::Iterating;
        self.sort_buffer();
        let memory = std::mem::take(&mut self.buffer);
        if self.runs.is_empty() {
            return Ok(BagIter::memory(memory));
        }
        let mut sources: Vec<RunSource> = std::mem::take(&mut self.runs)
            .into_iter()
            .map(|run| RunSource::Disk(BufReader::new(run.file).lines()))
            .collect();
        if !memory.is_empty() {
            sources.push(RunSource::Memory(memory.into_iter()));
        }
        trace!(bag = self.label, sources = sources.len(), "query.bag.merge");
        BagIter::merge(sources, self.order.clone(), self.dedup)
    }

    fn release(&mut self, state: BagState) {
        if matches!(self.state, BagState::Closed | BagState::Cancelled) {
            return;
        }
        self.state = state;
        self.buffer = Vec::new();
        self.runs.clear();
    }

    fn spilled_runs(&self) -> usize {
        self.runs.len()
    }

    fn spilled_items(&self) -> usize {
        self.runs.iter().map(|run| run.items).sum()
    }
}

enum RunSource {
    Disk(Lines<BufReader<File>>),
    Memory(std::vec::IntoIter<Binding>),
}

impl RunSource {
    fn next_binding(&mut self) -> Result<Option<Binding>> {
        match self {
            RunSource::Disk(lines) => match lines.next() {
                Some(line) => Ok(Some(serde_json::from_str(&line?)?)),
                None => Ok(None),
            },
            RunSource::Memory(iter) => Ok(iter.next()),
        }
    }
}

struct HeapEntry {
    binding: Binding,
    source: usize,
    order: Arc<RunOrder>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Reversed: `BinaryHeap` is a max-heap and the merge wants the smallest
    // binding first, earliest run first among equals.
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .compare(&self.binding, &other.binding)
            .then(self.source.cmp(&other.source))
            .reverse()
    }
}

/// Iterator over the contents of a bag, in bag order.
pub struct BagIter {
    inner: BagIterInner,
}

enum BagIterInner {
    Memory(std::vec::IntoIter<Binding>),
    Merge(MergeState),
}

struct MergeState {
    sources: Vec<RunSource>,
    heap: BinaryHeap<HeapEntry>,
    order: Arc<RunOrder>,
    dedup: bool,
    last: Option<Binding>,
}

impl BagIter {
    fn memory(bindings: Vec<Binding>) -> Self {
        Self {
            inner: BagIterInner::Memory(bindings.into_iter()),
        }
    }

    fn merge(mut sources: Vec<RunSource>, order: RunOrder, dedup: bool) -> Result<Self> {
        let order = Arc::new(order);
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, run) in sources.iter_mut().enumerate() {
            if let Some(binding) = run.next_binding()? {
                heap.push(HeapEntry {
                    binding,
                    source,
                    order: Arc::clone(&order),
                });
            }
        }
        Ok(Self {
            inner: BagIterInner::Merge(MergeState {
                sources,
                heap,
                order,
                dedup,
                last: None,
            }),
        })
    }

    /// Next binding, or `None` when the bag is drained.
    pub fn next_binding(&mut self) -> Result<Option<Binding>> {
        match &mut self.inner {
            BagIterInner::Memory(iter) => Ok(iter.next()),
            BagIterInner::Merge(state) => state.next_binding(),
        }
    }
}

impl MergeState {
    fn next_binding(&mut self) -> Result<Option<Binding>> {
        while let Some(entry) = self.heap.pop() {
            if let Some(binding) = self.sources[entry.source].next_binding()? {
                self.heap.push(HeapEntry {
                    binding,
                    source: entry.source,
                    order: Arc::clone(&self.order),
                });
            }
            if self.dedup {
                if self.last.as_ref() == Some(&entry.binding) {
                    continue;
                }
                self.last = Some(entry.binding.clone());
            }
            return Ok(Some(entry.binding));
        }
        Ok(None)
    }
}

impl Iterator for BagIter {
    type Item = Result<Binding>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_binding().transpose()
    }
}

macro_rules! bag_lifecycle {
    ($bag:ty) => {
        impl $bag {
            /// Adds one binding, spilling if the threshold trips.
            pub fn add(&mut self, binding: Binding) -> Result<()> {
                self.core.add(binding)
            }

            /// Adds every binding of `bindings`.
            pub fn add_all<I>(&mut self, bindings: I) -> Result<()>
            where
                I: IntoIterator<Item = Binding>,
            {
                for binding in bindings {
                    self.core.add(binding)?;
                }
                Ok(())
            }

            /// Hands the contents over to an iterator. Callable once.
            pub fn iter(&mut self) -> Result<BagIter> {
                self.core.iter()
            }

            /// Releases buffered bindings and spill files.
            pub fn close(&mut self) {
                self.core.release(BagState::Closed);
            }

            /// Like `close`, and later calls fail with
            /// [`QueryError::Cancelled`].
            pub fn cancel(&mut self) {
                self.core.release(BagState::Cancelled);
            }

            /// `true` once at least one run went to disk.
            pub fn has_spilled(&self) -> bool {
                self.core.spilled_runs() > 0
            }

            /// Number of bindings currently held in spill files.
            pub fn spilled_items(&self) -> usize {
                self.core.spilled_items()
            }
        }
    };
}

/// Sorting bag used by ORDER BY.
pub struct SortedBag {
    core: BagCore,
}

impl SortedBag {
    /// Creates a bag sorting by `order`.
    pub fn new(order: OrderRef, policy: ThresholdPolicy, dir: Option<PathBuf>) -> Self {
        Self {
            core: BagCore {
                label: "sorted",
                order: RunOrder {
                    hint: Some(order),
                    total: false,
                },
                dedup: false,
                policy,
                dir,
                buffer: Vec::new(),
                buffer_bytes: 0,
                runs: Vec::new(),
                state: BagState::Accumulating,
            },
        }
    }

    /// Bag configured from the execution options.
    pub fn for_context(order: OrderRef, ctx: &ExecContext) -> Self {
        let config = ctx.config();
        Self::new(order, config.threshold_policy(), config.spill_dir.clone())
    }
}

bag_lifecycle!(SortedBag);

/// De-duplicating bag used by DISTINCT once it spills.
///
/// Output is ordered by the optional hint first, so a spill stays
/// consistent with a surrounding ORDER BY.
pub struct DistinctBag {
    core: BagCore,
}

impl DistinctBag {
    /// Creates a bag.
    pub fn new(hint: Option<OrderRef>, policy: ThresholdPolicy, dir: Option<PathBuf>) -> Self {
        Self {
            core: BagCore {
                label: "distinct",
                order: RunOrder { hint, total: true },
                dedup: true,
                policy,
                dir,
                buffer: Vec::new(),
                buffer_bytes: 0,
                runs: Vec::new(),
                state: BagState::Accumulating,
            },
        }
    }

    /// Bag configured from the execution options.
    pub fn for_context(hint: Option<OrderRef>, ctx: &ExecContext) -> Self {
        let config = ctx.config();
        Self::new(hint, config.threshold_policy(), config.spill_dir.clone())
    }
}

bag_lifecycle!(DistinctBag);
