//! Graph access consumed by the triple-matching operators.
//!
//! The engine only needs one capability from storage: enumerate the triples
//! matching a pattern where each position is either a concrete term or a
//! wildcard. [`MemoryGraph`] is an indexed, immutable in-memory
//! implementation used by tests, benchmarks and embedders with small data.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::model::{Term, Triple};

/// Boxed, owned triple iterator returned by [`Graph::find`].
pub type TripleIter = Box<dyn Iterator<Item = Triple> + Send>;

/// A source of triples.
pub trait Graph: Send + Sync {
    /// Triples matching the pattern; `None` is a wildcard.
    fn find(&self, subject: Option<&Term>, predicate: Option<&Term>, object: Option<&Term>)
        -> TripleIter;

    /// Triple terms occurring in subject or object position of any triple,
    /// at any nesting depth, filtered by the pattern. Each term is reported
    /// once.
    fn find_quoted(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> TripleIter {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for triple in self.find(None, None, None) {
            collect_quoted(&triple, &mut |quoted: &Triple| {
                if matches(quoted, subject, predicate, object) && seen.insert(quoted.clone()) {
                    out.push(quoted.clone());
                }
            });
        }
        Box::new(out.into_iter())
    }

    /// `true` when the exact triple is asserted.
    fn contains(&self, triple: &Triple) -> bool {
        self.find(
            Some(&triple.subject),
            Some(&triple.predicate),
            Some(&triple.object),
        )
        .next()
        .is_some()
    }
}

/// `true` when `triple` matches the pattern.
pub fn matches(
    triple: &Triple,
    subject: Option<&Term>,
    predicate: Option<&Term>,
    object: Option<&Term>,
) -> bool {
    subject.map_or(true, |s| s == &triple.subject)
        && predicate.map_or(true, |p| p == &triple.predicate)
        && object.map_or(true, |o| o == &triple.object)
}

fn collect_quoted(triple: &Triple, visit: &mut dyn FnMut(&Triple)) {
    for term in [&triple.subject, &triple.object] {
        if let Term::Triple(nested) = term {
            visit(nested);
            collect_quoted(nested, visit);
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum IndexOrder {
    Spo,
    Pos,
    Osp,
}

impl IndexOrder {
    fn key(self, triple: &Triple) -> [&Term; 3] {
        match self {
            IndexOrder::Spo => [&triple.subject, &triple.predicate, &triple.object],
            IndexOrder::Pos => [&triple.predicate, &triple.object, &triple.subject],
            IndexOrder::Osp => [&triple.object, &triple.subject, &triple.predicate],
        }
    }

    fn compare(self, a: &Triple, b: &Triple) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
}

#[derive(Clone)]
struct Index {
    order: IndexOrder,
    triples: Arc<[Triple]>,
}

impl Index {
    fn build(order: IndexOrder, triples: &[Triple]) -> Self {
        let mut sorted = triples.to_vec();
        sorted.sort_by(|a, b| order.compare(a, b));
        Self {
            order,
            triples: sorted.into(),
        }
    }

    fn range(&self, prefix: &[&Term]) -> (usize, usize) {
        let n = prefix.len();
        let start = self
            .triples
            .partition_point(|t| self.order.key(t)[..n] < prefix[..]);
        let end = self
            .triples
            .partition_point(|t| self.order.key(t)[..n] <= prefix[..]);
        (start, end)
    }
}

struct RangeIter {
    triples: Arc<[Triple]>,
    pos: usize,
    end: usize,
    subject: Option<Term>,
    predicate: Option<Term>,
    object: Option<Term>,
}

impl Iterator for RangeIter {
    type Item = Triple;

    fn next(&mut self) -> Option<Triple> {
        while self.pos < self.end {
            let triple = &self.triples[self.pos];
            self.pos += 1;
            if matches(
                triple,
                self.subject.as_ref(),
                self.predicate.as_ref(),
                self.object.as_ref(),
            ) {
                return Some(triple.clone());
            }
        }
        None
    }
}

/// Immutable in-memory graph with SPO, POS and OSP indexes.
#[derive(Clone)]
pub struct MemoryGraph {
    spo: Index,
    pos: Index,
    osp: Index,
    quoted: Arc<[Triple]>,
}

impl MemoryGraph {
    /// Builds a graph; duplicate triples are stored once.
    pub fn new(triples: impl IntoIterator<Item = Triple>) -> Self {
        let mut unique: Vec<Triple> = triples.into_iter().collect();
        unique.sort();
        unique.dedup();
        let mut quoted = Vec::new();
        for triple in &unique {
            collect_quoted(triple, &mut |nested: &Triple| quoted.push(nested.clone()));
        }
        quoted.sort();
        quoted.dedup();
        debug!(
            triples = unique.len(),
            quoted = quoted.len(),
            "graph.memory.built"
        );
        Self {
            spo: Index::build(IndexOrder::Spo, &unique),
            pos: Index::build(IndexOrder::Pos, &unique),
            osp: Index::build(IndexOrder::Osp, &unique),
            quoted: quoted.into(),
        }
    }

    /// An empty graph.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of asserted triples.
    pub fn len(&self) -> usize {
        self.spo.triples.len()
    }

    /// `true` when no triple is asserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn choose<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
    ) -> (&'a Index, Vec<&'a Term>) {
        match (subject, predicate, object) {
            (Some(s), Some(p), _) => (&self.spo, vec![s, p]),
            (Some(s), None, Some(o)) => (&self.osp, vec![o, s]),
            (Some(s), None, None) => (&self.spo, vec![s]),
            (None, Some(p), Some(o)) => (&self.pos, vec![p, o]),
            (None, Some(p), None) => (&self.pos, vec![p]),
            (None, None, Some(o)) => (&self.osp, vec![o]),
            (None, None, None) => (&self.spo, Vec::new()),
        }
    }
}

impl Graph for MemoryGraph {
    fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> TripleIter {
        let (index, prefix) = self.choose(subject, predicate, object);
        let (start, end) = index.range(&prefix);
        Box::new(RangeIter {
            triples: Arc::clone(&index.triples),
            pos: start,
            end,
            subject: subject.cloned(),
            predicate: predicate.cloned(),
            object: object.cloned(),
        })
    }

    fn find_quoted(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> TripleIter {
        Box::new(RangeIter {
            triples: Arc::clone(&self.quoted),
            pos: 0,
            end: self.quoted.len(),
            subject: subject.cloned(),
            predicate: predicate.cloned(),
            object: object.cloned(),
        })
    }
}

impl fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGraph")
            .field("triples", &self.len())
            .field("quoted", &self.quoted.len())
            .finish()
    }
}
