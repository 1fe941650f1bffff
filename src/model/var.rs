use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Reserved prefix for variables allocated while resolving RDF-star triple
/// terms. Query variables can never start with it.
pub const ALLOC_PREFIX_TRIPLE_TERM: &str = "~t";

const INTERNAL_PREFIXES: [char; 3] = ['.', '?', '~'];

/// A query variable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Var(Arc<str>);

impl Var {
    /// Creates a variable from its name (without the leading `?`).
    pub fn new(name: impl AsRef<str>) -> Self {
        Var(Arc::from(name.as_ref()))
    }

    /// Variable name without the `?` sigil.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// `false` for engine-allocated and anonymous variables, which are
    /// hidden from DISTINCT and from result projection.
    pub fn is_named(&self) -> bool {
        !self.0.starts_with(INTERNAL_PREFIXES)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

impl From<&str> for Var {
    fn from(name: &str) -> Self {
        Var::new(name)
    }
}

/// Allocates fresh variables under a reserved prefix.
///
/// One allocator lives in each execution context, so concurrent query
/// executions never share a counter.
#[derive(Debug)]
pub struct VarAlloc {
    prefix: &'static str,
    next: AtomicU64,
}

impl VarAlloc {
    /// Creates an allocator for the given reserved prefix.
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(0),
        }
    }

    /// Allocator for RDF-star triple-term variables.
    pub fn triple_terms() -> Self {
        Self::new(ALLOC_PREFIX_TRIPLE_TERM)
    }

    /// Returns the next unused variable.
    pub fn alloc(&self) -> Var {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Var::new(format!("{}{n}", self.prefix))
    }

    /// Number of variables handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
