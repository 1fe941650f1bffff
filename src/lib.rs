//! Execution core for SPARQL algebra.
//!
//! Queries run as trees of lazily evaluated, cancellable binding iterators:
//! filters, assignments, projection, DISTINCT / REDUCED, ORDER BY with
//! spill-to-disk, top-N, grouping with aggregates, MINUS and half-joins,
//! property paths, lateral evaluation and RDF-star triple patterns.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod query;

pub use config::{ConfigError, ExecConfig, RdfStarMode, ThresholdPolicy};
pub use error::{QueryError, Result};
pub use graph::{Graph, MemoryGraph};
pub use model::{PatternTerm, Term, Triple, TriplePattern, Var};
pub use query::{Binding, CancelSignal, ExecContext, Executor, QueryIter, QueryResult};
