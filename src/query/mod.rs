#![forbid(unsafe_code)]

//! Pull-based SPARQL algebra execution.
//!
//! An operator tree is built bottom-up from the free functions in [`ops`],
//! each wrapping its input [`QueryIter`]s, and driven from the root by an
//! [`Executor`] or directly through `has_next` / `next_binding`.

/// Aggregate functions and their per-group accumulators.
pub mod aggregate;

/// Spill-to-disk buffers for ORDER BY and DISTINCT.
pub mod bag;

/// Solution rows.
pub mod binding;

/// Cancellation flags shared across an operator tree.
pub mod cancel;

/// Per-execution state shared by every operator.
pub mod context;

/// Root driver.
///
/// Runs an operator tree and streams result rows back to clients.
pub mod executor;

/// Expression contract, built-in expressions and solution ordering.
pub mod expr;

/// Materialized right-hand sides for MINUS and the half-joins.
pub mod index_table;

/// The iterator protocol every operator follows.
pub mod iter;

/// The operator set.
pub mod ops;

/// Performance profiling for query operations.
///
/// Collects timing and count statistics to identify performance bottlenecks.
pub mod profile;

pub use binding::{Binding, BindingBuilder};
pub use cancel::CancelSignal;
pub use context::ExecContext;
pub use executor::{Executor, QueryResult, ResultStream};
pub use iter::{BindingStream, QueryIter};
