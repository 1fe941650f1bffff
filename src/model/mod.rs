//! RDF term model consumed by the query engine.
//!
//! The engine treats terms as opaque comparable, hashable values. The types
//! here are deliberately small: enough to represent IRIs, blank nodes,
//! literals and RDF-star triple terms, plus the variables and triple
//! patterns that operators match against a graph.

mod pattern;
mod term;
mod var;

pub use pattern::{PatternTerm, TriplePattern};
pub use term::{vocab, Literal, Term, Triple};
pub use var::{Var, VarAlloc, ALLOC_PREFIX_TRIPLE_TERM};
