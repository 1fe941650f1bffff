//! The operator set. Each operator is a free function that wraps its
//! input iterator(s) and returns a new [`QueryIter`](crate::query::QueryIter).

mod abortable;
mod assign;
mod concat;
mod distinct;
mod filter;
mod group;
mod half_join;
mod lateral;
mod minus;
mod path;
mod procedure;
mod project;
mod rdf_star;
mod rdf_star_inline;
mod reduced;
mod slice;
mod sort;
mod table;
mod topn;
mod triple;

pub use abortable::abortable;
pub use assign::{assign, assign_var, AssignMode};
pub use concat::concat;
pub use distinct::distinct;
pub use filter::filter;
pub use group::group;
pub use half_join::{anti_join, semi_join};
pub use lateral::{lateral, SubPlan, SubPlanRef, UnitPlan};
pub use minus::minus;
pub use path::{path, Path};
pub use procedure::{procedure, Procedure};
pub use project::{project, remove};
pub use rdf_star::{triple_pattern, triple_star};
pub use rdf_star_inline::triple_star_inline;
pub use reduced::reduced;
pub use slice::slice;
pub use sort::{sort, sort_by};
pub use topn::{top_n, top_n_by};
pub use triple::triple;
