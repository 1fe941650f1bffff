use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::context::ExecContext;
use crate::query::iter::QueryIter;

use super::lateral::{lateral, SubPlan};

/// An extension procedure called once per input row.
pub trait Procedure: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produces the rows for one call. Returned rows are merged with
    /// `binding`; rows that conflict with it are dropped.
    fn call(&self, binding: &Binding, ctx: &ExecContext) -> Result<QueryIter>;
}

struct ProcedurePlan(Arc<dyn Procedure>);

impl SubPlan for ProcedurePlan {
    fn execute(&self, binding: &Binding, ctx: &ExecContext) -> Result<QueryIter> {
        trace!(procedure = self.0.name(), "query.procedure.call");
        self.0.call(binding, ctx)
    }
}

/// Calls `proc` for every input row.
pub fn procedure(input: QueryIter, proc: Arc<dyn Procedure>, ctx: &ExecContext) -> QueryIter {
    lateral(input, Arc::new(ProcedurePlan(proc)), ctx)
}
