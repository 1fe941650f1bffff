use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::iter::{QueryIter, UnaryOp};

/// A right-hand plan evaluated once per left row.
pub trait SubPlan: Send + Sync {
    /// `true` when the plan always yields exactly the empty binding, making
    /// the lateral join a no-op.
    fn is_unit(&self) -> bool {
        false
    }

    /// Evaluates the plan with `binding` substituted in.
    fn execute(&self, binding: &Binding, ctx: &ExecContext) -> Result<QueryIter>;
}

impl<F> SubPlan for F
where
    F: Fn(&Binding, &ExecContext) -> Result<QueryIter> + Send + Sync,
{
    fn execute(&self, binding: &Binding, ctx: &ExecContext) -> Result<QueryIter> {
        self(binding, ctx)
    }
}

/// The join identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnitPlan;

impl SubPlan for UnitPlan {
    fn is_unit(&self) -> bool {
        true
    }

    fn execute(&self, _binding: &Binding, _ctx: &ExecContext) -> Result<QueryIter> {
        Ok(QueryIter::root())
    }
}

/// Shared handle to a sub-plan.
pub type SubPlanRef = Arc<dyn SubPlan>;

struct Lateral {
    plan: SubPlanRef,
    ctx: ExecContext,
    current: Option<(Binding, QueryIter)>,
}

impl UnaryOp for Lateral {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        loop {
            cancel.check()?;
            if let Some((outer, inner)) = self.current.as_mut() {
                if inner.has_next()? {
                    let row = inner.next_binding()?;
                    match outer.merge(&row) {
                        Some(merged) => return Ok(Some(merged)),
                        None => continue,
                    }
                }
                self.current = None;
            }
            if !input.has_next()? {
                return Ok(None);
            }
            let outer = input.next_binding()?;
            let inner = self.plan.execute(&outer, &self.ctx)?;
            trace!(inner = inner.name(), "query.lateral.advance");
            self.current = Some((outer, inner));
        }
    }

    fn close(&mut self) {
        if let Some((_, mut inner)) = self.current.take() {
            inner.close();
        }
    }

    fn request_cancel(&mut self) {
        if let Some((_, inner)) = self.current.as_ref() {
            inner.cancel();
        }
    }
}

/// Repeated apply: for each input row, evaluates `plan` with the row
/// substituted and yields every inner row merged with it, in input order.
/// A unit plan returns `input` untouched.
pub fn lateral(input: QueryIter, plan: SubPlanRef, ctx: &ExecContext) -> QueryIter {
    if plan.is_unit() {
        return input;
    }
    QueryIter::unary(
        "lateral",
        input,
        Lateral {
            plan,
            ctx: ctx.clone(),
            current: None,
        },
    )
}
