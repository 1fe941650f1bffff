use tracing::debug;

use crate::error::{QueryError, Result};
use crate::model::{Term, Var};
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::expr::ExprRef;
use crate::query::iter::{QueryIter, UnaryOp};

/// What happens when an assigned variable is already bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignMode {
    /// `BIND`: rebinding to a different value is an execution error.
    MustBeNew,
    /// `LET` / join-by-value: rebinding to a different value drops the row.
    JoinLike,
}

struct Assign {
    assignments: Vec<(Var, ExprRef)>,
    mode: AssignMode,
    ctx: ExecContext,
}

impl Assign {
    fn apply(&self, binding: Binding) -> Result<Option<Binding>> {
        let mut builder = binding.builder();
        for (var, expr) in &self.assignments {
            // Each expression sees the row as extended so far.
            let snapshot = builder.snapshot();
            let value = match expr.eval(&snapshot, &self.ctx) {
                Ok(value) => value,
                Err(err) => {
                    debug!(var = %var, error = %err, "query.assign.eval_error");
                    continue;
                }
            };
            if !builder.try_add(var.clone(), value.clone()) {
                match self.mode {
                    AssignMode::MustBeNew => {
                        return Err(QueryError::Execution(format!(
                            "{var} already bound when assigning {value}"
                        )))
                    }
                    AssignMode::JoinLike => return Ok(None),
                }
            }
        }
        Ok(Some(builder.build()))
    }
}

impl UnaryOp for Assign {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        while input.has_next()? {
            cancel.check()?;
            let binding = input.next_binding()?;
            if let Some(extended) = self.apply(binding)? {
                return Ok(Some(extended));
            }
        }
        Ok(None)
    }
}

/// Extends every row with `(var, expr)` pairs evaluated left to right.
/// A failed evaluation leaves its variable unbound.
pub fn assign(
    input: QueryIter,
    assignments: Vec<(Var, ExprRef)>,
    mode: AssignMode,
    ctx: &ExecContext,
) -> QueryIter {
    QueryIter::unary(
        "assign",
        input,
        Assign {
            assignments,
            mode,
            ctx: ctx.clone(),
        },
    )
}

struct AssignVar {
    var: Var,
    value: Term,
    strict: bool,
}

impl UnaryOp for AssignVar {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        _cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        while input.has_next()? {
            let binding = input.next_binding()?;
            match binding.try_extend(self.var.clone(), self.value.clone()) {
                Some(extended) => return Ok(Some(extended)),
                None if self.strict => {
                    return Err(QueryError::Execution(format!(
                        "{} already bound to a value other than {}",
                        self.var, self.value
                    )))
                }
                None => continue,
            }
        }
        Ok(None)
    }
}

/// Binds `var` to a fixed `value` in every row. A row already binding an
/// equal value passes unchanged; a different value is an error when
/// `strict`, otherwise the row is dropped.
pub fn assign_var(input: QueryIter, var: Var, value: Term, strict: bool) -> QueryIter {
    QueryIter::unary("assign_var", input, AssignVar { var, value, strict })
}
