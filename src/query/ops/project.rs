use crate::error::Result;
use crate::model::Var;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::iter::{QueryIter, UnaryOp};

enum Projection {
    Keep(Vec<Var>),
    Drop(Vec<Var>),
}

impl UnaryOp for Projection {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        _cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        if !input.has_next()? {
            return Ok(None);
        }
        let binding = input.next_binding()?;
        Ok(Some(match self {
            Projection::Keep(vars) => binding.project(vars),
            Projection::Drop(vars) => binding.without(vars),
        }))
    }
}

/// Restricts every row to `vars`.
pub fn project(input: QueryIter, vars: Vec<Var>) -> QueryIter {
    QueryIter::unary("project", input, Projection::Keep(vars))
}

/// Removes `vars` from every row.
pub fn remove(input: QueryIter, vars: Vec<Var>) -> QueryIter {
    QueryIter::unary("project_away", input, Projection::Drop(vars))
}
