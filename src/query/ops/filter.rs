use tracing::debug;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::expr::ExprRef;
use crate::query::iter::{QueryIter, UnaryOp};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

struct Filter {
    exprs: Vec<ExprRef>,
    ctx: ExecContext,
}

impl Filter {
    fn accepts(&self, binding: &Binding) -> bool {
        let timer = profile_timer();
        let accepted = self.exprs.iter().all(|expr| {
            match expr.is_satisfied(binding, &self.ctx) {
                Ok(satisfied) => satisfied,
                Err(err) => {
                    debug!(error = %err, expr = ?expr, "query.filter.eval_error");
                    false
                }
            }
        });
        record_profile_timer(QueryProfileKind::Filter, timer);
        accepted
    }
}

impl UnaryOp for Filter {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        loop {
            // Predicates can be expensive: look at the flag before each one.
            cancel.check()?;
            if !input.has_next()? {
                return Ok(None);
            }
            let binding = input.next_binding()?;
            if self.accepts(&binding) {
                return Ok(Some(binding));
            }
        }
    }
}

/// Keeps the rows for which every expression is satisfied. Evaluation
/// errors reject the row.
pub fn filter(input: QueryIter, exprs: Vec<ExprRef>, ctx: &ExecContext) -> QueryIter {
    QueryIter::unary(
        "filter",
        input,
        Filter {
            exprs,
            ctx: ctx.clone(),
        },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::QueryError;
    use crate::model::Term;
    use crate::query::expr::{constant, from_fn, gt, lt, var, EvalError};
    use crate::query::iter::testing::{ints, mock, values_of};

    #[test]
    fn keeps_matching_rows_in_order() {
        let ctx = ExecContext::detached();
        let (input, _) = mock(ints("x", &[5, 1, 7, 3]));
        let rows = filter(input, vec![gt(var("x"), constant(Term::integer(2)))], &ctx)
            .collect_bindings()
            .unwrap();
        assert_eq!(values_of("x", &rows), vec![Some(5), Some(7), Some(3)]);
    }

    #[test]
    fn evaluation_errors_drop_the_row() {
        let ctx = ExecContext::detached();
        let (input, _) = mock(ints("x", &[1, 2]));
        let rows = filter(input, vec![lt(var("y"), constant(Term::integer(9)))], &ctx)
            .collect_bindings()
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn cancellation_is_seen_before_predicate_evaluation() {
        let ctx = ExecContext::detached();
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evaluations);
        let expensive = from_fn("expensive", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EvalError::Failed("never true".into()))
        });
        let (input, probe) = mock(ints("x", &[1, 2, 3]));
        let mut iter = filter(input, vec![expensive], &ctx);
        iter.cancel();
        assert!(matches!(iter.has_next(), Err(QueryError::Cancelled)));
        assert_eq!(evaluations.load(Ordering::SeqCst), 0);
        assert_eq!(probe.closes(), 1);
    }
}
