use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::Result;
use crate::model::Var;
use crate::query::aggregate::{Accumulator, AggregatorRef};
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::expr::ExprRef;
use crate::query::iter::{QueryIter, UnaryOp};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

enum GroupPhase {
    Unstarted,
    Draining,
    Ready(std::vec::IntoIter<Binding>),
    Closed,
}

struct GroupEntry {
    key: Binding,
    accumulators: Vec<Box<dyn Accumulator>>,
}

struct Group {
    keys: Vec<(Var, ExprRef)>,
    aggregates: Vec<(Var, AggregatorRef)>,
    ctx: ExecContext,
    phase: GroupPhase,
}

impl Group {
    fn key_of(&self, binding: &Binding) -> Binding {
        let mut builder = Binding::empty().builder();
        for (var, expr) in &self.keys {
            // A key expression that fails leaves its component out.
            if let Ok(value) = expr.eval(binding, &self.ctx) {
                builder.try_add(var.clone(), value);
            }
        }
        builder.build()
    }

    fn empty_input_rows(&self) -> Vec<Binding> {
        if !self.keys.is_empty() {
            return Vec::new();
        }
        let mut builder = Binding::empty().builder();
        for (var, aggregator) in &self.aggregates {
            if let Some(value) = aggregator.empty_value() {
                builder.try_add(var.clone(), value);
            }
        }
        vec![builder.build()]
    }

    fn build(&mut self, input: &mut QueryIter, cancel: &CancelSignal) -> Result<Vec<Binding>> {
        if !input.has_next()? {
            return Ok(self.empty_input_rows());
        }
        let timer = profile_timer();
        let mut index: FxHashMap<Binding, usize> = FxHashMap::default();
        let mut groups: Vec<GroupEntry> = Vec::new();
        while input.has_next()? {
            cancel.check()?;
            let binding = input.next_binding()?;
            let key = self.key_of(&binding);
            let slot = match index.get(&key) {
                Some(slot) => *slot,
                None => {
                    let accumulators = self
                        .aggregates
                        .iter()
                        .map(|(_, aggregator)| aggregator.create_accumulator())
                        .collect();
                    index.insert(key.clone(), groups.len());
                    groups.push(GroupEntry { key, accumulators });
                    groups.len() - 1
                }
            };
            for (accumulator, (var, _)) in groups[slot]
                .accumulators
                .iter_mut()
                .zip(&self.aggregates)
            {
                if let Err(err) = accumulator.accumulate(&binding, &self.ctx) {
                    debug!(var = %var, error = %err, "query.group.accumulate_error");
                }
            }
        }
        debug!(groups = groups.len(), "query.group.built");
        record_profile_timer(QueryProfileKind::GroupBuild, timer);
        Ok(groups
            .into_iter()
            .map(|entry| {
                let mut builder = entry.key.builder();
                for (accumulator, (var, _)) in entry.accumulators.iter().zip(&self.aggregates) {
                    if let Some(value) = accumulator.value() {
                        builder.try_add(var.clone(), value);
                    }
                }
                builder.build()
            })
            .collect())
    }
}

impl UnaryOp for Group {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        if let GroupPhase::Unstarted = self.phase {
            self.phase = GroupPhase::Draining;
            let rows = self.build(input, cancel)?;
            self.phase = GroupPhase::Ready(rows.into_iter());
        }
        match &mut self.phase {
            GroupPhase::Ready(rows) => Ok(rows.next()),
            GroupPhase::Unstarted | GroupPhase::Draining | GroupPhase::Closed => Ok(None),
        }
    }

    fn close(&mut self) {
        self.phase = GroupPhase::Closed;
    }
}

/// GROUP BY `keys` computing `aggregates` per group. Does nothing until
/// first pulled. Output order follows first appearance of each key.
pub fn group(
    input: QueryIter,
    keys: Vec<(Var, ExprRef)>,
    aggregates: Vec<(Var, AggregatorRef)>,
    ctx: &ExecContext,
) -> QueryIter {
    QueryIter::unary(
        "group",
        input,
        Group {
            keys,
            aggregates,
            ctx: ctx.clone(),
            phase: GroupPhase::Unstarted,
        },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::Term;
    use crate::query::aggregate::{Count, CountExpr, Extremum};
    use crate::query::expr::var;
    use crate::query::iter::testing::{ints, mock, values_of};

    fn row(pairs: &[(&str, i64)]) -> Binding {
        Binding::from_pairs(
            pairs
                .iter()
                .map(|(v, n)| (Var::new(v), Term::integer(*n))),
        )
    }

    fn count_star() -> Vec<(Var, AggregatorRef)> {
        vec![(Var::new("n"), Arc::new(Count) as AggregatorRef)]
    }

    #[test]
    fn groups_by_key_and_aggregates() {
        let ctx = ExecContext::detached();
        let input = QueryIter::from_bindings(vec![
            row(&[("k", 1), ("v", 10)]),
            row(&[("k", 2), ("v", 5)]),
            row(&[("k", 1), ("v", 3)]),
        ]);
        let rows = group(
            input,
            vec![(Var::new("k"), var("k"))],
            vec![
                (Var::new("n"), Arc::new(Count) as AggregatorRef),
                (Var::new("m"), Arc::new(Extremum::max(var("v")))),
            ],
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(values_of("k", &rows), vec![Some(1), Some(2)]);
        assert_eq!(values_of("n", &rows), vec![Some(2), Some(1)]);
        assert_eq!(values_of("m", &rows), vec![Some(10), Some(5)]);
    }

    #[test]
    fn failing_key_expression_forms_its_own_group() {
        let ctx = ExecContext::detached();
        let input = QueryIter::from_bindings(vec![row(&[("k", 1)]), row(&[("v", 1)])]);
        let rows = group(input, vec![(Var::new("k"), var("k"))], count_star(), &ctx)
            .collect_bindings()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].vars(), vec![Var::new("n")]);
    }

    #[test]
    fn empty_input_rules() {
        let ctx = ExecContext::detached();
        let keyed = group(
            QueryIter::empty(),
            vec![(Var::new("k"), var("k"))],
            count_star(),
            &ctx,
        );
        assert!(keyed.collect_bindings().unwrap().is_empty());

        let bare = group(QueryIter::empty(), Vec::new(), Vec::new(), &ctx);
        assert_eq!(bare.collect_bindings().unwrap(), vec![Binding::empty()]);

        let counted = group(QueryIter::empty(), Vec::new(), count_star(), &ctx)
            .collect_bindings()
            .unwrap();
        assert_eq!(values_of("n", &counted), vec![Some(0)]);

        let undefined = group(
            QueryIter::empty(),
            Vec::new(),
            vec![(Var::new("m"), Arc::new(Extremum::min(var("v"))) as AggregatorRef)],
            &ctx,
        )
        .collect_bindings()
        .unwrap();
        assert_eq!(undefined, vec![Binding::empty()]);
    }

    #[test]
    fn implicit_group_without_aggregates() {
        let ctx = ExecContext::detached();
        let (input, _) = mock(ints("x", &[1, 2, 3]));
        let rows = group(input, Vec::new(), Vec::new(), &ctx)
            .collect_bindings()
            .unwrap();
        assert_eq!(rows, vec![Binding::empty()]);
    }

    #[test]
    fn lazy_until_first_pull_and_cancel_reaches_input() {
        let ctx = ExecContext::detached();
        let (input, probe) = mock(ints("x", &[1, 2]));
        let mut iter = group(
            input,
            Vec::new(),
            vec![(
                Var::new("c"),
                Arc::new(CountExpr::new(var("x"), false)) as AggregatorRef,
            )],
            &ctx,
        );
        assert_eq!(probe.pulls(), 0);
        iter.cancel();
        assert!(iter.has_next().unwrap_err().is_cancelled());
        assert_eq!(probe.cancels(), 1);
        assert_eq!(probe.closes(), 1);
    }
}
