use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::expr::{BindingComparator, BindingOrder, OrderRef, SortCondition};
use crate::query::iter::{QueryIter, UnaryOp};

struct Ranked {
    binding: Binding,
    order: Arc<dyn BindingOrder>,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.binding, &other.binding)
    }
}

enum TopState {
    Unstarted,
    Ready(std::vec::IntoIter<Ranked>),
    Done,
}

/// Keeps the `limit` best rows in a max-heap whose top is the worst row
/// kept so far.
struct TopN {
    limit: usize,
    distinct: bool,
    order: OrderRef,
    state: TopState,
}

impl TopN {
    fn select(&mut self, input: &mut QueryIter, cancel: &CancelSignal) -> Result<Vec<Ranked>> {
        let mut heap: BinaryHeap<Ranked> = BinaryHeap::new();
        let mut seen = 0usize;
        while input.has_next()? {
            cancel.check()?;
            let binding = input.next_binding()?;
            seen += 1;
            if heap.len() >= self.limit {
                let better = heap.peek().map_or(false, |worst| {
                    self.order.compare(&binding, &worst.binding) == Ordering::Less
                });
                if !better {
                    continue;
                }
            }
            // Linear scan: limits are expected to be small.
            if self.distinct && heap.iter().any(|kept| kept.binding == binding) {
                continue;
            }
            if heap.len() >= self.limit {
                heap.pop();
            }
            heap.push(Ranked {
                binding,
                order: Arc::clone(&self.order),
            });
        }
        debug!(seen, kept = heap.len(), "query.top_n.selected");
        Ok(heap.into_sorted_vec())
    }
}

impl UnaryOp for TopN {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        if let TopState::Unstarted = self.state {
            let rows = self.select(input, cancel)?;
            self.state = TopState::Ready(rows.into_iter());
        }
        match &mut self.state {
            TopState::Ready(rows) => match rows.next() {
                Some(ranked) => Ok(Some(ranked.binding)),
                None => {
                    self.state = TopState::Done;
                    Ok(None)
                }
            },
            TopState::Unstarted | TopState::Done => Ok(None),
        }
    }

    fn close(&mut self) {
        self.state = TopState::Done;
    }
}

/// ORDER BY + LIMIT without sorting the whole input. With `distinct`, rows
/// equal to one already kept are skipped. A zero limit closes the input at
/// once and never consults the order.
pub fn top_n_by(mut input: QueryIter, order: OrderRef, limit: usize, distinct: bool) -> QueryIter {
    let state = if limit == 0 {
        input.close();
        TopState::Done
    } else {
        TopState::Unstarted
    };
    QueryIter::unary(
        "top_n",
        input,
        TopN {
            limit,
            distinct,
            order,
            state,
        },
    )
}

/// [`top_n_by`] over a list of sort conditions.
pub fn top_n(
    input: QueryIter,
    conditions: Vec<SortCondition>,
    limit: usize,
    distinct: bool,
    ctx: &ExecContext,
) -> QueryIter {
    let order = BindingComparator::new(conditions, ctx.clone()).into_ref();
    top_n_by(input, order, limit, distinct)
}
