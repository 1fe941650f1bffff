use tracing::debug;

use crate::error::Result;
use crate::query::bag::{BagIter, SortedBag};
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::expr::{BindingComparator, OrderRef, SortCondition};
use crate::query::iter::{QueryIter, UnaryOp};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

enum SortState {
    Unstarted,
    Ready(BagIter),
    Done,
}

struct Sort {
    order: OrderRef,
    ctx: ExecContext,
    bag: Option<SortedBag>,
    state: SortState,
}

impl Sort {
    fn drain(&mut self, input: &mut QueryIter, cancel: &CancelSignal) -> Result<BagIter> {
        let timer = profile_timer();
        let bag = self
            .bag
            .insert(SortedBag::for_context(self.order.clone(), &self.ctx));
        let mut rows = 0usize;
        while input.has_next()? {
            cancel.check()?;
            bag.add(input.next_binding()?)?;
            rows += 1;
        }
        debug!(rows, spilled = bag.has_spilled(), "query.sort.drained");
        let iter = bag.iter()?;
        record_profile_timer(QueryProfileKind::SortDrain, timer);
        Ok(iter)
    }
}

impl UnaryOp for Sort {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        if let SortState::Unstarted = self.state {
            let iter = self.drain(input, cancel)?;
            self.state = SortState::Ready(iter);
        }
        match &mut self.state {
            SortState::Ready(iter) => {
                let next = iter.next_binding()?;
                if next.is_none() {
                    self.state = SortState::Done;
                }
                Ok(next)
            }
            SortState::Unstarted | SortState::Done => Ok(None),
        }
    }

    fn close(&mut self) {
        self.state = SortState::Done;
        if let Some(bag) = self.bag.as_mut() {
            bag.close();
        }
    }

    fn request_cancel(&mut self) {
        if let Some(bag) = self.bag.as_mut() {
            bag.cancel();
        }
    }
}

/// ORDER BY with an arbitrary binding order. Drains the whole input into a
/// spill-capable bag on first pull.
pub fn sort_by(input: QueryIter, order: OrderRef, ctx: &ExecContext) -> QueryIter {
    QueryIter::unary(
        "sort",
        input,
        Sort {
            order,
            ctx: ctx.clone(),
            bag: None,
            state: SortState::Unstarted,
        },
    )
}

/// ORDER BY a list of sort conditions.
pub fn sort(input: QueryIter, conditions: Vec<SortCondition>, ctx: &ExecContext) -> QueryIter {
    let order = BindingComparator::new(conditions, ctx.clone()).into_ref();
    sort_by(input, order, ctx)
}
