use rustc_hash::FxHashSet;
use tracing::debug;

use crate::config::ThresholdPolicy;
use crate::error::Result;
use crate::query::bag::{BagIter, DistinctBag};
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::expr::OrderRef;
use crate::query::iter::{QueryIter, UnaryOp};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};

enum Phase {
    Streaming,
    Spilled(BagIter),
    Done,
}

/// Streams first occurrences while the seen-set stays under the threshold.
/// The first new row past the threshold switches to a spill bag: the whole
/// remaining input is drained into it before anything else is returned.
struct Distinct {
    seen: FxHashSet<Binding>,
    seen_bytes: usize,
    policy: ThresholdPolicy,
    hint: Option<OrderRef>,
    ctx: ExecContext,
    bag: Option<DistinctBag>,
    phase: Phase,
}

impl Distinct {
    fn next_unseen(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        while input.has_next()? {
            cancel.check()?;
            let binding = input.next_binding()?.project_named();
            if !self.seen.contains(&binding) {
                return Ok(Some(binding));
            }
        }
        Ok(None)
    }

    fn spill(
        &mut self,
        first: Binding,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<BagIter> {
        let timer = profile_timer();
        debug!(seen = self.seen.len(), "query.distinct.spill");
        let bag = self
            .bag
            .insert(DistinctBag::for_context(self.hint.clone(), &self.ctx));
        bag.add(first)?;
        while input.has_next()? {
            cancel.check()?;
            let binding = input.next_binding()?.project_named();
            if !self.seen.contains(&binding) {
                bag.add(binding)?;
            }
        }
        let iter = bag.iter()?;
        record_profile_timer(QueryProfileKind::DistinctSpill, timer);
        Ok(iter)
    }
}

impl UnaryOp for Distinct {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        loop {
            match &mut self.phase {
                Phase::Done => return Ok(None),
                Phase::Spilled(iter) => {
                    cancel.check()?;
                    let next = iter.next_binding()?;
                    if next.is_none() {
                        self.phase = Phase::Done;
                    }
                    return Ok(next);
                }
                Phase::Streaming => {}
            }
            let Some(binding) = self.next_unseen(input, cancel)? else {
                self.phase = Phase::Done;
                return Ok(None);
            };
            if !self.policy.is_exceeded(self.seen.len(), self.seen_bytes) {
                if matches!(self.policy, ThresholdPolicy::Bytes(_)) {
                    self.seen_bytes += binding.estimated_bytes();
                }
                self.seen.insert(binding.clone());
                return Ok(Some(binding));
            }
            let iter = self.spill(binding, input, cancel)?;
            self.phase = Phase::Spilled(iter);
        }
    }

    fn close(&mut self) {
        self.phase = Phase::Done;
        self.seen = FxHashSet::default();
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

/// DISTINCT over named variables. `hint` orders the spilled output, so a
/// spill stays consistent with a surrounding ORDER BY.
pub fn distinct(input: QueryIter, hint: Option<OrderRef>, ctx: &ExecContext) -> QueryIter {
    QueryIter::unary(
        "distinct",
        input,
        Distinct {
            seen: FxHashSet::default(),
            seen_bytes: 0,
            policy: ctx.config().threshold_policy(),
            hint,
            ctx: ctx.clone(),
            bag: None,
            phase: Phase::Streaming,
        },
    )
}
