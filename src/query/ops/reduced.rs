use std::collections::VecDeque;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::context::ExecContext;
use crate::query::iter::{QueryIter, UnaryOp};

struct Reduced {
    window: usize,
    recent: VecDeque<Binding>,
}

impl UnaryOp for Reduced {
    fn next_from(
        &mut self,
        input: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        while input.has_next()? {
            cancel.check()?;
            let binding = input.next_binding()?.project_named();
            if self.recent.contains(&binding) {
                continue;
            }
            if self.recent.len() == self.window {
                self.recent.pop_front();
            }
            self.recent.push_back(binding.clone());
            return Ok(Some(binding));
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.recent.clear();
    }
}

/// REDUCED: drops a row equal to one of the last `reduced_window` rows
/// returned. Adjacent duplicates are always removed.
pub fn reduced(input: QueryIter, ctx: &ExecContext) -> QueryIter {
    let window = ctx.config().reduced_window.max(1);
    QueryIter::unary(
        "reduced",
        input,
        Reduced {
            window,
            recent: VecDeque::new(),
        },
    )
}
