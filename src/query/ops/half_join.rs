use tracing::trace;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::index_table::IndexTable;
use crate::query::iter::{BinaryOp, QueryIter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Polarity {
    KeepMatches,
    KeepMisses,
}

struct HalfJoin {
    polarity: Polarity,
    table: Option<IndexTable>,
}

impl BinaryOp for HalfJoin {
    fn next_from(
        &mut self,
        left: &mut QueryIter,
        right: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        if self.table.is_none() {
            let table = IndexTable::build(right, cancel)?;
            trace!(rows = table.len(), polarity = ?self.polarity, "query.half_join.indexed");
            self.table = Some(table);
        }
        let Some(table) = self.table.as_ref() else {
            return Ok(None);
        };
        while left.has_next()? {
            cancel.check()?;
            let binding = left.next_binding()?;
            let matched = table.contains_compatible(&binding);
            if matched == (self.polarity == Polarity::KeepMatches) {
                return Ok(Some(binding));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.table = None;
    }
}

/// Left rows that are compatible with at least one right row. Right
/// variables are not added to the output.
pub fn semi_join(left: QueryIter, right: QueryIter) -> QueryIter {
    QueryIter::binary(
        "semi_join",
        left,
        right,
        HalfJoin {
            polarity: Polarity::KeepMatches,
            table: None,
        },
    )
}

/// Left rows that are compatible with no right row.
pub fn anti_join(left: QueryIter, right: QueryIter) -> QueryIter {
    QueryIter::binary(
        "anti_join",
        left,
        right,
        HalfJoin {
            polarity: Polarity::KeepMisses,
            table: None,
        },
    )
}
