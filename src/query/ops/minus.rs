use tracing::trace;

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::index_table::IndexTable;
use crate::query::iter::{BinaryOp, QueryIter};

struct Minus {
    table: Option<IndexTable>,
}

impl BinaryOp for Minus {
    fn next_from(
        &mut self,
        left: &mut QueryIter,
        right: &mut QueryIter,
        cancel: &CancelSignal,
    ) -> Result<Option<Binding>> {
        if self.table.is_none() {
            let table = IndexTable::build(right, cancel)?;
            trace!(rows = table.len(), "query.minus.indexed");
            self.table = Some(table);
        }
        let Some(table) = self.table.as_ref() else {
            return Ok(None);
        };
        while left.has_next()? {
            cancel.check()?;
            let binding = left.next_binding()?;
            if !table.contains_compatible_with_shared_domain(&binding) {
                return Ok(Some(binding));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.table = None;
    }
}

/// MINUS. Peeks at `right` once: when it is empty `left` is returned as is
/// and no index is built. Otherwise `right` is materialized on first pull.
pub fn minus(left: QueryIter, mut right: QueryIter) -> Result<QueryIter> {
    if !right.has_next()? {
        right.close();
        return Ok(left);
    }
    Ok(QueryIter::binary("minus", left, right, Minus { table: None }))
}
