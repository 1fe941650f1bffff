//! Leaf iterators over already-materialized bindings.

use crate::error::Result;
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::iter::{BindingStream, QueryIter};

struct VecStream {
    rows: std::vec::IntoIter<Binding>,
}

impl BindingStream for VecStream {
    fn try_next(&mut self, _cancel: &CancelSignal) -> Result<Option<Binding>> {
        Ok(self.rows.next())
    }

    fn close(&mut self) {
        self.rows = Vec::new().into_iter();
    }
}

impl QueryIter {
    /// One empty binding: the identity of join.
    pub fn root() -> Self {
        Self::single(Binding::empty())
    }

    /// No bindings at all.
    pub fn empty() -> Self {
        Self::from_bindings(Vec::new())
    }

    /// Exactly one binding.
    pub fn single(binding: Binding) -> Self {
        Self::from_bindings(vec![binding])
    }

    /// The given bindings, in order.
    pub fn from_bindings(rows: Vec<Binding>) -> Self {
        QueryIter::new(
            "table",
            VecStream {
                rows: rows.into_iter(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Term, Var};

    #[test]
    fn tables() {
        assert_eq!(QueryIter::root().collect_bindings().unwrap(), vec![Binding::empty()]);
        assert!(QueryIter::empty().collect_bindings().unwrap().is_empty());
        let row = Binding::empty().extend(Var::new("x"), Term::integer(1));
        let rows = QueryIter::from_bindings(vec![row.clone(), row.clone()])
            .collect_bindings()
            .unwrap();
        assert_eq!(rows, vec![row.clone(), row]);
    }
}
