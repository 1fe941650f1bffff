use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::Result;
use crate::model::{Term, Var};
use crate::query::binding::Binding;
use crate::query::cancel::CancelSignal;
use crate::query::iter::QueryIter;

type Key = SmallVec<[Term; 2]>;

/// Materialized right-hand side of MINUS and the half-joins.
///
/// Rows that bind every key variable are bucketed by the values of those
/// variables, everything else sits in a scan list. Lookups from a row that
/// binds all key variables only visit one bucket plus the scan list.
#[derive(Debug, Default)]
pub struct IndexTable {
    key_vars: Vec<Var>,
    buckets: FxHashMap<Key, Vec<Binding>>,
    partial: Vec<Binding>,
    len: usize,
}

impl IndexTable {
    /// An empty table keyed on `key_vars`.
    pub fn new(key_vars: Vec<Var>) -> Self {
        Self {
            key_vars,
            ..Self::default()
        }
    }

    /// Builds a table from rows, keyed on the variables every row binds.
    pub fn from_rows(rows: Vec<Binding>) -> Self {
        let mut key_vars: Vec<Var> = rows.first().map(Binding::vars).unwrap_or_default();
        for row in rows.iter().skip(1) {
            key_vars.retain(|var| row.contains(var));
        }
        let mut table = Self::new(key_vars);
        for row in rows {
            table.insert(row);
        }
        table
    }

    /// Drains `input` into a table, checking `cancel` between rows.
    pub fn build(input: &mut QueryIter, cancel: &CancelSignal) -> Result<Self> {
        let mut rows = Vec::new();
        while input.has_next()? {
            cancel.check()?;
            rows.push(input.next_binding()?);
        }
        Ok(Self::from_rows(rows))
    }

    /// Adds one row.
    pub fn insert(&mut self, row: Binding) {
        self.len += 1;
        match self.key_of(&row) {
            Some(key) => self.buckets.entry(key).or_default().push(row),
            None => self.partial.push(row),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Key variables.
    pub fn key_vars(&self) -> &[Var] {
        &self.key_vars
    }

    fn key_of(&self, row: &Binding) -> Option<Key> {
        self.key_vars
            .iter()
            .map(|var| row.get(var).cloned())
            .collect()
    }

    fn candidates<'a>(&'a self, row: &Binding) -> Box<dyn Iterator<Item = &'a Binding> + 'a> {
        let partial = self.partial.iter();
        match self.key_of(row) {
            Some(key) if !self.key_vars.is_empty() => Box::new(
                self.buckets
                    .get(&key)
                    .into_iter()
                    .flatten()
                    .chain(partial),
            ),
            _ => Box::new(self.buckets.values().flatten().chain(partial)),
        }
    }

    /// MINUS test: some row is compatible with `row` and shares at least
    /// one variable with it.
    pub fn contains_compatible_with_shared_domain(&self, row: &Binding) -> bool {
        self.candidates(row)
            .any(|candidate| candidate.shares_domain(row) && candidate.is_compatible(row))
    }

    /// Half-join test: some row is compatible with `row`.
    pub fn contains_compatible(&self, row: &Binding) -> bool {
        self.candidates(row)
            .any(|candidate| candidate.is_compatible(row))
    }
}
