//! Solution rows: immutable variable-to-term mappings.
//!
//! A [`Binding`] is a chain of small layers. Extending a binding pushes a new
//! layer that points at its parent, so operators that add one or two columns
//! per row never copy the whole row. Equality, hashing and iteration only
//! look at the logical set of pairs, never at how the chain is shaped.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use smallvec::SmallVec;

use crate::model::{Term, Var};

type Entries = SmallVec<[(Var, Term); 4]>;

struct Layer {
    parent: Option<Arc<Layer>>,
    entries: Entries,
    len: usize,
}

/// One solution row.
#[derive(Clone, Default)]
pub struct Binding {
    head: Option<Arc<Layer>>,
}

impl Binding {
    /// The empty binding, identity element of join.
    pub fn empty() -> Self {
        Self { head: None }
    }

    /// Builds a flat binding from pairs. Later duplicates of a variable are
    /// ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Var, Term)>,
    {
        let mut builder = Binding::empty().builder();
        for (var, term) in pairs {
            builder.try_add(var, term);
        }
        builder.build()
    }

    fn with_layer(parent: &Binding, entries: Entries) -> Self {
        if entries.is_empty() {
            return parent.clone();
        }
        let len = parent.len() + entries.len();
        Self {
            head: Some(Arc::new(Layer {
                parent: parent.head.clone(),
                entries,
                len,
            })),
        }
    }

    /// Number of bound variables.
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |layer| layer.len)
    }

    /// `true` when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value bound to `var`, if any.
    pub fn get(&self, var: &Var) -> Option<&Term> {
        let mut layer = self.head.as_deref();
        while let Some(current) = layer {
            if let Some((_, term)) = current.entries.iter().find(|(v, _)| v == var) {
                return Some(term);
            }
            layer = current.parent.as_deref();
        }
        None
    }

    /// `true` when `var` is bound.
    pub fn contains(&self, var: &Var) -> bool {
        self.get(var).is_some()
    }

    /// Iterates pairs from the oldest layer to the newest.
    pub fn iter(&self) -> BindingIter<'_> {
        let mut layers: SmallVec<[&Layer; 8]> = SmallVec::new();
        let mut layer = self.head.as_deref();
        while let Some(current) = layer {
            layers.push(current);
            layer = current.parent.as_deref();
        }
        BindingIter { layers, entry: 0 }
    }

    /// Bound variables in iteration order.
    pub fn vars(&self) -> Vec<Var> {
        self.iter().map(|(var, _)| var.clone()).collect()
    }

    /// Starts a builder layered on top of this binding.
    pub fn builder(&self) -> BindingBuilder {
        BindingBuilder {
            parent: self.clone(),
            entries: SmallVec::new(),
        }
    }

    /// Adds one pair. Rebinding to an equal term is a no-op; a conflicting
    /// rebind leaves the binding unchanged. Use [`Binding::try_extend`] to
    /// detect the conflict.
    pub fn extend(&self, var: Var, term: Term) -> Binding {
        self.try_extend(var, term).unwrap_or_else(|| self.clone())
    }

    /// Adds one pair, or returns `None` when `var` is already bound to a
    /// different term.
    pub fn try_extend(&self, var: Var, term: Term) -> Option<Binding> {
        match self.get(&var) {
            Some(existing) if existing == &term => Some(self.clone()),
            Some(_) => None,
            None => {
                let mut entries = Entries::new();
                entries.push((var, term));
                Some(Binding::with_layer(self, entries))
            }
        }
    }

    /// Two bindings are compatible when they agree on every shared variable.
    pub fn is_compatible(&self, other: &Binding) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .iter()
            .all(|(var, term)| large.get(var).map_or(true, |found| found == term))
    }

    /// `true` when at least one variable is bound in both.
    pub fn shares_domain(&self, other: &Binding) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().any(|(var, _)| large.contains(var))
    }

    /// Union of two compatible bindings, `None` if they conflict.
    pub fn merge(&self, other: &Binding) -> Option<Binding> {
        if other.is_empty() {
            return Some(self.clone());
        }
        if self.is_empty() {
            return Some(other.clone());
        }
        let mut builder = self.builder();
        for (var, term) in other.iter() {
            if !builder.try_add(var.clone(), term.clone()) {
                return None;
            }
        }
        Some(builder.build())
    }

    /// Keeps only the listed variables.
    pub fn project(&self, vars: &[Var]) -> Binding {
        let entries: Entries = self
            .iter()
            .filter(|(var, _)| vars.contains(var))
            .map(|(var, term)| (var.clone(), term.clone()))
            .collect();
        if entries.len() == self.len() {
            return self.clone();
        }
        Binding::with_layer(&Binding::empty(), entries)
    }

    /// Hides engine-internal variables.
    pub fn project_named(&self) -> Binding {
        if self.iter().all(|(var, _)| var.is_named()) {
            return self.clone();
        }
        let entries: Entries = self
            .iter()
            .filter(|(var, _)| var.is_named())
            .map(|(var, term)| (var.clone(), term.clone()))
            .collect();
        Binding::with_layer(&Binding::empty(), entries)
    }

    /// Drops the listed variables.
    pub fn without(&self, vars: &[Var]) -> Binding {
        if !self.iter().any(|(var, _)| vars.contains(var)) {
            return self.clone();
        }
        let entries: Entries = self
            .iter()
            .filter(|(var, _)| !vars.contains(var))
            .map(|(var, term)| (var.clone(), term.clone()))
            .collect();
        Binding::with_layer(&Binding::empty(), entries)
    }

    fn sorted_pairs(&self) -> Vec<(&Var, &Term)> {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    /// A total order over bindings that depends only on their content.
    pub fn canonical_cmp(&self, other: &Binding) -> Ordering {
        self.sorted_pairs().cmp(&other.sorted_pairs())
    }

    /// Rough in-memory footprint, used by byte-based spill thresholds.
    pub fn estimated_bytes(&self) -> usize {
        self.iter()
            .map(|(var, term)| var.name().len() + term.estimated_bytes() + 16)
            .sum::<usize>()
            + 16
    }
}

/// Iterator over the pairs of a [`Binding`].
pub struct BindingIter<'a> {
    layers: SmallVec<[&'a Layer; 8]>,
    entry: usize,
}

impl<'a> Iterator for BindingIter<'a> {
    type Item = (&'a Var, &'a Term);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let layer = *self.layers.last()?;
            if let Some((var, term)) = layer.entries.get(self.entry) {
                self.entry += 1;
                return Some((var, term));
            }
            self.layers.pop();
            self.entry = 0;
        }
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.head, &other.head) {
            if Arc::ptr_eq(a, b) {
                return true;
            }
        }
        self.iter()
            .all(|(var, term)| other.get(var).map_or(false, |found| found == term))
    }
}

impl Eq for Binding {}

impl Hash for Binding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let pairs = self.sorted_pairs();
        state.write_usize(pairs.len());
        for (var, term) in pairs {
            var.hash(state);
            term.hash(state);
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "( )");
        }
        let mut first = true;
        for (var, term) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "( {var} = {term} )")?;
        }
        Ok(())
    }
}

impl Serialize for Binding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for pair in self.iter() {
            seq.serialize_element(&pair)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Binding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = Vec::<(Var, Term)>::deserialize(deserializer)?;
        Ok(Binding::from_pairs(pairs))
    }
}

/// Accumulates new pairs on top of a parent binding.
///
/// Used by operators that add several variables to one row, where each
/// later expression may need to see the earlier ones (`snapshot`).
pub struct BindingBuilder {
    parent: Binding,
    entries: Entries,
}

impl BindingBuilder {
    /// Value bound to `var` in the parent or in pending entries.
    pub fn get(&self, var: &Var) -> Option<&Term> {
        self.entries
            .iter()
            .find(|(v, _)| v == var)
            .map(|(_, term)| term)
            .or_else(|| self.parent.get(var))
    }

    /// `true` when `var` is bound.
    pub fn contains(&self, var: &Var) -> bool {
        self.get(var).is_some()
    }

    /// Adds a pair. Returns `false` when `var` is already bound to a
    /// different term; an equal rebinding is accepted as a no-op.
    pub fn try_add(&mut self, var: Var, term: Term) -> bool {
        match self.get(&var) {
            Some(existing) => existing == &term,
            None => {
                self.entries.push((var, term));
                true
            }
        }
    }

    /// The binding as extended so far.
    pub fn snapshot(&self) -> Binding {
        Binding::with_layer(&self.parent, self.entries.clone())
    }

    /// Finishes the builder.
    pub fn build(self) -> Binding {
        Binding::with_layer(&self.parent, self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn v(name: &str) -> Var {
        Var::new(name)
    }

    fn hash_of(binding: &Binding) -> u64 {
        let mut hasher = DefaultHasher::new();
        binding.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_ignores_chain_shape() {
        let chained = Binding::empty()
            .extend(v("x"), Term::integer(1))
            .extend(v("y"), Term::integer(2));
        let flat = Binding::from_pairs([(v("y"), Term::integer(2)), (v("x"), Term::integer(1))]);
        assert_eq!(chained, flat);
        assert_eq!(hash_of(&chained), hash_of(&flat));
        assert_eq!(chained.canonical_cmp(&flat), Ordering::Equal);
    }

    #[test]
    fn rebinding_to_different_term_is_incompatible() {
        let b = Binding::empty().extend(v("x"), Term::integer(1));
        assert!(b.try_extend(v("x"), Term::integer(2)).is_none());
        let same = b.try_extend(v("x"), Term::integer(1)).unwrap();
        assert_eq!(same.len(), 1);
        let kept = b.extend(v("x"), Term::integer(2));
        assert_eq!(kept, b);
        assert_eq!(kept.get(&v("x")), Some(&Term::integer(1)));
    }

    #[test]
    fn merge_and_compatibility() {
        let left = Binding::from_pairs([(v("x"), Term::integer(1)), (v("y"), Term::integer(2))]);
        let right = Binding::from_pairs([(v("y"), Term::integer(2)), (v("z"), Term::integer(3))]);
        let conflicting = Binding::from_pairs([(v("y"), Term::integer(9))]);
        assert!(left.is_compatible(&right));
        assert!(left.shares_domain(&right));
        assert!(!left.is_compatible(&conflicting));
        let merged = left.merge(&right).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get(&v("z")), Some(&Term::integer(3)));
        assert!(left.merge(&conflicting).is_none());
    }

    #[test]
    fn builder_snapshot_sees_pending_entries() {
        let base = Binding::empty().extend(v("x"), Term::integer(1));
        let mut builder = base.builder();
        assert!(builder.try_add(v("y"), Term::integer(2)));
        let snapshot = builder.snapshot();
        assert_eq!(snapshot.get(&v("y")), Some(&Term::integer(2)));
        assert!(builder.try_add(v("x"), Term::integer(1)));
        assert!(!builder.try_add(v("x"), Term::integer(5)));
        assert_eq!(builder.build().len(), 2);
    }

    #[test]
    fn projection_helpers() {
        let b = Binding::from_pairs([
            (v("x"), Term::integer(1)),
            (v("~t0"), Term::integer(2)),
            (v("y"), Term::integer(3)),
        ]);
        assert_eq!(b.project_named().vars(), vec![v("x"), v("y")]);
        assert_eq!(b.project(&[v("y")]).vars(), vec![v("y")]);
        assert_eq!(b.without(&[v("x")]).len(), 2);
    }

    #[test]
    fn iteration_is_oldest_first() {
        let b = Binding::empty()
            .extend(v("a"), Term::integer(1))
            .extend(v("b"), Term::integer(2))
            .extend(v("c"), Term::integer(3));
        assert_eq!(b.vars(), vec![v("a"), v("b"), v("c")]);
        assert_eq!(b.to_string(), "( ?a = 1 ) ( ?b = 2 ) ( ?c = 3 )");
    }

    #[test]
    fn serializes_as_flat_pairs() {
        let b = Binding::empty()
            .extend(v("a"), Term::iri("http://example/a"))
            .extend(v("b"), Term::integer(2));
        let json = serde_json::to_string(&b).unwrap();
        let back: Binding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }
}
