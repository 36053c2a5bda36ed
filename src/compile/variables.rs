//! Dense internal variable space.

use std::collections::HashMap;

use crate::id::GroundPredicateId;

/// Bijection between unobserved ground predicates and dense indices `0..N`.
///
/// Grown lazily by the compiler and never shrunk, so indices stay stable
/// across incremental rebuilds.
#[derive(Debug, Clone, Default)]
pub struct VariableMap {
    to_internal: HashMap<GroundPredicateId, usize>,
    to_external: Vec<GroundPredicateId>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `id`, allocating the next one if it is new.
    pub fn get_or_insert(&mut self, id: GroundPredicateId) -> usize {
        if let Some(&index) = self.to_internal.get(&id) {
            return index;
        }
        let index = self.to_external.len();
        self.to_external.push(id);
        self.to_internal.insert(id, index);
        index
    }

    pub fn index_of(&self, id: GroundPredicateId) -> Option<usize> {
        self.to_internal.get(&id).copied()
    }

    pub fn ground_predicate(&self, index: usize) -> Option<GroundPredicateId> {
        self.to_external.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.to_external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_external.is_empty()
    }

    /// `(index, ground predicate)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, GroundPredicateId)> + '_ {
        self.to_external.iter().copied().enumerate()
    }
}
