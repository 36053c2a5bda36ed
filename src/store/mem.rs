//! In-memory fact store backed by DashMap.
//!
//! Ground predicates are indexed three ways: by their (predicate, arguments)
//! key, per predicate, and per (predicate, slot, value) posting list. The key
//! index's entry API serializes get-or-create, so concurrent grounding never
//! issues two identifiers for one key. All data is lost on process exit.

use std::fmt::Display;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{
    EntityType, FactStore, GroundPredicate, Predicate, StoreResult, TruthValue, check_truth_value,
};
use crate::error::StoreError;
use crate::id::{EntityTypeId, Generation, GroundPredicateId, IdAllocator, PredicateId};

type GroundKey = (PredicateId, Vec<u64>);
type PostingKey = (PredicateId, usize, u64);

/// Concurrent in-memory fact store using sharded hashmaps.
#[derive(Debug)]
pub struct MemFactStore {
    generation: Generation,
    type_ids: IdAllocator,
    predicate_ids: IdAllocator,
    ground_ids: IdAllocator,
    entity_types: DashMap<EntityTypeId, EntityType>,
    predicates: DashMap<PredicateId, Predicate>,
    ground: DashMap<GroundPredicateId, GroundPredicate>,
    type_names: DashMap<String, EntityTypeId>,
    predicate_names: DashMap<String, PredicateId>,
    keys: DashMap<GroundKey, GroundPredicateId>,
    by_predicate: DashMap<PredicateId, Vec<GroundPredicateId>>,
    postings: DashMap<PostingKey, Vec<GroundPredicateId>>,
}

impl MemFactStore {
    /// Create an empty store with a fresh random generation.
    pub fn new() -> Self {
        Self::with_generation(Generation::random())
    }

    /// Create an empty store stamping identifiers with `generation`.
    pub fn with_generation(generation: Generation) -> Self {
        Self {
            generation,
            type_ids: IdAllocator::new(generation),
            predicate_ids: IdAllocator::new(generation),
            ground_ids: IdAllocator::new(generation),
            entity_types: DashMap::new(),
            predicates: DashMap::new(),
            ground: DashMap::new(),
            type_names: DashMap::new(),
            predicate_names: DashMap::new(),
            keys: DashMap::new(),
            by_predicate: DashMap::new(),
            postings: DashMap::new(),
        }
    }

    fn check_generation(&self, generation: Generation, id: impl Display) -> StoreResult<()> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(StoreError::ForeignId { id: id.to_string() })
        }
    }

    fn predicate_checked(&self, id: PredicateId) -> StoreResult<Predicate> {
        self.check_generation(id.generation(), id)?;
        self.predicates
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or(StoreError::UnknownPredicate { id })
    }

    /// Validate an argument tuple against the predicate's signature.
    fn check_arguments(&self, predicate: &Predicate, arguments: &[u64]) -> StoreResult<()> {
        if predicate.arity() != arguments.len() {
            return Err(StoreError::ArityMismatch {
                predicate: predicate.id,
                expected: predicate.arity(),
                actual: arguments.len(),
            });
        }
        for (&entity_type, &value) in predicate.arguments.iter().zip(arguments) {
            let allowed = self
                .entity_types
                .get(&entity_type)
                .map(|t| t.allows(value))
                .ok_or(StoreError::UnknownEntityType { id: entity_type })?;
            if !allowed {
                return Err(StoreError::ValueNotAllowed { entity_type, value });
            }
        }
        Ok(())
    }

    /// Insert a new ground predicate and update the secondary indexes.
    fn insert_ground(&self, ground: GroundPredicate) {
        let id = ground.id;
        let predicate = ground.predicate;
        let arguments = ground.arguments.clone();
        self.ground.insert(id, ground);
        self.by_predicate.entry(predicate).or_default().push(id);
        for (slot, value) in arguments.into_iter().enumerate() {
            self.postings
                .entry((predicate, slot, value))
                .or_default()
                .push(id);
        }
    }

    fn next_ground_id(&self) -> StoreResult<GroundPredicateId> {
        self.ground_ids
            .next_id()
            .ok_or(StoreError::IdSpaceExhausted)
    }

    /// Number of registered predicates.
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    /// Number of registered entity types.
    pub fn entity_type_count(&self) -> usize {
        self.entity_types.len()
    }
}

impl Default for MemFactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FactStore for MemFactStore {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn add_entity_type(&self, name: Option<&str>, values: &[u64]) -> StoreResult<EntityTypeId> {
        let id: EntityTypeId = self
            .type_ids
            .next_id()
            .ok_or(StoreError::IdSpaceExhausted)?;
        let entity_type = EntityType {
            id,
            name: name.map(str::to_string),
            values: values.iter().copied().collect(),
        };
        match name {
            Some(name) => match self.type_names.entry(name.to_string()) {
                Entry::Occupied(_) => {
                    return Err(StoreError::DuplicateName {
                        name: name.to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    self.entity_types.insert(id, entity_type);
                    slot.insert(id);
                }
            },
            None => {
                self.entity_types.insert(id, entity_type);
            }
        }
        tracing::debug!(%id, values = values.len(), "registered entity type");
        Ok(id)
    }

    fn add_predicate(
        &self,
        name: Option<&str>,
        arguments: &[EntityTypeId],
        closed: bool,
    ) -> StoreResult<PredicateId> {
        for &argument in arguments {
            self.check_generation(argument.generation(), argument)?;
            if !self.entity_types.contains_key(&argument) {
                return Err(StoreError::UnknownEntityType { id: argument });
            }
        }
        let id: PredicateId = self
            .predicate_ids
            .next_id()
            .ok_or(StoreError::IdSpaceExhausted)?;
        let predicate = Predicate {
            id,
            name: name.map(str::to_string),
            arguments: arguments.to_vec(),
            closed,
        };
        match name {
            Some(name) => match self.predicate_names.entry(name.to_string()) {
                Entry::Occupied(_) => {
                    return Err(StoreError::DuplicateName {
                        name: name.to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    self.predicates.insert(id, predicate);
                    slot.insert(id);
                }
            },
            None => {
                self.predicates.insert(id, predicate);
            }
        }
        tracing::debug!(%id, arity = arguments.len(), closed, "registered predicate");
        Ok(id)
    }

    fn add_ground_predicate(
        &self,
        predicate: PredicateId,
        arguments: &[u64],
        value: Option<f64>,
    ) -> StoreResult<GroundPredicateId> {
        if let Some(v) = value {
            check_truth_value(v)?;
        }
        let pred = self.predicate_checked(predicate)?;
        self.check_arguments(&pred, arguments)?;

        match self.keys.entry((predicate, arguments.to_vec())) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                let stored = self.ground.get(&id).and_then(|g| g.observed);
                if stored == value {
                    Ok(id)
                } else {
                    Err(StoreError::InconsistentValue {
                        id,
                        stored,
                        asserted: value,
                    })
                }
            }
            Entry::Vacant(slot) => {
                let id = self.next_ground_id()?;
                self.insert_ground(GroundPredicate {
                    id,
                    predicate,
                    arguments: arguments.to_vec(),
                    observed: value,
                    inferred: None,
                });
                slot.insert(id);
                Ok(id)
            }
        }
    }

    fn get_or_create_ground_predicate(
        &self,
        predicate: PredicateId,
        arguments: &[u64],
    ) -> StoreResult<(GroundPredicateId, bool)> {
        let pred = self.predicate_checked(predicate)?;
        self.check_arguments(&pred, arguments)?;

        match self.keys.entry((predicate, arguments.to_vec())) {
            Entry::Occupied(existing) => Ok((*existing.get(), false)),
            Entry::Vacant(slot) => {
                let id = self.next_ground_id()?;
                self.insert_ground(GroundPredicate {
                    id,
                    predicate,
                    arguments: arguments.to_vec(),
                    observed: None,
                    inferred: None,
                });
                slot.insert(id);
                Ok((id, true))
            }
        }
    }

    fn entity_type(&self, id: EntityTypeId) -> Option<EntityType> {
        self.entity_types.get(&id).map(|t| t.value().clone())
    }

    fn predicate(&self, id: PredicateId) -> Option<Predicate> {
        self.predicates.get(&id).map(|p| p.value().clone())
    }

    fn ground_predicate(&self, id: GroundPredicateId) -> Option<GroundPredicate> {
        self.ground.get(&id).map(|g| g.value().clone())
    }

    fn entity_type_by_name(&self, name: &str) -> Option<EntityTypeId> {
        self.type_names.get(name).map(|id| *id)
    }

    fn predicate_by_name(&self, name: &str) -> Option<PredicateId> {
        self.predicate_names.get(name).map(|id| *id)
    }

    fn find_ground_predicate(
        &self,
        predicate: PredicateId,
        arguments: &[u64],
    ) -> Option<GroundPredicateId> {
        self.keys
            .get(&(predicate, arguments.to_vec()))
            .map(|id| *id)
    }

    fn ground_predicates(&self) -> Vec<GroundPredicateId> {
        let mut ids: Vec<GroundPredicateId> = self.ground.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn ground_predicates_of(&self, predicate: PredicateId) -> Vec<GroundPredicateId> {
        let mut ids = self
            .by_predicate
            .get(&predicate)
            .map(|list| list.value().clone())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    fn ground_predicate_count(&self) -> usize {
        self.ground.len()
    }

    fn truth_value(&self, predicate: PredicateId, arguments: &[u64]) -> StoreResult<TruthValue> {
        let pred = self.predicate_checked(predicate)?;
        let observed = self
            .find_ground_predicate(predicate, arguments)
            .and_then(|id| self.ground.get(&id).and_then(|g| g.observed));
        Ok(match observed {
            Some(v) => TruthValue::Observed(v),
            None if pred.closed => TruthValue::False,
            None => TruthValue::Unknown,
        })
    }

    fn matching_ground_predicates(
        &self,
        predicate: PredicateId,
        pattern: &[Option<u64>],
    ) -> StoreResult<Vec<GroundPredicate>> {
        let pred = self.predicate_checked(predicate)?;
        if pattern.len() != pred.arity() {
            return Err(StoreError::ArityMismatch {
                predicate,
                expected: pred.arity(),
                actual: pattern.len(),
            });
        }

        let bound: Vec<(usize, u64)> = pattern
            .iter()
            .enumerate()
            .filter_map(|(slot, value)| value.map(|v| (slot, v)))
            .collect();

        // Scan the shortest posting list among the bound slots.
        let candidates = if bound.is_empty() {
            self.by_predicate
                .get(&predicate)
                .map(|list| list.value().clone())
                .unwrap_or_default()
        } else {
            let mut best: Option<(usize, PostingKey)> = None;
            for &(slot, value) in &bound {
                let key = (predicate, slot, value);
                let len = self.postings.get(&key).map_or(0, |list| list.len());
                if len == 0 {
                    return Ok(Vec::new());
                }
                if best.is_none_or(|(best_len, _)| len < best_len) {
                    best = Some((len, key));
                }
            }
            best.and_then(|(_, key)| self.postings.get(&key).map(|list| list.value().clone()))
                .unwrap_or_default()
        };

        let mut matches: Vec<GroundPredicate> = candidates
            .into_iter()
            .filter_map(|id| self.ground.get(&id).map(|g| g.value().clone()))
            .filter(|g| {
                bound
                    .iter()
                    .all(|&(slot, value)| g.arguments.get(slot) == Some(&value))
            })
            .collect();
        matches.sort_unstable_by_key(|g| g.id);
        Ok(matches)
    }

    fn set_inferred_value(&self, id: GroundPredicateId, value: f64) -> StoreResult<()> {
        check_truth_value(value)?;
        self.check_generation(id.generation(), id)?;
        let mut ground = self
            .ground
            .get_mut(&id)
            .ok_or(StoreError::UnknownGroundPredicate { id })?;
        ground.inferred = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people(store: &MemFactStore) -> (EntityTypeId, PredicateId, PredicateId) {
        let person = store.add_entity_type(Some("Person"), &[1, 2, 3]).unwrap();
        let friends = store
            .add_predicate(Some("Friends"), &[person, person], true)
            .unwrap();
        let smokes = store.add_predicate(Some("Smokes"), &[person], false).unwrap();
        (person, friends, smokes)
    }

    #[test]
    fn add_and_lookup() {
        let store = MemFactStore::new();
        let (person, friends, _) = people(&store);
        let id = store.add_ground_predicate(friends, &[1, 2], Some(1.0)).unwrap();

        assert_eq!(store.entity_type_by_name("Person"), Some(person));
        assert_eq!(store.predicate_by_name("Friends"), Some(friends));
        assert_eq!(store.find_ground_predicate(friends, &[1, 2]), Some(id));
        let ground = store.ground_predicate(id).unwrap();
        assert_eq!(ground.arguments, vec![1, 2]);
        assert_eq!(ground.observed, Some(1.0));
        assert_eq!(store.ground_predicate_count(), 1);
    }

    #[test]
    fn reassert_same_value_is_idempotent() {
        let store = MemFactStore::new();
        let (_, friends, _) = people(&store);
        let a = store.add_ground_predicate(friends, &[1, 2], Some(0.5)).unwrap();
        let b = store.add_ground_predicate(friends, &[1, 2], Some(0.5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.ground_predicate_count(), 1);
    }

    #[test]
    fn reassert_different_value_is_error() {
        let store = MemFactStore::new();
        let (_, friends, _) = people(&store);
        store.add_ground_predicate(friends, &[1, 2], Some(0.5)).unwrap();
        let err = store
            .add_ground_predicate(friends, &[1, 2], Some(0.7))
            .unwrap_err();
        assert!(matches!(err, StoreError::InconsistentValue { .. }));

        let err = store.add_ground_predicate(friends, &[1, 2], None).unwrap_err();
        assert!(matches!(err, StoreError::InconsistentValue { .. }));
    }

    #[test]
    fn arguments_are_validated() {
        let store = MemFactStore::new();
        let (_, friends, _) = people(&store);
        assert!(matches!(
            store.add_ground_predicate(friends, &[1], None),
            Err(StoreError::ArityMismatch { .. })
        ));
        assert!(matches!(
            store.add_ground_predicate(friends, &[1, 9], None),
            Err(StoreError::ValueNotAllowed { value: 9, .. })
        ));
        assert!(matches!(
            store.add_ground_predicate(friends, &[1, 2], Some(2.0)),
            Err(StoreError::InvalidTruthValue { .. })
        ));
    }

    #[test]
    fn closed_world_truth_values() {
        let store = MemFactStore::new();
        let (_, friends, smokes) = people(&store);
        store.add_ground_predicate(friends, &[1, 2], Some(0.8)).unwrap();

        assert_eq!(
            store.truth_value(friends, &[1, 2]).unwrap(),
            TruthValue::Observed(0.8)
        );
        assert_eq!(store.truth_value(friends, &[2, 1]).unwrap(), TruthValue::False);
        assert_eq!(store.truth_value(smokes, &[1]).unwrap(), TruthValue::Unknown);

        // A stored latent grounding of a closed predicate is still false.
        store.get_or_create_ground_predicate(friends, &[3, 3]).unwrap();
        assert_eq!(store.truth_value(friends, &[3, 3]).unwrap(), TruthValue::False);
    }

    #[test]
    fn get_or_create_reuses_existing() {
        let store = MemFactStore::new();
        let (_, _, smokes) = people(&store);
        let observed = store.add_ground_predicate(smokes, &[1], Some(1.0)).unwrap();
        let (id, created) = store.get_or_create_ground_predicate(smokes, &[1]).unwrap();
        assert_eq!(id, observed);
        assert!(!created);

        let (latent, created) = store.get_or_create_ground_predicate(smokes, &[2]).unwrap();
        assert!(created);
        assert_eq!(store.ground_predicate(latent).unwrap().observed, None);
    }

    #[test]
    fn matching_uses_bound_slots() {
        let store = MemFactStore::new();
        let (_, friends, _) = people(&store);
        let a = store.add_ground_predicate(friends, &[1, 2], Some(1.0)).unwrap();
        let b = store.add_ground_predicate(friends, &[1, 3], Some(1.0)).unwrap();
        let c = store.add_ground_predicate(friends, &[2, 3], Some(1.0)).unwrap();

        let ids = |pattern: &[Option<u64>]| -> Vec<GroundPredicateId> {
            store
                .matching_ground_predicates(friends, pattern)
                .unwrap()
                .into_iter()
                .map(|g| g.id)
                .collect()
        };
        assert_eq!(ids(&[None, None]), vec![a, b, c]);
        assert_eq!(ids(&[Some(1), None]), vec![a, b]);
        assert_eq!(ids(&[None, Some(3)]), vec![b, c]);
        assert_eq!(ids(&[Some(2), Some(3)]), vec![c]);
        assert!(ids(&[Some(3), None]).is_empty());
    }

    #[test]
    fn foreign_ids_are_rejected() {
        let ours = MemFactStore::with_generation(Generation::from_raw(1));
        let theirs = MemFactStore::with_generation(Generation::from_raw(2));
        let (_, _, smokes) = people(&theirs);
        people(&ours);
        assert!(matches!(
            ours.add_ground_predicate(smokes, &[1], None),
            Err(StoreError::ForeignId { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let store = MemFactStore::new();
        let (person, _, _) = people(&store);
        assert!(matches!(
            store.add_entity_type(Some("Person"), &[1]),
            Err(StoreError::DuplicateName { .. })
        ));
        assert!(matches!(
            store.add_predicate(Some("Smokes"), &[person], false),
            Err(StoreError::DuplicateName { .. })
        ));
    }

    #[test]
    fn inferred_value_does_not_observe() {
        let store = MemFactStore::new();
        let (_, _, smokes) = people(&store);
        let (id, _) = store.get_or_create_ground_predicate(smokes, &[2]).unwrap();
        store.set_inferred_value(id, 0.25).unwrap();
        let ground = store.ground_predicate(id).unwrap();
        assert_eq!(ground.observed, None);
        assert_eq!(ground.value(), Some(0.25));
        assert_eq!(store.truth_value(smokes, &[2]).unwrap(), TruthValue::Unknown);
    }

    #[test]
    fn concurrent_get_or_create() {
        use std::sync::Arc;
        let store = Arc::new(MemFactStore::new());
        let (_, friends, _) = people(&store);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    for a in 1..=3 {
                        for b in 1..=3 {
                            ids.push(store.get_or_create_ground_predicate(friends, &[a, b]).unwrap().0);
                        }
                    }
                    ids
                })
            })
            .collect();
        let results: Vec<Vec<GroundPredicateId>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
        assert_eq!(store.ground_predicate_count(), 9);
    }
}
