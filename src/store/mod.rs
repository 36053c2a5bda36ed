//! Fact store: entity types, predicates and ground predicates.
//!
//! The [`FactStore`] trait is the backend contract the grounding engine, the
//! rule compiler and the engine facade depend on. [`MemFactStore`] is the
//! in-memory, hash-indexed implementation backed by DashMap.
//!
//! Closed predicates follow the closed-world assumption: an un-asserted
//! grounding of a closed predicate is false rather than unknown.

pub mod mem;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::id::{EntityTypeId, Generation, GroundPredicateId, PredicateId};

pub use mem::MemFactStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A named domain of integer entity values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: EntityTypeId,
    pub name: Option<String>,
    /// Allowed value identifiers, ascending.
    pub values: BTreeSet<u64>,
}

impl EntityType {
    pub fn allows(&self, value: u64) -> bool {
        self.values.contains(&value)
    }
}

/// A typed relation symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub id: PredicateId,
    pub name: Option<String>,
    /// Entity type of each argument slot.
    pub arguments: Vec<EntityTypeId>,
    /// Un-asserted groundings of a closed predicate are false, not unknown.
    pub closed: bool,
}

impl Predicate {
    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    /// Display label: the name if present, else the identifier.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// A predicate instantiated with concrete argument values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundPredicate {
    pub id: GroundPredicateId,
    pub predicate: PredicateId,
    pub arguments: Vec<u64>,
    /// Observed truth value. `None` means latent.
    pub observed: Option<f64>,
    /// Most recent solver output or fixed value. Never turns a latent predicate
    /// into an observed one.
    pub inferred: Option<f64>,
}

impl GroundPredicate {
    /// Observed value if present, else the inferred one.
    pub fn value(&self) -> Option<f64> {
        self.observed.or(self.inferred)
    }

    pub fn is_observed(&self) -> bool {
        self.observed.is_some()
    }
}

/// Truth of a (predicate, arguments) pair as seen by grounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TruthValue {
    /// An asserted value in [0, 1].
    Observed(f64),
    /// No value, but the predicate is closed.
    False,
    /// No value and the predicate is open.
    Unknown,
}

impl TruthValue {
    /// Numeric value, with closed-world falsity as 0. `None` when unknown.
    pub fn value(self) -> Option<f64> {
        match self {
            TruthValue::Observed(v) => Some(v),
            TruthValue::False => Some(0.0),
            TruthValue::Unknown => None,
        }
    }
}

/// Check that `value` is a usable soft truth value.
pub fn check_truth_value(value: f64) -> StoreResult<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(StoreError::InvalidTruthValue { value })
    }
}

/// Backend contract for fact storage.
///
/// All methods take `&self`; implementations synchronize internally so a
/// store can be shared across grounding threads.
pub trait FactStore: Send + Sync {
    /// Generation stamped into every identifier this store issues.
    fn generation(&self) -> Generation;

    /// Register an entity type with its allowed values.
    fn add_entity_type(&self, name: Option<&str>, values: &[u64]) -> StoreResult<EntityTypeId>;

    /// Register a predicate over the given argument types.
    fn add_predicate(
        &self,
        name: Option<&str>,
        arguments: &[EntityTypeId],
        closed: bool,
    ) -> StoreResult<PredicateId>;

    /// Assert a ground predicate, optionally with an observed value.
    ///
    /// Idempotent when the same value is reasserted; a different value is
    /// [`StoreError::InconsistentValue`].
    fn add_ground_predicate(
        &self,
        predicate: PredicateId,
        arguments: &[u64],
        value: Option<f64>,
    ) -> StoreResult<GroundPredicateId>;

    /// Atomically look up or create a latent ground predicate.
    ///
    /// Returns the identifier and whether it was created by this call.
    fn get_or_create_ground_predicate(
        &self,
        predicate: PredicateId,
        arguments: &[u64],
    ) -> StoreResult<(GroundPredicateId, bool)>;

    fn entity_type(&self, id: EntityTypeId) -> Option<EntityType>;

    fn predicate(&self, id: PredicateId) -> Option<Predicate>;

    fn ground_predicate(&self, id: GroundPredicateId) -> Option<GroundPredicate>;

    fn entity_type_by_name(&self, name: &str) -> Option<EntityTypeId>;

    fn predicate_by_name(&self, name: &str) -> Option<PredicateId>;

    /// Look up a ground predicate by its (predicate, arguments) key.
    fn find_ground_predicate(
        &self,
        predicate: PredicateId,
        arguments: &[u64],
    ) -> Option<GroundPredicateId>;

    /// All ground predicates, ordered by identifier.
    fn ground_predicates(&self) -> Vec<GroundPredicateId>;

    /// Ground predicates of one predicate, ordered by identifier.
    fn ground_predicates_of(&self, predicate: PredicateId) -> Vec<GroundPredicateId>;

    fn ground_predicate_count(&self) -> usize;

    /// Observed value, closed-world falsity, or unknown.
    fn truth_value(&self, predicate: PredicateId, arguments: &[u64]) -> StoreResult<TruthValue>;

    /// Bulk partial join: every ground predicate of `predicate` whose bound
    /// slots (`Some`) equal the pattern, ordered by identifier.
    fn matching_ground_predicates(
        &self,
        predicate: PredicateId,
        pattern: &[Option<u64>],
    ) -> StoreResult<Vec<GroundPredicate>>;

    /// Record a solver output or fixed value for a ground predicate.
    fn set_inferred_value(&self, id: GroundPredicateId, value: f64) -> StoreResult<()>;
}
