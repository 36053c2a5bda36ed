//! Equality constraints that pin internal variables to constants.

use serde::{Deserialize, Serialize};

use crate::id::GroundPredicateId;

/// `x[variable] = value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualityConstraint {
    pub variable: usize,
    pub value: f64,
}

/// Constraints in registration order, at most one per variable.
///
/// Replacing a constraint keeps its position, so warm-started locals stay
/// aligned with their sub-problems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    constraints: Vec<EqualityConstraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `variable` to `value`. Returns `true` if the variable was not
    /// constrained before.
    pub fn fix(&mut self, variable: usize, value: f64) -> bool {
        match self.constraints.iter_mut().find(|c| c.variable == variable) {
            Some(existing) => {
                existing.value = value;
                false
            }
            None => {
                self.constraints.push(EqualityConstraint { variable, value });
                true
            }
        }
    }

    /// Fixed value of `variable`, if any.
    pub fn get(&self, variable: usize) -> Option<f64> {
        self.constraints
            .iter()
            .find(|c| c.variable == variable)
            .map(|c| c.value)
    }

    pub fn as_slice(&self) -> &[EqualityConstraint] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
    }
}

/// Result of fixing a ground predicate's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixOutcome {
    /// The ground predicate is internal variable `variable`; the next solve
    /// holds it at the fixed value.
    Constrained { variable: usize },
    /// The ground predicate is not a free variable of the current program.
    NotAVariable { id: GroundPredicateId },
}
