//! Rich diagnostic error types for the softlogic engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

use crate::id::{EntityTypeId, GroundPredicateId, PredicateId};

/// Top-level error type for the softlogic engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum SoftLogicError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Fact store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error(
        "inconsistent value for {id}: stored {stored:?}, asserted {asserted:?}"
    )]
    #[diagnostic(
        code(softlogic::store::inconsistent_value),
        help(
            "A ground predicate can only be asserted with one observed value. \
             Remove the duplicate fact or use `Engine::fix_value` to pin a latent \
             predicate for the next solve."
        )
    )]
    InconsistentValue {
        id: GroundPredicateId,
        stored: Option<f64>,
        asserted: Option<f64>,
    },

    #[error("truth value {value} is outside [0, 1]")]
    #[diagnostic(
        code(softlogic::store::invalid_truth_value),
        help("Soft truth values must be finite numbers between 0 and 1 inclusive.")
    )]
    InvalidTruthValue { value: f64 },

    #[error("entity type not found: {id}")]
    #[diagnostic(
        code(softlogic::store::unknown_entity_type),
        help("Register the entity type with `add_entity_type` before referring to it.")
    )]
    UnknownEntityType { id: EntityTypeId },

    #[error("predicate not found: {id}")]
    #[diagnostic(
        code(softlogic::store::unknown_predicate),
        help("Register the predicate with `add_predicate` before referring to it.")
    )]
    UnknownPredicate { id: PredicateId },

    #[error("ground predicate not found: {id}")]
    #[diagnostic(
        code(softlogic::store::unknown_ground_predicate),
        help("The identifier does not name a ground predicate in this store.")
    )]
    UnknownGroundPredicate { id: GroundPredicateId },

    #[error("arity mismatch for {predicate}: expected {expected} arguments, got {actual}")]
    #[diagnostic(
        code(softlogic::store::arity_mismatch),
        help("Pass exactly one argument value per declared argument type.")
    )]
    ArityMismatch {
        predicate: PredicateId,
        expected: usize,
        actual: usize,
    },

    #[error("value {value} is not allowed for entity type {entity_type}")]
    #[diagnostic(
        code(softlogic::store::value_not_allowed),
        help(
            "Every argument must be one of the values declared for its entity type. \
             Add the value to the entity type when it is created."
        )
    )]
    ValueNotAllowed { entity_type: EntityTypeId, value: u64 },

    #[error("name already registered: {name}")]
    #[diagnostic(
        code(softlogic::store::duplicate_name),
        help("Entity type and predicate names must be unique within a store.")
    )]
    DuplicateName { name: String },

    #[error("identifier {id} was issued by a different store")]
    #[diagnostic(
        code(softlogic::store::foreign_id),
        help(
            "Identifiers are stamped with the generation of the store that issued them. \
             Use identifiers returned by this store only."
        )
    )]
    ForeignId { id: String },

    #[error("identifier space exhausted")]
    #[diagnostic(
        code(softlogic::store::exhausted),
        help("A single store can hold at most 2^32 - 2 objects of each kind.")
    )]
    IdSpaceExhausted,
}

// ---------------------------------------------------------------------------
// Rule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule refers to unknown predicate {predicate}")]
    #[diagnostic(
        code(softlogic::rule::unknown_predicate),
        help("Declare every predicate a rule uses before adding the rule.")
    )]
    UnknownPredicate { predicate: PredicateId },

    #[error("atom over {predicate} has {actual} variables, predicate expects {expected}")]
    #[diagnostic(
        code(softlogic::rule::arity_mismatch),
        help("Each atom needs one variable per predicate argument.")
    )]
    ArityMismatch {
        predicate: PredicateId,
        expected: usize,
        actual: usize,
    },

    #[error("variable `{variable}` is used with entity types {first} and {second}")]
    #[diagnostic(
        code(softlogic::rule::variable_type_mismatch),
        help(
            "A variable ranges over exactly one entity type, and that type must \
             match every argument slot the variable occupies."
        )
    )]
    VariableTypeMismatch {
        variable: String,
        first: EntityTypeId,
        second: EntityTypeId,
    },

    #[error("formula is not clausal: {message}")]
    #[diagnostic(
        code(softlogic::rule::not_clausal),
        help(
            "Rules must normalize to a single disjunction of literals. \
             Split conjunctions in the head or disjunctions in the body into separate rules."
        )
    )]
    NotClausal { message: String },

    #[error("rule has no atoms")]
    #[diagnostic(
        code(softlogic::rule::empty),
        help("A rule needs at least one atom in its body or head.")
    )]
    EmptyRule,

    #[error("invalid rule weight {weight} with power {power}")]
    #[diagnostic(
        code(softlogic::rule::invalid_weight),
        help("Weights must be finite and non-negative; powers must be finite and at least 1.")
    )]
    InvalidWeight { weight: f64, power: f64 },
}

// ---------------------------------------------------------------------------
// Solver errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SolverError {
    #[error("matrix is not positive definite (pivot {pivot})")]
    #[diagnostic(
        code(softlogic::solver::not_positive_definite),
        help(
            "The sub-problem system could not be factored. The affected local copy \
             keeps its previous value; check for non-finite weights or coefficients."
        )
    )]
    NotPositiveDefinite { pivot: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(softlogic::solver::dim_mismatch),
        help("Vectors and matrices passed to one operation must agree in size.")
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("failed to build solver thread pool: {message}")]
    #[diagnostic(
        code(softlogic::solver::thread_pool),
        help("Lower `solver.threads` or leave it unset to use the global rayon pool.")
    )]
    ThreadPool { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(softlogic::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("failed to read file: {path}")]
    #[diagnostic(
        code(softlogic::engine::config_read),
        help("Ensure the file exists and is readable.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write file: {path}")]
    #[diagnostic(
        code(softlogic::engine::config_write),
        help("Ensure the parent directory is writable.")
    )]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(softlogic::engine::config_parse),
        help("Check the TOML syntax in the config file. {message}")
    )]
    ConfigParse { path: String, message: String },

    #[error("invalid problem description: {message}")]
    #[diagnostic(
        code(softlogic::engine::problem),
        help(
            "The problem file must be JSON with `entity_types`, `predicates`, `facts` \
             and `rules`, and every name it uses must be declared."
        )
    )]
    ProblemParse { message: String },

    #[error("cannot fix {id} to {value}")]
    #[diagnostic(
        code(softlogic::engine::invalid_fix),
        help("Fixed values must lie in [0, 1] and name a ground predicate in the engine's store.")
    )]
    InvalidFix { id: GroundPredicateId, value: f64 },
}

/// Convenience alias for functions returning softlogic results.
pub type SoftLogicResult<T> = std::result::Result<T, SoftLogicError>;

/// Result alias for rule registration.
pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// Result alias for numeric solver operations.
pub type SolverResult<T> = std::result::Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_softlogic_error() {
        let err = StoreError::InvalidTruthValue { value: 1.5 };
        let top: SoftLogicError = err.into();
        assert!(matches!(
            top,
            SoftLogicError::Store(StoreError::InvalidTruthValue { .. })
        ));
    }

    #[test]
    fn solver_error_converts_to_softlogic_error() {
        let err = SolverError::NotPositiveDefinite { pivot: 2 };
        let top: SoftLogicError = err.into();
        assert!(matches!(
            top,
            SoftLogicError::Solver(SolverError::NotPositiveDefinite { pivot: 2 })
        ));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = SolverError::DimensionMismatch {
            expected: 3,
            actual: 5,
        };
        let msg = format!("{err}");
        assert!(msg.contains('3'));
        assert!(msg.contains('5'));

        let err = RuleError::NotClausal {
            message: "negated disjunction".into(),
        };
        assert!(format!("{err}").contains("negated disjunction"));
    }
}
