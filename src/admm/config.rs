//! Solver configuration.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// How sub-problems are chosen for the local step of each iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Solve every sub-problem.
    All,
    /// Sample `samples` term sub-problems uniformly without replacement.
    Uniform { samples: usize },
    /// Sample `samples` term sub-problems weighted by their last primal
    /// residual `‖x_k − z_S‖²`.
    ConsensusFocused { samples: usize },
}

/// Absolute and relative tolerances for the primal/dual residual test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualTolerance {
    /// Scaled by the square root of the number of local coordinates.
    pub absolute: f64,
    pub relative: f64,
}

impl Default for ResidualTolerance {
    fn default() -> Self {
        Self {
            absolute: 1e-5,
            relative: 1e-4,
        }
    }
}

/// Optional stopping tests. Every test is off unless set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Stop when `‖z − z_prev‖₂` falls to this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_change: Option<f64>,
    /// Stop when the relative objective change falls to this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_change: Option<f64>,
    /// Stop when the projected gradient norm at `z` falls to this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient: Option<f64>,
    /// Stop when both residuals are below their tolerances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residuals: Option<ResidualTolerance>,
}

/// Configuration for the consensus ADMM solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmmConfig {
    /// Penalty parameter ρ (default: 1.0).
    pub penalty: f64,
    /// Iteration budget per solve (default: 1000).
    pub max_iterations: usize,
    /// Starting consensus value for new variables (default: 0.0).
    pub initial_value: f64,
    /// Sub-problem selection (default: all).
    pub selection: SelectionStrategy,
    /// Seed for sampling selectors (default: 0).
    pub seed: u64,
    /// Worker threads for local solves; `None` uses the global rayon pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    /// Step scale of the general-power Newton step, in (0, 1] (default: 1.0).
    pub newton_damping: f64,
    /// Log progress every this many iterations; 0 disables (default: 100).
    pub log_every: usize,
    pub convergence: ConvergenceConfig,
}

impl Default for AdmmConfig {
    fn default() -> Self {
        Self {
            penalty: 1.0,
            max_iterations: 1000,
            initial_value: 0.0,
            selection: SelectionStrategy::All,
            seed: 0,
            threads: None,
            newton_damping: 1.0,
            log_every: 100,
            convergence: ConvergenceConfig::default(),
        }
    }
}

impl AdmmConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |message: &str| -> Result<(), EngineError> {
            Err(EngineError::InvalidConfig {
                message: message.into(),
            })
        };
        if !(self.penalty.is_finite() && self.penalty > 0.0) {
            return invalid("solver.penalty must be a positive finite number");
        }
        if self.max_iterations == 0 {
            return invalid("solver.max_iterations must be > 0");
        }
        if !(0.0..=1.0).contains(&self.initial_value) {
            return invalid("solver.initial_value must lie in [0, 1]");
        }
        if !(self.newton_damping > 0.0 && self.newton_damping <= 1.0) {
            return invalid("solver.newton_damping must lie in (0, 1]");
        }
        if self.threads == Some(0) {
            return invalid("solver.threads must be > 0 when set");
        }
        match self.selection {
            SelectionStrategy::Uniform { samples } | SelectionStrategy::ConsensusFocused { samples }
                if samples == 0 =>
            {
                return invalid("solver.selection.samples must be > 0");
            }
            _ => {}
        }
        let tolerances = [
            self.convergence.point_change,
            self.convergence.objective_change,
            self.convergence.gradient,
        ];
        if tolerances
            .iter()
            .flatten()
            .any(|t| !(t.is_finite() && *t >= 0.0))
        {
            return invalid("solver.convergence tolerances must be finite and non-negative");
        }
        Ok(())
    }
}
