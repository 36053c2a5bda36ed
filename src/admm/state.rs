//! Retained solver state for warm starts.

use serde::{Deserialize, Serialize};

/// Local copy `x_k` and dual `y_k` of one sub-problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCopy {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl LocalCopy {
    /// Local copy seeded from the consensus values of `variables`, zero dual.
    pub fn from_consensus(variables: &[usize], consensus: &[f64]) -> Self {
        Self {
            x: variables.iter().map(|&j| consensus[j]).collect(),
            y: vec![0.0; variables.len()],
        }
    }
}

/// Full ADMM state: consensus vector, per-sub-problem locals, penalty and
/// iteration counter. Locals of term sub-problems come first, then those of
/// constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmmState {
    pub consensus: Vec<f64>,
    pub locals: Vec<LocalCopy>,
    /// Last primal residual `‖x_k − z_S‖²` of each sub-problem.
    pub residuals: Vec<f64>,
    pub penalty: f64,
    /// Iterations completed on this state, across solves.
    pub iteration: usize,
    /// Number of term sub-problems the locals were built for.
    pub term_count: usize,
}

impl AdmmState {
    /// Consensus value of internal variable `index`.
    pub fn value(&self, index: usize) -> Option<f64> {
        self.consensus.get(index).copied()
    }
}
