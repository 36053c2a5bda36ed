//! Sub-problem selection for the local step.

use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::index;

use super::config::SelectionStrategy;

/// What a selector sees when choosing term sub-problems.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    /// Number of term sub-problems; valid indices are `0..terms`.
    pub terms: usize,
    /// Last primal residual `‖x_k − z_S‖²` of each term.
    pub residuals: &'a [f64],
    /// Iterations completed so far on this state.
    pub iteration: usize,
}

/// Chooses which term sub-problems to solve in an iteration.
///
/// Constraint sub-problems are always solved and are not offered to the
/// selector. Indices outside `0..terms` are ignored, and duplicates are
/// removed.
pub trait SubProblemSelector {
    fn select(&mut self, context: &SelectionContext<'_>) -> Vec<usize>;
}

/// Solve every sub-problem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAll;

impl SubProblemSelector for SelectAll {
    fn select(&mut self, context: &SelectionContext<'_>) -> Vec<usize> {
        (0..context.terms).collect()
    }
}

/// Uniform sampling without replacement.
#[derive(Debug, Clone)]
pub struct UniformSampling {
    samples: usize,
    rng: StdRng,
}

impl UniformSampling {
    pub fn new(samples: usize, seed: u64) -> Self {
        Self {
            samples,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SubProblemSelector for UniformSampling {
    fn select(&mut self, context: &SelectionContext<'_>) -> Vec<usize> {
        let amount = self.samples.min(context.terms);
        let mut picked = index::sample(&mut self.rng, context.terms, amount).into_vec();
        picked.sort_unstable();
        picked
    }
}

/// Sampling weighted by each term's last primal residual, so terms that
/// disagree most with the consensus are revisited first. Falls back to
/// uniform sampling once every residual is zero.
#[derive(Debug, Clone)]
pub struct ConsensusFocusedSampling {
    samples: usize,
    rng: StdRng,
}

impl ConsensusFocusedSampling {
    pub fn new(samples: usize, seed: u64) -> Self {
        Self {
            samples,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SubProblemSelector for ConsensusFocusedSampling {
    fn select(&mut self, context: &SelectionContext<'_>) -> Vec<usize> {
        let weights = &context.residuals[..context.terms.min(context.residuals.len())];
        let mut picked: Vec<usize> = match WeightedIndex::new(weights) {
            Ok(distribution) => (0..self.samples)
                .map(|_| distribution.sample(&mut self.rng))
                .collect(),
            Err(_) => {
                let amount = self.samples.min(context.terms);
                index::sample(&mut self.rng, context.terms, amount).into_vec()
            }
        };
        picked.sort_unstable();
        picked.dedup();
        picked
    }
}

/// Build the selector for a configured strategy.
pub fn selector_for(strategy: &SelectionStrategy, seed: u64) -> Box<dyn SubProblemSelector> {
    match *strategy {
        SelectionStrategy::All => Box::new(SelectAll),
        SelectionStrategy::Uniform { samples } => Box::new(UniformSampling::new(samples, seed)),
        SelectionStrategy::ConsensusFocused { samples } => {
            Box::new(ConsensusFocusedSampling::new(samples, seed))
        }
    }
}
