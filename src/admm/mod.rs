//! Consensus ADMM over hinge-loss sub-problems.
//!
//! Every hinge term and every equality constraint is a sub-problem with its
//! own local copy `x_k` of the consensus variables it touches, and a dual
//! `y_k`. One iteration:
//!
//! 1. local step, in parallel: `x_k ← argmin f_k(x) + (ρ/2)‖x − (z_S − y_k/ρ)‖²`
//! 2. consensus step: `z_j ←` clamp to [0, 1] of the mean of `x_{k,j} + y_{k,j}/ρ`
//! 3. dual step: `y_k ← y_k + ρ(x_k − z_S)` for every sub-problem solved
//!
//! The consensus sum runs sequentially in sub-problem order, so a solve is
//! deterministic regardless of the thread count.

pub mod config;
pub mod select;
pub mod state;
pub mod subproblem;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compile::HingeTerm;
use crate::constraint::EqualityConstraint;
use crate::error::{SolverError, SolverResult};
use crate::linalg;

pub use config::{AdmmConfig, ConvergenceConfig, ResidualTolerance, SelectionStrategy};
pub use select::{
    ConsensusFocusedSampling, SelectAll, SelectionContext, SubProblemSelector, UniformSampling,
    selector_for,
};
pub use state::{AdmmState, LocalCopy};
pub use subproblem::{SubProblem, SubProblemKind};

/// Which stopping test ended a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceReason {
    PointChange,
    ObjectiveChange,
    Gradient,
    Residuals,
    /// There were no sub-problems to solve.
    Empty,
}

/// Solver life cycle. Transitions happen only on full sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Initialized,
    Iterating,
    Converged(ConvergenceReason),
    IterationLimitReached,
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverStatus::Initialized => write!(f, "initialized"),
            SolverStatus::Iterating => write!(f, "iterating"),
            SolverStatus::Converged(reason) => write!(f, "converged ({reason:?})"),
            SolverStatus::IterationLimitReached => write!(f, "iteration limit reached"),
        }
    }
}

/// Summary of one call to [`AdmmSolver::solve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub status: SolverStatus,
    /// Iterations run by this call.
    pub iterations: usize,
    pub objective: f64,
    pub primal_residual: f64,
    pub dual_residual: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Residuals {
    primal: f64,
    dual: f64,
    primal_tolerance: f64,
    dual_tolerance: f64,
}

/// The consensus ADMM solver for one compiled program.
#[derive(Debug)]
pub struct AdmmSolver {
    config: AdmmConfig,
    problems: Vec<SubProblem>,
    term_count: usize,
    variable_count: usize,
    /// Number of sub-problems touching each variable.
    copies: Vec<usize>,
    /// Total number of local coordinates.
    local_size: usize,
    pool: Option<rayon::ThreadPool>,
    status: SolverStatus,
}

impl AdmmSolver {
    /// Build sub-problems for `terms` followed by `constraints`.
    pub fn new(
        config: AdmmConfig,
        terms: &[HingeTerm],
        constraints: &[EqualityConstraint],
        variable_count: usize,
    ) -> SolverResult<Self> {
        let rho = config.penalty;
        let mut problems: Vec<SubProblem> = terms
            .iter()
            .map(|term| SubProblem::from_term(term, rho))
            .collect();
        problems.extend(
            constraints
                .iter()
                .map(|c| SubProblem::equality(c.variable, c.value)),
        );

        let mut copies = vec![0usize; variable_count];
        for problem in &problems {
            if problem.coefficients.len() != problem.variables.len() {
                return Err(SolverError::DimensionMismatch {
                    expected: problem.variables.len(),
                    actual: problem.coefficients.len(),
                });
            }
            for &j in &problem.variables {
                match copies.get_mut(j) {
                    Some(count) => *count += 1,
                    None => {
                        return Err(SolverError::DimensionMismatch {
                            expected: variable_count,
                            actual: j + 1,
                        });
                    }
                }
            }
        }
        let local_size = problems.iter().map(SubProblem::len).sum();

        let pool = match config.threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| SolverError::ThreadPool {
                        message: e.to_string(),
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            config,
            problems,
            term_count: terms.len(),
            variable_count,
            copies,
            local_size,
            pool,
            status: SolverStatus::Initialized,
        })
    }

    pub fn config(&self) -> &AdmmConfig {
        &self.config
    }

    pub fn status(&self) -> SolverStatus {
        self.status
    }

    pub fn problems(&self) -> &[SubProblem] {
        &self.problems
    }

    pub fn term_count(&self) -> usize {
        self.term_count
    }

    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    /// Fresh state: every variable at the initial value, locals copied from
    /// it, zero duals.
    pub fn initial_state(&self) -> AdmmState {
        let consensus = vec![self.config.initial_value.clamp(0.0, 1.0); self.variable_count];
        self.state_from_consensus(consensus, 0)
    }

    fn state_from_consensus(&self, consensus: Vec<f64>, iteration: usize) -> AdmmState {
        let locals = self
            .problems
            .iter()
            .map(|p| LocalCopy::from_consensus(&p.variables, &consensus))
            .collect();
        AdmmState {
            consensus,
            locals,
            residuals: vec![0.0; self.problems.len()],
            penalty: self.config.penalty,
            iteration,
            term_count: self.term_count,
        }
    }

    /// Adapt a retained state to this solver's sub-problems.
    ///
    /// The consensus vector is kept and extended for new variables. Term
    /// locals and duals are kept when `terms_unchanged`, otherwise they are
    /// reseeded from the consensus. Constraint locals are kept by position;
    /// new constraints start at `x = z_S`, `y = 0`.
    pub fn warm_state(&self, previous: Option<AdmmState>, terms_unchanged: bool) -> AdmmState {
        let Some(previous) = previous else {
            return self.initial_state();
        };
        let initial = self.config.initial_value.clamp(0.0, 1.0);
        let mut consensus = previous.consensus;
        consensus.resize(self.variable_count, initial);

        if !terms_unchanged || previous.term_count != self.term_count {
            tracing::debug!("term list changed; reseeding local copies");
            return self.state_from_consensus(consensus, previous.iteration);
        }

        let mut old_locals = previous.locals.into_iter();
        let mut old_residuals = previous.residuals.into_iter();
        let mut locals = Vec::with_capacity(self.problems.len());
        let mut residuals = Vec::with_capacity(self.problems.len());
        for problem in &self.problems {
            match (old_locals.next(), old_residuals.next()) {
                (Some(local), residual) if local.x.len() == problem.len() => {
                    locals.push(local);
                    residuals.push(residual.unwrap_or(0.0));
                }
                _ => {
                    locals.push(LocalCopy::from_consensus(&problem.variables, &consensus));
                    residuals.push(0.0);
                }
            }
        }
        AdmmState {
            consensus,
            locals,
            residuals,
            penalty: self.config.penalty,
            iteration: previous.iteration,
            term_count: self.term_count,
        }
    }

    /// Total potential of the term sub-problems at `z`.
    pub fn objective(&self, z: &[f64]) -> f64 {
        self.problems.iter().map(|p| p.potential(z)).sum()
    }

    /// Norm of the objective's gradient at `z`, projected onto the box
    /// [0, 1] and with constrained variables held fixed.
    pub fn projected_gradient_norm(&self, z: &[f64]) -> f64 {
        let mut gradient = vec![0.0; self.variable_count];
        let mut fixed = vec![false; self.variable_count];
        for problem in &self.problems {
            if problem.is_constraint() {
                for &j in &problem.variables {
                    fixed[j] = true;
                }
                continue;
            }
            let h = problem.linear_value(z);
            if h <= 0.0 {
                continue;
            }
            let scale = problem.weight * problem.power * h.powf(problem.power - 1.0);
            for (&j, &a) in problem.variables.iter().zip(&problem.coefficients) {
                gradient[j] += scale * a;
            }
        }
        gradient
            .iter()
            .zip(z)
            .zip(&fixed)
            .map(|((&g, &zj), &is_fixed)| {
                if is_fixed || (zj <= 0.0 && g > 0.0) || (zj >= 1.0 && g < 0.0) {
                    0.0
                } else {
                    g * g
                }
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Run iterations on `state` with the configured selection strategy.
    pub fn solve(&mut self, state: &mut AdmmState) -> SolveOutcome {
        let mut selector = selector_for(&self.config.selection, self.config.seed);
        self.solve_with_selector(state, selector.as_mut())
    }

    /// Run iterations on `state` until a stopping test passes or the
    /// iteration budget is spent.
    pub fn solve_with_selector(
        &mut self,
        state: &mut AdmmState,
        selector: &mut dyn SubProblemSelector,
    ) -> SolveOutcome {
        if self.problems.is_empty() {
            self.status = SolverStatus::Converged(ConvergenceReason::Empty);
            return SolveOutcome {
                status: self.status,
                iterations: 0,
                objective: 0.0,
                primal_residual: 0.0,
                dual_residual: 0.0,
            };
        }

        self.status = SolverStatus::Iterating;
        let checks = self.config.convergence.clone();
        let mut objective = self.objective(&state.consensus);
        let mut residuals = Residuals::default();
        let mut iterations = 0;

        tracing::info!(
            terms = self.term_count,
            constraints = self.problems.len() - self.term_count,
            variables = self.variable_count,
            warm = state.iteration > 0,
            "starting consensus ADMM"
        );

        while iterations < self.config.max_iterations {
            let previous = state.consensus.clone();
            let selected = self.select(state, selector);
            residuals = self.iterate(state, &selected, &previous);
            iterations += 1;
            state.iteration += 1;

            let previous_objective = objective;
            objective = self.objective(&state.consensus);

            if self.config.log_every > 0 && iterations % self.config.log_every == 0 {
                tracing::debug!(
                    iteration = state.iteration,
                    objective,
                    primal = residuals.primal,
                    dual = residuals.dual,
                    "admm progress"
                );
            }

            let reason = if checks
                .point_change
                .is_some_and(|tol| linalg::squared_distance(&state.consensus, &previous).sqrt() <= tol)
            {
                Some(ConvergenceReason::PointChange)
            } else if checks.objective_change.is_some_and(|tol| {
                (objective - previous_objective).abs() <= tol * previous_objective.abs().max(1e-12)
            }) {
                Some(ConvergenceReason::ObjectiveChange)
            } else if checks
                .gradient
                .is_some_and(|tol| self.projected_gradient_norm(&state.consensus) <= tol)
            {
                Some(ConvergenceReason::Gradient)
            } else if checks.residuals.is_some()
                && residuals.primal <= residuals.primal_tolerance
                && residuals.dual <= residuals.dual_tolerance
            {
                Some(ConvergenceReason::Residuals)
            } else {
                None
            };

            if let Some(reason) = reason {
                self.status = SolverStatus::Converged(reason);
                break;
            }
        }

        if self.status == SolverStatus::Iterating {
            self.status = SolverStatus::IterationLimitReached;
        }
        tracing::info!(
            status = %self.status,
            iterations,
            objective,
            primal = residuals.primal,
            dual = residuals.dual,
            "consensus ADMM finished"
        );
        SolveOutcome {
            status: self.status,
            iterations,
            objective,
            primal_residual: residuals.primal,
            dual_residual: residuals.dual,
        }
    }

    /// Sorted sub-problem indices to solve this iteration: the selector's
    /// term choice plus every constraint. A fresh state solves everything.
    fn select(&self, state: &AdmmState, selector: &mut dyn SubProblemSelector) -> Vec<usize> {
        if state.iteration == 0 {
            return (0..self.problems.len()).collect();
        }
        let context = SelectionContext {
            terms: self.term_count,
            residuals: &state.residuals[..self.term_count.min(state.residuals.len())],
            iteration: state.iteration,
        };
        let mut selected = selector.select(&context);
        selected.retain(|&k| k < self.term_count);
        selected.sort_unstable();
        selected.dedup();
        selected.extend(self.term_count..self.problems.len());
        selected
    }

    /// One local, consensus and dual sweep.
    fn iterate(&self, state: &mut AdmmState, selected: &[usize], previous: &[f64]) -> Residuals {
        let rho = state.penalty;
        let damping = self.config.newton_damping;
        let mut mask = vec![false; self.problems.len()];
        for &k in selected {
            mask[k] = true;
        }

        // Local step.
        {
            let AdmmState {
                consensus, locals, ..
            } = &mut *state;
            let z: &[f64] = consensus;
            let problems = &self.problems;
            let mask = &mask;
            self.run(move || {
                locals
                    .par_iter_mut()
                    .enumerate()
                    .filter(|(k, _)| mask[*k])
                    .for_each(|(k, local)| {
                        let problem = &problems[k];
                        let c: Vec<f64> = problem
                            .variables
                            .iter()
                            .zip(&local.y)
                            .map(|(&j, &y)| z[j] - y / rho)
                            .collect();
                        problem.solve(&mut local.x, &c, rho, damping);
                    });
            });
        }

        // Consensus step.
        let mut sums = vec![0.0; self.variable_count];
        for (problem, local) in self.problems.iter().zip(&state.locals) {
            for (i, &j) in problem.variables.iter().enumerate() {
                sums[j] += local.x[i] + local.y[i] / rho;
            }
        }
        for (j, sum) in sums.into_iter().enumerate() {
            if self.copies[j] > 0 {
                state.consensus[j] = (sum / self.copies[j] as f64).clamp(0.0, 1.0);
            }
        }

        // Dual step and residuals.
        let z = &state.consensus;
        let (mut primal, mut x_norm, mut z_norm, mut y_norm) = (0.0, 0.0, 0.0, 0.0);
        for (k, (problem, local)) in self.problems.iter().zip(state.locals.iter_mut()).enumerate() {
            let mut residual = 0.0;
            for (i, &j) in problem.variables.iter().enumerate() {
                let diff = local.x[i] - z[j];
                residual += diff * diff;
                if mask[k] {
                    local.y[i] += rho * diff;
                }
                x_norm += local.x[i] * local.x[i];
                z_norm += z[j] * z[j];
                y_norm += local.y[i] * local.y[i];
            }
            state.residuals[k] = residual;
            primal += residual;
        }
        let dual: f64 = z
            .iter()
            .zip(previous)
            .zip(&self.copies)
            .map(|((a, b), &n)| n as f64 * (a - b) * (a - b))
            .sum();

        let tolerance = self.config.convergence.residuals.unwrap_or_default();
        let scale = (self.local_size as f64).sqrt() * tolerance.absolute;
        Residuals {
            primal: primal.sqrt(),
            dual: rho * dual.sqrt(),
            primal_tolerance: scale + tolerance.relative * x_norm.sqrt().max(z_norm.sqrt()),
            dual_tolerance: scale + tolerance.relative * y_norm.sqrt(),
        }
    }

    fn run<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}
