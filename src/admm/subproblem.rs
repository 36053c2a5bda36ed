//! Local sub-problems and their closed-form solutions.
//!
//! Each sub-problem minimizes its potential plus the proximal term
//! `(ρ/2)‖x − c‖²` with `c = z_S − y/ρ`. The solution method is fixed once,
//! when the sub-problem is built, by the term's power and size.

use std::sync::Arc;

use crate::compile::HingeTerm;
use crate::linalg::{self, CholeskyFactor};

/// Solution method of a sub-problem.
#[derive(Debug, Clone, PartialEq)]
pub enum SubProblemKind {
    /// `p = 1`.
    Linear,
    /// `p = 2`, one variable.
    SquaredSingle,
    /// `p = 2`, two variables, solved by 2×2 elimination.
    SquaredPair,
    /// `p = 2`, three or more variables, with the cached factor of
    /// `2w·aaᵗ + ρI`. `None` when the factorization failed.
    SquaredCholesky(Option<Arc<CholeskyFactor>>),
    /// Any other power: one damped Newton step.
    General,
    /// Equality constraint `x = value`.
    Equality(f64),
}

/// A hinge-loss term or equality constraint over a slice of the consensus
/// vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SubProblem {
    pub variables: Vec<usize>,
    pub coefficients: Vec<f64>,
    pub constant: f64,
    pub weight: f64,
    pub power: f64,
    pub kind: SubProblemKind,
}

impl SubProblem {
    /// Build the sub-problem of a hinge term for penalty `rho`.
    pub fn from_term(term: &HingeTerm, rho: f64) -> Self {
        let kind = if term.power == 1.0 {
            SubProblemKind::Linear
        } else if term.power == 2.0 {
            match term.len() {
                1 => SubProblemKind::SquaredSingle,
                2 => SubProblemKind::SquaredPair,
                n => {
                    let matrix =
                        linalg::penalized_outer_product(&term.coefficients, 2.0 * term.weight, rho);
                    match CholeskyFactor::factor(&matrix, n) {
                        Ok(factor) => SubProblemKind::SquaredCholesky(Some(Arc::new(factor))),
                        Err(err) => {
                            tracing::warn!(
                                rule = term.rule,
                                error = %err,
                                "sub-problem factorization failed; local copy will stay fixed"
                            );
                            SubProblemKind::SquaredCholesky(None)
                        }
                    }
                }
            }
        } else {
            SubProblemKind::General
        };
        Self {
            variables: term.variables.clone(),
            coefficients: term.coefficients.clone(),
            constant: term.constant,
            weight: term.weight,
            power: term.power,
            kind,
        }
    }

    /// Equality constraint fixing `variable` to `value`.
    pub fn equality(variable: usize, value: f64) -> Self {
        Self {
            variables: vec![variable],
            coefficients: vec![0.0],
            constant: 0.0,
            weight: 0.0,
            power: 1.0,
            kind: SubProblemKind::Equality(value),
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self.kind, SubProblemKind::Equality(_))
    }

    /// Potential at the consensus vector `z`. Constraints contribute nothing.
    pub fn potential(&self, z: &[f64]) -> f64 {
        if self.is_constraint() {
            return 0.0;
        }
        let h = self.linear_value(z).max(0.0);
        self.weight * h.powf(self.power)
    }

    /// `a·z_S + b`.
    pub fn linear_value(&self, z: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(&self.coefficients)
            .map(|(&j, &a)| a * z[j])
            .sum::<f64>()
            + self.constant
    }

    /// Minimize `potential(x) + (ρ/2)‖x − c‖²`, writing the minimizer into
    /// `x`. On a numeric failure `x` keeps its previous value.
    pub fn solve(&self, x: &mut [f64], c: &[f64], rho: f64, damping: f64) {
        if let SubProblemKind::Equality(value) = self.kind {
            x.fill(value);
            return;
        }

        let a = &self.coefficients;
        let b = self.constant;
        let w = self.weight;

        // Inactive hinge: the proximal point is optimal.
        if linalg::dot(a, c) + b <= 0.0 {
            x.copy_from_slice(c);
            return;
        }

        match &self.kind {
            SubProblemKind::Linear => {
                for ((xi, ci), ai) in x.iter_mut().zip(c).zip(a) {
                    *xi = ci - (w / rho) * ai;
                }
            }
            SubProblemKind::SquaredSingle => {
                x[0] = (rho * c[0] - 2.0 * w * b * a[0]) / (2.0 * w * a[0] * a[0] + rho);
            }
            SubProblemKind::SquaredPair => {
                let a00 = 2.0 * w * a[0] * a[0] + rho;
                let a11 = 2.0 * w * a[1] * a[1] + rho;
                let m = 2.0 * w * a[0] * a[1];
                let r0 = rho * c[0] - 2.0 * w * b * a[0];
                let r1 = rho * c[1] - 2.0 * w * b * a[1];
                x[1] = (r1 - m * r0 / a00) / (a11 - m * m / a00);
                x[0] = (r0 - m * x[1]) / a00;
            }
            SubProblemKind::SquaredCholesky(Some(factor)) => {
                let rhs: Vec<f64> = c
                    .iter()
                    .zip(a)
                    .map(|(ci, ai)| rho * ci - 2.0 * w * b * ai)
                    .collect();
                match factor.solve(&rhs) {
                    Ok(solution) => x.copy_from_slice(&solution),
                    Err(err) => {
                        tracing::warn!(error = %err, "cholesky solve failed; keeping previous point");
                        return;
                    }
                }
            }
            SubProblemKind::SquaredCholesky(None) => return,
            SubProblemKind::General => {
                match linalg::newton_step(c, a, b, w, self.power, rho, damping) {
                    Ok(solution) => x.copy_from_slice(&solution),
                    Err(err) => {
                        tracing::warn!(error = %err, "newton step failed; keeping previous point");
                        return;
                    }
                }
            }
            SubProblemKind::Equality(_) => {}
        }

        // Overshoot past the hinge: the minimizer lies on a·x + b = 0.
        if linalg::dot(a, x) + b < 0.0 {
            let projected = linalg::project_onto_hyperplane(c, a, b);
            x.copy_from_slice(&projected);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn term(coefficients: Vec<f64>, constant: f64, weight: f64, power: f64) -> HingeTerm {
        HingeTerm {
            rule: 0,
            variables: (0..coefficients.len()).collect(),
            coefficients,
            constant,
            power,
            weight,
        }
    }

    fn objective(t: &HingeTerm, x: &[f64], c: &[f64], rho: f64) -> f64 {
        t.potential(x) + 0.5 * rho * linalg::squared_distance(x, c)
    }

    /// Ternary search over one coordinate of a convex function.
    fn ternary(mut lo: f64, mut hi: f64, f: impl Fn(f64) -> f64) -> f64 {
        for _ in 0..200 {
            let m1 = lo + (hi - lo) / 3.0;
            let m2 = hi - (hi - lo) / 3.0;
            if f(m1) < f(m2) {
                hi = m2;
            } else {
                lo = m1;
            }
        }
        0.5 * (lo + hi)
    }

    fn brute_force(t: &HingeTerm, c: &[f64], rho: f64) -> Vec<f64> {
        let bound = 20.0;
        match c.len() {
            1 => vec![ternary(-bound, bound, |v| objective(t, &[v], c, rho))],
            2 => {
                let inner = |u: f64| ternary(-bound, bound, |v| objective(t, &[u, v], c, rho));
                let u = ternary(-bound, bound, |u| objective(t, &[u, inner(u)], c, rho));
                vec![u, inner(u)]
            }
            _ => unreachable!(),
        }
    }

    fn check_against_brute_force(power: f64, size: usize) {
        let mut rng = StdRng::seed_from_u64(42 + size as u64);
        let rho = 1.0;
        for _ in 0..25 {
            let coefficients: Vec<f64> = (0..size).map(|_| rng.gen_range(-1.5..1.5)).collect();
            let t = term(
                coefficients,
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.1..3.0),
                power,
            );
            let c: Vec<f64> = (0..size).map(|_| rng.gen_range(-1.0..2.0)).collect();
            let sub = SubProblem::from_term(&t, rho);
            let mut x = vec![0.0; size];
            sub.solve(&mut x, &c, rho, 1.0);

            let expected = brute_force(&t, &c, rho);
            let got = objective(&t, &x, &c, rho);
            let best = objective(&t, &expected, &c, rho);
            assert!(
                got <= best + 1e-6,
                "power {power}, size {size}: closed form {x:?} ({got}) vs brute force {expected:?} ({best})"
            );
            for (xi, ei) in x.iter().zip(&expected) {
                assert!((xi - ei).abs() < 1e-4, "{x:?} vs {expected:?}");
            }
        }
    }

    #[test]
    fn kind_is_chosen_by_power_and_size() {
        assert_eq!(SubProblem::from_term(&term(vec![1.0], 0.0, 1.0, 1.0), 1.0).kind, SubProblemKind::Linear);
        assert_eq!(
            SubProblem::from_term(&term(vec![1.0], 0.0, 1.0, 2.0), 1.0).kind,
            SubProblemKind::SquaredSingle
        );
        assert_eq!(
            SubProblem::from_term(&term(vec![1.0, 1.0], 0.0, 1.0, 2.0), 1.0).kind,
            SubProblemKind::SquaredPair
        );
        assert!(matches!(
            SubProblem::from_term(&term(vec![1.0, 1.0, 1.0], 0.0, 1.0, 2.0), 1.0).kind,
            SubProblemKind::SquaredCholesky(Some(_))
        ));
        assert_eq!(
            SubProblem::from_term(&term(vec![1.0], 0.0, 1.0, 3.0), 1.0).kind,
            SubProblemKind::General
        );
    }

    #[test]
    fn linear_single_matches_brute_force() {
        check_against_brute_force(1.0, 1);
    }

    #[test]
    fn linear_pair_matches_brute_force() {
        check_against_brute_force(1.0, 2);
    }

    #[test]
    fn squared_single_matches_brute_force() {
        check_against_brute_force(2.0, 1);
    }

    #[test]
    fn squared_pair_matches_brute_force() {
        check_against_brute_force(2.0, 2);
    }

    #[test]
    fn squared_cholesky_satisfies_stationarity() {
        let t = term(vec![1.0, -0.5, 0.75, 2.0], 0.3, 1.5, 2.0);
        let rho = 1.0;
        let c = [0.4, 0.1, 0.9, 0.2];
        let sub = SubProblem::from_term(&t, rho);
        let mut x = vec![0.0; 4];
        sub.solve(&mut x, &c, rho, 1.0);
        // Active hinge: 2w·h·a + ρ(x − c) = 0.
        let h = linalg::dot(&t.coefficients, &x) + t.constant;
        assert!(h > 0.0);
        for i in 0..4 {
            let g = 2.0 * t.weight * h * t.coefficients[i] + rho * (x[i] - c[i]);
            assert!(g.abs() < 1e-10, "coordinate {i}: {g}");
        }
    }

    #[test]
    fn inactive_hinge_returns_proximal_point() {
        let sub = SubProblem::from_term(&term(vec![1.0, 1.0], -3.0, 2.0, 1.0), 1.0);
        let mut x = vec![9.0, 9.0];
        sub.solve(&mut x, &[0.5, 0.5], 1.0, 1.0);
        assert_eq!(x, vec![0.5, 0.5]);
    }

    #[test]
    fn linear_overshoot_is_projected() {
        // c − (w/ρ)a crosses the hinge; the minimizer sits on a·x + b = 0.
        let sub = SubProblem::from_term(&term(vec![-1.0], 1.0, 5.0, 1.0), 1.0);
        let mut x = vec![0.0];
        sub.solve(&mut x, &[0.0], 1.0, 1.0);
        assert!((x[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn general_power_one_step_agrees_with_linear() {
        let t = term(vec![0.5, -1.0], 0.4, 0.2, 1.0);
        let mut general = SubProblem::from_term(&t, 1.0);
        general.kind = SubProblemKind::General;
        let linear = SubProblem::from_term(&t, 1.0);
        let c = [0.6, 0.1];
        let (mut x1, mut x2) = (vec![0.0; 2], vec![0.0; 2]);
        general.solve(&mut x1, &c, 1.0, 1.0);
        linear.solve(&mut x2, &c, 1.0, 1.0);
        for (a, b) in x1.iter().zip(&x2) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn general_power_decreases_objective() {
        let t = term(vec![1.0, 0.5], 0.2, 1.0, 3.0);
        let sub = SubProblem::from_term(&t, 1.0);
        let c = [0.7, 0.4];
        let mut x = c.to_vec();
        sub.solve(&mut x, &c, 1.0, 1.0);
        assert!(objective(&t, &x, &c, 1.0) < objective(&t, &c, &c, 1.0));
    }

    #[test]
    fn failed_factorization_keeps_previous_point() {
        let mut sub = SubProblem::from_term(&term(vec![1.0, 1.0, 1.0], 0.5, 1.0, 2.0), 1.0);
        sub.kind = SubProblemKind::SquaredCholesky(None);
        let mut x = vec![0.25, 0.5, 0.75];
        sub.solve(&mut x, &[1.0, 1.0, 1.0], 1.0, 1.0);
        assert_eq!(x, vec![0.25, 0.5, 0.75]);
    }

    #[test]
    fn equality_sets_value() {
        let sub = SubProblem::equality(3, 0.4);
        let mut x = vec![0.9];
        sub.solve(&mut x, &[0.1], 1.0, 1.0);
        assert_eq!(x, vec![0.4]);
        assert!(sub.is_constraint());
        assert_eq!(sub.potential(&[0.0, 0.0, 0.0, 1.0]), 0.0);
    }
}
