//! Dense numeric primitives for the solver: dot products, a Cholesky
//! factorization with forward/backward substitution, and the single damped
//! Newton step used by general-power sub-problems.

use crate::error::{SolverError, SolverResult};

/// `a·b`.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `‖a‖²`.
pub fn squared_norm(a: &[f64]) -> f64 {
    dot(a, a)
}

/// `‖a − b‖²`.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// `y ← y + alpha·x`.
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// Row-major `scale·aaᵗ + diagonal·I`.
pub fn penalized_outer_product(a: &[f64], scale: f64, diagonal: f64) -> Vec<f64> {
    let n = a.len();
    let mut m = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            m[i * n + j] = scale * a[i] * a[j];
        }
        m[i * n + i] += diagonal;
    }
    m
}

/// Projection of `c` onto the hyperplane `a·x + b = 0`.
///
/// Returns `c` unchanged when `a` is zero.
pub fn project_onto_hyperplane(c: &[f64], a: &[f64], b: f64) -> Vec<f64> {
    let aa = squared_norm(a);
    if aa == 0.0 {
        return c.to_vec();
    }
    let shift = (dot(a, c) + b) / aa;
    c.iter().zip(a).map(|(ci, ai)| ci - ai * shift).collect()
}

/// Lower-triangular Cholesky factor `L` of a symmetric positive definite
/// matrix `A = L·Lᵗ`.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    n: usize,
    lower: Vec<f64>,
}

impl CholeskyFactor {
    /// Factor a row-major `n × n` matrix.
    pub fn factor(matrix: &[f64], n: usize) -> SolverResult<Self> {
        if matrix.len() != n * n {
            return Err(SolverError::DimensionMismatch {
                expected: n * n,
                actual: matrix.len(),
            });
        }

        let mut l = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                if i == j {
                    for k in 0..j {
                        sum += l[j * n + k] * l[j * n + k];
                    }
                    let diag = matrix[j * n + j] - sum;
                    if diag <= 0.0 || !diag.is_finite() {
                        return Err(SolverError::NotPositiveDefinite { pivot: j });
                    }
                    l[j * n + j] = diag.sqrt();
                } else {
                    for k in 0..j {
                        sum += l[i * n + k] * l[j * n + k];
                    }
                    l[i * n + j] = (matrix[i * n + j] - sum) / l[j * n + j];
                }
            }
        }
        Ok(Self { n, lower: l })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve `A·x = b`.
    pub fn solve(&self, b: &[f64]) -> SolverResult<Vec<f64>> {
        let n = self.n;
        if b.len() != n {
            return Err(SolverError::DimensionMismatch {
                expected: n,
                actual: b.len(),
            });
        }
        let l = &self.lower;

        // Forward substitution: L·y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += l[i * n + j] * y[j];
            }
            y[i] = (b[i] - sum) / l[i * n + i];
        }

        // Backward substitution: Lᵗ·x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += l[j * n + i] * x[j];
            }
            x[i] = (y[i] - sum) / l[i * n + i];
        }
        Ok(x)
    }
}

/// One damped Newton step on `w·(a·x + b)^p + (ρ/2)‖x − c‖²`, starting at `c`.
///
/// At `c` the proximal term has zero gradient, so the gradient is
/// `w·p·h^(p−1)·a` and the Hessian `w·p·(p−1)·h^(p−2)·aaᵗ + ρI`, with
/// `h = a·c + b`, which must be positive.
pub fn newton_step(
    c: &[f64],
    a: &[f64],
    b: f64,
    weight: f64,
    power: f64,
    rho: f64,
    damping: f64,
) -> SolverResult<Vec<f64>> {
    let h = dot(a, c) + b;
    let gradient_scale = weight * power * h.powf(power - 1.0);
    let gradient: Vec<f64> = a.iter().map(|ai| gradient_scale * ai).collect();
    let curvature = weight * power * (power - 1.0) * h.powf(power - 2.0);
    let hessian = penalized_outer_product(a, curvature, rho);
    let step = CholeskyFactor::factor(&hessian, a.len())?.solve(&gradient)?;
    Ok(c.iter().zip(&step).map(|(ci, si)| ci - damping * si).collect())
}
