//! Minimum-norm ordinary least squares on hinge design matrices.
//!
//! Hinge columns are frequently collinear (a mirrored pair on the constant's
//! support spans the same line as any other such pair), so the normal
//! equations are solved through the Moore–Penrose pseudo-inverse of the Gram
//! matrix:
//!
//! ```text
//! β = (BᵀB)⁺ Bᵀy
//! ```
//!
//! which is the minimum-norm least-squares solution. Cost is `O(N·M²)` for the
//! Gram product plus `O(M³)` for the eigendecomposition.

use crate::linalg::faer_ndarray::{FaerEigh, FaerLinalgError, fast_ata, fast_atv};
use crate::linalg::utils::squared_distance;
use crate::matrix::dense_matvec;
use faer::Side;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Pseudo-inverse of a symmetric positive semi-definite matrix.
#[derive(Debug, Clone)]
pub struct SymmetricPseudoInverse {
    pub inverse: Array2<f64>,
    /// Number of eigenvalues kept above the truncation threshold.
    pub rank: usize,
}

impl SymmetricPseudoInverse {
    /// `trace(G⁺ G)`, i.e. the trace of the hat matrix `B (BᵀB)⁺ Bᵀ` by the
    /// cyclic trace identity. Equals the numerical rank of `B`.
    pub fn hat_trace(&self) -> f64 {
        self.rank as f64
    }
}

/// Relative eigenvalue cutoff for a Gram matrix built from `n_obs` rows.
#[inline]
fn truncation_threshold(max_eigenvalue: f64, n_obs: usize, n_cols: usize) -> f64 {
    max_eigenvalue * (n_obs.max(n_cols) as f64) * f64::EPSILON
}

/// Moore–Penrose pseudo-inverse of a symmetric PSD matrix via its
/// eigendecomposition. Eigenvalues at or below
/// `λ_max · max(n_obs, p) · ε` are treated as zero.
pub fn pseudo_inverse_symmetric(
    gram: &Array2<f64>,
    n_obs: usize,
) -> Result<SymmetricPseudoInverse, FaerLinalgError> {
    let p = gram.nrows();
    if p == 0 {
        return Ok(SymmetricPseudoInverse {
            inverse: Array2::zeros((0, 0)),
            rank: 0,
        });
    }

    let (values, vectors) = gram.eigh(Side::Lower)?;
    let max_eigenvalue = values.iter().copied().fold(0.0_f64, f64::max);
    let mut inverse = Array2::<f64>::zeros((p, p));
    if max_eigenvalue <= 0.0 {
        return Ok(SymmetricPseudoInverse { inverse, rank: 0 });
    }

    let cutoff = truncation_threshold(max_eigenvalue, n_obs, p);
    let mut rank = 0usize;
    for (k, &lambda) in values.iter().enumerate() {
        if lambda <= cutoff {
            continue;
        }
        rank += 1;
        let inv_lambda = 1.0 / lambda;
        let v = vectors.column(k);
        for i in 0..p {
            let scaled = v[i] * inv_lambda;
            for j in 0..p {
                inverse[[i, j]] += scaled * v[j];
            }
        }
    }

    Ok(SymmetricPseudoInverse { inverse, rank })
}

/// Result of a minimum-norm least-squares solve.
#[derive(Debug, Clone)]
pub struct LeastSquaresFit {
    pub coefficients: Array1<f64>,
    pub fitted: Array1<f64>,
    /// Residual sum of squares `Σ (y − ŷ)²`.
    pub rss: f64,
    /// Numerical rank of the design matrix.
    pub rank: usize,
}

impl LeastSquaresFit {
    pub fn mse(&self) -> f64 {
        if self.fitted.is_empty() {
            0.0
        } else {
            self.rss / self.fitted.len() as f64
        }
    }
}

/// Solve `min ‖y − Bβ‖²` returning the minimum-norm `β`.
///
/// Rank-deficient designs are accepted; the null-space component of `β` is
/// zero.
pub fn solve_min_norm(
    design: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> Result<LeastSquaresFit, FaerLinalgError> {
    let (n, _) = design.dim();
    debug_assert_eq!(n, y.len(), "design rows must match response length");

    let gram = fast_ata(&design);
    let pinv = pseudo_inverse_symmetric(&gram, n)?;
    let rhs = fast_atv(&design, &y);
    let coefficients = pinv.inverse.dot(&rhs);
    let fitted = dense_matvec(design, coefficients.view());
    let rss = squared_distance(y, fitted.view());

    Ok(LeastSquaresFit {
        coefficients,
        fitted,
        rss,
        rank: pinv.rank,
    })
}
