//! Lack-of-fit scoring for candidate basis sets.
//!
//! Every forward candidate and every backward removal is scored here, so the
//! evaluator dominates running time: one call costs `O(N·M²)` (Gram product)
//! plus `O(M³)` (eigendecomposition), and a pass costs that times the number of
//! candidates it scores.
//!
//! GCV uses the MARS complexity
//!
//! ```text
//! C(M) = trace(B (BᵀB)⁺ Bᵀ) + 1 + d·(M − 1)
//! ```
//!
//! where `B` holds only the non-constant columns while `M` counts the constant
//! as well.

use crate::linalg::faer_ndarray::{FaerLinalgError, fast_ata};
use crate::solver::least_squares::{pseudo_inverse_symmetric, solve_min_norm};
use crate::types::Criterion;
use ndarray::{ArrayView1, ArrayView2, s};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LofError {
    #[error("Least-squares solve failed while scoring a basis set: {0}")]
    Solve(#[from] FaerLinalgError),

    #[error("Design matrix has {rows} rows but the response has {len} entries")]
    RowMismatch { rows: usize, len: usize },

    #[error("Design matrix must contain at least the constant column")]
    EmptyDesign,
}

/// Configured lack-of-fit criterion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LackOfFit {
    criterion: Criterion,
    smoothing: f64,
}

impl LackOfFit {
    pub fn new(criterion: Criterion, smoothing: f64) -> Self {
        Self {
            criterion,
            smoothing,
        }
    }

    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// Score the basis set whose `N × M` design matrix is `design`. Column 0
    /// must be the constant function.
    ///
    /// Returns `f64::INFINITY` for a GCV score whose complexity has reached the
    /// sample count (`C(M) ≥ N`), where the denominator vanishes or changes
    /// sign; such sets can never be committed by the forward pass.
    pub fn evaluate(
        &self,
        design: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<f64, LofError> {
        let (rows, cols) = design.dim();
        if rows != y.len() {
            return Err(LofError::RowMismatch { rows, len: y.len() });
        }
        if cols == 0 {
            return Err(LofError::EmptyDesign);
        }

        let fit = solve_min_norm(design, y)?;
        match self.criterion {
            Criterion::Rss => Ok(fit.rss),
            Criterion::Gcv => {
                let n = rows as f64;
                let complexity = self.complexity(design)?;
                if complexity >= n {
                    log::debug!(
                        "GCV saturated: complexity {:.3} >= {} samples with {} basis functions",
                        complexity,
                        rows,
                        cols
                    );
                    return Ok(f64::INFINITY);
                }
                let denom = 1.0 - complexity / n;
                Ok(fit.mse() / (denom * denom))
            }
        }
    }

    /// Effective complexity `C(M)` of the basis set behind `design`.
    pub fn complexity(&self, design: ArrayView2<'_, f64>) -> Result<f64, LofError> {
        let (rows, cols) = design.dim();
        if cols == 0 {
            return Err(LofError::EmptyDesign);
        }
        let non_constant = design.slice(s![.., 1..]);
        let hat_trace = if non_constant.ncols() == 0 {
            0.0
        } else {
            let gram = fast_ata(&non_constant);
            pseudo_inverse_symmetric(&gram, rows)?.hat_trace()
        };
        Ok(hat_trace + 1.0 + self.smoothing * (cols as f64 - 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn hinge_design(xs: &[f64], knots: &[f64]) -> Array2<f64> {
        Array2::from_shape_fn((xs.len(), 1 + 2 * knots.len()), |(i, j)| {
            if j == 0 {
                return 1.0;
            }
            let t = knots[(j - 1) / 2];
            if j % 2 == 1 {
                (xs[i] - t).max(0.0)
            } else {
                (t - xs[i]).max(0.0)
            }
        })
    }

    #[test]
    fn rss_is_residual_sum_of_squares() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 / 19.0).collect();
        let y = Array1::from_iter(xs.iter().map(|x| (x - 0.5).abs()));
        let design = hinge_design(&xs, &[0.5]);
        let lof = LackOfFit::new(Criterion::Rss, 3.0);
        // |x − 0.5| lies in the span of the hinge pair.
        assert_abs_diff_eq!(
            lof.evaluate(design.view(), y.view()).unwrap(),
            0.0,
            epsilon = 1e-20
        );

        let constant_only = design.slice(s![.., ..1]);
        let mean = y.mean().unwrap();
        let expected: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
        assert_abs_diff_eq!(
            lof.evaluate(constant_only, y.view()).unwrap(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn complexity_excludes_constant_from_trace_but_not_from_count() {
        let xs: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let lof = LackOfFit::new(Criterion::Gcv, 3.0);

        // Two distinct mirrored pairs: four independent non-constant columns.
        let design = hinge_design(&xs, &[10.0, 20.0]);
        let c = lof.complexity(design.view()).unwrap();
        assert_abs_diff_eq!(c, 4.0 + 1.0 + 3.0 * 4.0, epsilon = 1e-9);

        // The same pair twice: four columns of rank 2, still counted as M = 5.
        let repeated = hinge_design(&xs, &[10.0, 10.0]);
        let c = lof.complexity(repeated.view()).unwrap();
        assert_abs_diff_eq!(c, 2.0 + 1.0 + 3.0 * 4.0, epsilon = 1e-9);

        let constant_only = repeated.slice(s![.., ..1]);
        assert_abs_diff_eq!(lof.complexity(constant_only).unwrap(), 1.0);
    }

    #[test]
    fn gcv_matches_closed_form_and_penalizes_larger_d() {
        let xs: Vec<f64> = (0..40).map(|i| i as f64 / 39.0).collect();
        let y = Array1::from_iter(xs.iter().map(|x| (6.0 * x).sin()));
        let design = hinge_design(&xs, &[0.3]);

        let rss = LackOfFit::new(Criterion::Rss, 3.0)
            .evaluate(design.view(), y.view())
            .unwrap();
        let gcv3 = LackOfFit::new(Criterion::Gcv, 3.0);
        let c = gcv3.complexity(design.view()).unwrap();
        let expected = (rss / 40.0) / (1.0 - c / 40.0).powi(2);
        assert_abs_diff_eq!(
            gcv3.evaluate(design.view(), y.view()).unwrap(),
            expected,
            epsilon = 1e-12
        );

        let gcv2 = LackOfFit::new(Criterion::Gcv, 2.0)
            .evaluate(design.view(), y.view())
            .unwrap();
        let gcv4 = LackOfFit::new(Criterion::Gcv, 4.0)
            .evaluate(design.view(), y.view())
            .unwrap();
        assert!(gcv2 < gcv4);
    }

    #[test]
    fn saturated_gcv_is_infinite() {
        // Five samples, two hinge pairs at d = 3 gives C(M) well above N.
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = Array1::from(vec![0.0, 1.0, 0.0, 1.0, 0.0]);
        let design = hinge_design(&xs, &[1.0, 3.0]);
        let score = LackOfFit::new(Criterion::Gcv, 3.0)
            .evaluate(design.view(), y.view())
            .unwrap();
        assert!(score.is_infinite());
    }

    #[test]
    fn rejects_mismatched_rows() {
        let design = Array2::<f64>::ones((3, 1));
        let y = Array1::<f64>::zeros(4);
        let err = LackOfFit::new(Criterion::Rss, 3.0)
            .evaluate(design.view(), y.view())
            .unwrap_err();
        assert!(matches!(err, LofError::RowMismatch { rows: 3, len: 4 }));
    }
}
