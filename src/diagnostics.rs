//! Goodness-of-fit metrics for fitted models.
//!
//! ## Key concepts
//!
//! * **R²**: `1 − RSS / TSS`; `1` for a perfect fit, and `1` or `0` when the
//!   targets have no variance depending on whether the fit is exact.
//! * **Adjusted R²**: `1 − (1 − R²)(N − 1)/(N − P − 1)`; undefined when
//!   `N ≤ P + 1`.
//! * **Absolute errors**: RMSE, MAE and median absolute error of the residuals.
//! * **Sample weights**: optional; they weight R², RMSE and MAE (including the
//!   target mean inside R²) but not the median absolute error.
//!
//! Everything here is pure; no model state is mutated.

use crate::estimate::{MarsError, Predictor};
use crate::linalg::utils::{KahanSum, mean, median, squared_distance};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Relative tolerance below which the total sum of squares counts as zero.
const DEGENERATE_TSS: f64 = 1e-12;

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    /// `None` when there are too few observations for the adjustment.
    pub adj_r2: Option<f64>,
    pub rmse: f64,
    pub mae: f64,
    /// Median absolute error.
    pub medae: f64,
}

/// Weighted residual and target sums; unit weights when none are given.
struct ResidualSums {
    weight: f64,
    rss: f64,
    tss: f64,
    abs: f64,
    sum_y_sq: f64,
}

fn validate_weights(weights: ArrayView1<'_, f64>, n: usize) -> Result<(), MarsError> {
    if weights.len() != n {
        return Err(MarsError::InvalidInput(format!(
            "expected {n} sample weights, got {}",
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(MarsError::InvalidInput(
            "sample weights must be finite and non-negative".to_string(),
        ));
    }
    if weights.iter().all(|&w| w == 0.0) {
        return Err(MarsError::InvalidInput(
            "sample weights must not all be zero".to_string(),
        ));
    }
    Ok(())
}

fn residual_sums(
    y: ArrayView1<'_, f64>,
    y_hat: ArrayView1<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    y_mean: f64,
) -> ResidualSums {
    let Some(w) = weights else {
        return ResidualSums {
            weight: y.len() as f64,
            rss: squared_distance(y, y_hat),
            tss: y.iter().map(|v| (v - y_mean).powi(2)).sum(),
            abs: y.iter().zip(y_hat.iter()).map(|(a, b)| (a - b).abs()).sum(),
            sum_y_sq: y.iter().map(|v| v * v).sum(),
        };
    };

    let mut weight = KahanSum::default();
    let mut rss = KahanSum::default();
    let mut tss = KahanSum::default();
    let mut abs = KahanSum::default();
    let mut sum_y_sq = KahanSum::default();
    for ((&yi, &fi), &wi) in y.iter().zip(y_hat.iter()).zip(w.iter()) {
        let r = yi - fi;
        weight.add(wi);
        rss.add(wi * r * r);
        tss.add(wi * (yi - y_mean).powi(2));
        abs.add(wi * r.abs());
        sum_y_sq.add(wi * yi * yi);
    }
    ResidualSums {
        weight: weight.sum(),
        rss: rss.sum(),
        tss: tss.sum(),
        abs: abs.sum(),
        sum_y_sq: sum_y_sq.sum(),
    }
}

fn weighted_mean(y: ArrayView1<'_, f64>, weights: Option<ArrayView1<'_, f64>>) -> Option<f64> {
    let Some(w) = weights else {
        return mean(y);
    };
    let mut num = KahanSum::default();
    let mut den = KahanSum::default();
    for (&yi, &wi) in y.iter().zip(w.iter()) {
        num.add(wi * yi);
        den.add(wi);
    }
    (den.sum() > 0.0).then(|| num.sum() / den.sum())
}

impl RegressionMetrics {
    /// Compare observed `y` against predictions `y_hat` from a model on
    /// `n_predictors` inputs.
    ///
    /// With `weights`, R², RMSE and MAE are weighted by them; the median
    /// absolute error always treats every row equally.
    pub fn from_predictions(
        y: ArrayView1<'_, f64>,
        y_hat: ArrayView1<'_, f64>,
        weights: Option<ArrayView1<'_, f64>>,
        n_predictors: usize,
    ) -> Result<Self, MarsError> {
        let n = y.len();
        if y_hat.len() != n {
            return Err(MarsError::InvalidInput(format!(
                "{} predictions for {n} observations",
                y_hat.len()
            )));
        }
        if let Some(w) = weights {
            validate_weights(w, n)?;
        }
        let Some(y_mean) = weighted_mean(y, weights) else {
            return Err(MarsError::InvalidInput(
                "metrics need at least one observation".to_string(),
            ));
        };

        let sums = residual_sums(y, y_hat, weights, y_mean);
        let r2 = if sums.tss > DEGENERATE_TSS * sums.sum_y_sq {
            1.0 - sums.rss / sums.tss
        } else if sums.rss <= DEGENERATE_TSS * sums.sum_y_sq {
            1.0
        } else {
            0.0
        };

        let adj_r2 = (n > n_predictors + 1).then(|| {
            let n = n as f64;
            1.0 - (1.0 - r2) * (n - 1.0) / (n - n_predictors as f64 - 1.0)
        });

        let abs_errors: Vec<f64> = y
            .iter()
            .zip(y_hat.iter())
            .map(|(a, b)| (a - b).abs())
            .collect();
        let medae = median(&abs_errors).unwrap_or(0.0);

        Ok(Self {
            r2,
            adj_r2,
            rmse: (sums.rss / sums.weight).sqrt(),
            mae: sums.abs / sums.weight,
            medae,
        })
    }
}

/// Predict `x` with `model` and score the predictions against `y`,
/// optionally weighting each row.
pub fn regression_metrics<M: Predictor + ?Sized>(
    model: &M,
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
) -> Result<RegressionMetrics, MarsError> {
    let y_hat = model.predict(x)?;
    RegressionMetrics::from_predictions(y, y_hat.view(), weights, model.n_predictors())
}

// ============================================================================
// Report
// ============================================================================

impl Display for RegressionMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "R²: {:.3}", self.r2)?;
        match self.adj_r2 {
            Some(adj) => write!(f, "\nAdj R²: {adj:.3}")?,
            None => write!(f, "\nAdj R²: n/a")?,
        }
        write!(f, "\nRMSE: {:.3}\nMAE: {:.3}", self.rmse, self.mae)
    }
}
