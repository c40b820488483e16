//! Model construction, fitting and prediction.
//!
//! `fit` runs the forward pass, the optional backward pass, and a final
//! minimum-norm least-squares solve on the surviving basis. Every call
//! rebuilds the model from scratch.

use crate::basis::BasisFunction;
use crate::linalg::faer_ndarray::FaerLinalgError;
use crate::matrix::{dense_matvec, design_matrix, select_columns};
use crate::solver::backward::backward_pass;
use crate::solver::forward::{ConvergenceReason, ForwardPass, ForwardStep};
use crate::solver::least_squares::solve_min_norm;
use crate::solver::lof::{LackOfFit, LofError};
use crate::types::{Coefficients, Criterion, MarsConfig, coerce_odd};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarsError {
    #[error("Invalid lack-of-fit criterion '{0}'. Must be 'gcv' or 'rss'.")]
    InvalidCriterion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Predictor dimension mismatch: the model was constructed for {expected} predictors but the data has {found}."
    )]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Sample count mismatch: {predictors} predictor rows but {targets} targets.")]
    SampleCountMismatch { predictors: usize, targets: usize },

    #[error("Model has not been fitted yet; call fit() before predict().")]
    NotFitted,

    #[error(
        "Forward pass found no candidate with a finite lack-of-fit at model size {model_size} ({candidates} candidates scored)."
    )]
    NoFiniteCandidate { model_size: usize, candidates: usize },

    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] FaerLinalgError),

    #[error("Lack-of-fit evaluation failed: {0}")]
    Lof(#[from] LofError),
}

/// Anything that maps an `N × P` predictor matrix to `N` predictions.
pub trait Predictor {
    fn n_predictors(&self) -> usize;
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, MarsError>;
}

/// Reshape a 1-D sample into an `N × 1` predictor matrix.
pub fn column_predictors(values: ArrayView1<'_, f64>) -> Array2<f64> {
    values.to_owned().insert_axis(ndarray::Axis(1))
}

/// Record of what a fit did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub forward_steps: Vec<ForwardStep>,
    pub convergence: ConvergenceReason,
    /// Size of the model at the end of the forward pass.
    pub grown_size: usize,
    /// Positions (into the grown model) kept by pruning; `None` when pruning
    /// is disabled.
    pub retained: Option<Vec<usize>>,
    pub pruning_evaluations: usize,
    /// Lack-of-fit of the final basis set under the configured criterion.
    pub lof: f64,
    /// Residual sum of squares of the final fit.
    pub rss: f64,
    /// Numerical rank of the final design matrix.
    pub rank: usize,
}

#[derive(Debug, Clone)]
struct FittedState {
    coefficients: Coefficients,
    summary: FitSummary,
}

/// Multivariate adaptive regression spline model.
#[derive(Debug, Clone)]
pub struct MarsModel {
    config: MarsConfig,
    n_predictors: usize,
    basis: Vec<BasisFunction>,
    fitted: Option<FittedState>,
}

fn validate_data(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    expected_predictors: Option<usize>,
) -> Result<(), MarsError> {
    if x.ncols() == 0 {
        return Err(MarsError::InvalidInput(
            "predictor matrix must have at least one column".to_string(),
        ));
    }
    if let Some(expected) = expected_predictors
        && expected != x.ncols()
    {
        return Err(MarsError::DimensionMismatch {
            expected,
            found: x.ncols(),
        });
    }
    if x.nrows() != y.len() {
        return Err(MarsError::SampleCountMismatch {
            predictors: x.nrows(),
            targets: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(MarsError::InvalidInput(
            "at least one observation is required".to_string(),
        ));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(MarsError::InvalidInput(
            "predictors and targets must be finite".to_string(),
        ));
    }
    Ok(())
}

impl MarsModel {
    /// Construct an unfitted model.
    ///
    /// # Arguments
    /// * `max_basis_count` - Basis budget including the constant; forced to the
    ///   nearest odd value at or above the request.
    /// * `predictors`, `targets` - Training data, used to fix the predictor
    ///   dimensionality and validate shapes.
    /// * `prune` - Run the backward pass after growth.
    /// * `complexity_param` - GCV smoothing parameter `d` (typically 2 to 4).
    /// * `criterion` - `"gcv"` or `"rss"`.
    pub fn new(
        max_basis_count: usize,
        predictors: ArrayView2<'_, f64>,
        targets: ArrayView1<'_, f64>,
        prune: bool,
        complexity_param: f64,
        criterion: &str,
    ) -> Result<Self, MarsError> {
        let criterion: Criterion = criterion
            .parse()
            .map_err(|_| MarsError::InvalidCriterion(criterion.to_string()))?;
        let config = MarsConfig::new(max_basis_count)
            .with_pruning(prune)
            .with_smoothing(complexity_param)
            .with_criterion(criterion);
        Self::with_config(config, predictors, targets)
    }

    pub fn with_config(
        mut config: MarsConfig,
        predictors: ArrayView2<'_, f64>,
        targets: ArrayView1<'_, f64>,
    ) -> Result<Self, MarsError> {
        if !config.smoothing.is_finite() || config.smoothing < 0.0 {
            return Err(MarsError::InvalidInput(format!(
                "smoothing parameter must be finite and non-negative, got {}",
                config.smoothing
            )));
        }
        config.max_basis_count = coerce_odd(config.max_basis_count);
        validate_data(predictors, targets, None)?;
        let n_predictors = predictors.ncols();
        Ok(Self {
            config,
            n_predictors,
            basis: vec![BasisFunction::constant(n_predictors)],
            fitted: None,
        })
    }

    pub fn config(&self) -> &MarsConfig {
        &self.config
    }

    /// Effective (odd) basis budget.
    pub fn max_basis_count(&self) -> usize {
        self.config.max_basis_count
    }

    pub fn basis_functions(&self) -> &[BasisFunction] {
        &self.basis
    }

    pub fn coefficients(&self) -> Option<&Coefficients> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }

    pub fn summary(&self) -> Option<&FitSummary> {
        self.fitted.as_ref().map(|f| &f.summary)
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Grow, optionally prune, and solve for coefficients.
    pub fn fit(
        &mut self,
        predictors: ArrayView2<'_, f64>,
        targets: ArrayView1<'_, f64>,
    ) -> Result<&FitSummary, MarsError> {
        validate_data(predictors, targets, Some(self.n_predictors))?;
        self.fitted = None;
        self.basis = vec![BasisFunction::constant(self.n_predictors)];

        let lof = LackOfFit::new(self.config.criterion, self.config.smoothing);
        let grown = ForwardPass::new(
            predictors.reborrow(),
            targets.reborrow(),
            lof,
            self.config.max_basis_count,
            self.config.parallel,
        )
        .run()?;
        let grown_size = grown.basis.len();
        log::debug!(
            "forward pass finished with {} basis functions ({:?})",
            grown_size,
            grown.reason
        );

        let (basis, design, retained, pruning_evaluations) = if self.config.prune {
            let pruned = backward_pass(
                grown.design.view(),
                targets,
                &lof,
                self.config.parallel,
            )?;
            let design = select_columns(grown.design.view(), &pruned.retained);
            let basis = pruned
                .retained
                .iter()
                .map(|&i| grown.basis[i].clone())
                .collect();
            (basis, design, Some(pruned.retained), pruned.evaluations)
        } else {
            (grown.basis, grown.design, None, 0)
        };

        let solution = solve_min_norm(design.view(), targets)?;
        let final_lof = match self.config.criterion {
            Criterion::Rss => solution.rss,
            Criterion::Gcv => lof.evaluate(design.view(), targets)?,
        };

        self.basis = basis;
        let state = self.fitted.insert(FittedState {
            coefficients: Coefficients::new(solution.coefficients),
            summary: FitSummary {
                forward_steps: grown.steps,
                convergence: grown.reason,
                grown_size,
                retained,
                pruning_evaluations,
                lof: final_lof,
                rss: solution.rss,
                rank: solution.rank,
            },
        });
        Ok(&state.summary)
    }

    /// Evaluate the fitted model on new rows.
    pub fn predict(&self, predictors: ArrayView2<'_, f64>) -> Result<Array1<f64>, MarsError> {
        let fitted = self.fitted.as_ref().ok_or(MarsError::NotFitted)?;
        if predictors.ncols() != self.n_predictors {
            return Err(MarsError::DimensionMismatch {
                expected: self.n_predictors,
                found: predictors.ncols(),
            });
        }
        let design = design_matrix(&self.basis, predictors);
        Ok(dense_matvec(design.view(), fitted.coefficients.view()))
    }
}

impl Predictor for MarsModel {
    fn n_predictors(&self) -> usize {
        self.n_predictors
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, MarsError> {
        MarsModel::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn line_data() -> (Array2<f64>, Array1<f64>) {
        let x = column_predictors(Array1::linspace(0.0, 1.0, 25).view());
        let y = x.column(0).mapv(|v| (v - 0.5_f64).abs());
        (x, y)
    }

    #[test]
    fn construct_validates_criterion_and_coerces_budget() {
        let (x, y) = line_data();
        let model = MarsModel::new(6, x.view(), y.view(), true, 3.0, "RSS").unwrap();
        assert_eq!(model.max_basis_count(), 7);
        assert_eq!(model.config().criterion, Criterion::Rss);
        assert!(!model.is_fitted());
        assert_eq!(model.basis_functions().len(), 1);

        let err = MarsModel::new(5, x.view(), y.view(), true, 3.0, "aic").unwrap_err();
        assert!(matches!(err, MarsError::InvalidCriterion(ref name) if name == "aic"));
    }

    #[test]
    fn construct_rejects_bad_shapes_and_values() {
        let x = Array2::<f64>::zeros((4, 1));
        let y = Array1::<f64>::zeros(3);
        assert!(matches!(
            MarsModel::new(5, x.view(), y.view(), true, 3.0, "gcv"),
            Err(MarsError::SampleCountMismatch {
                predictors: 4,
                targets: 3
            })
        ));
        let y = array![0.0, f64::NAN, 0.0, 0.0];
        assert!(matches!(
            MarsModel::new(5, x.view(), y.view(), true, 3.0, "gcv"),
            Err(MarsError::InvalidInput(_))
        ));
        let y = Array1::<f64>::zeros(4);
        assert!(matches!(
            MarsModel::new(5, x.view(), y.view(), true, -1.0, "gcv"),
            Err(MarsError::InvalidInput(_))
        ));
    }

    #[test]
    fn predict_before_fit_is_not_fitted() {
        let (x, y) = line_data();
        let model = MarsModel::new(5, x.view(), y.view(), true, 3.0, "gcv").unwrap();
        assert!(matches!(model.predict(x.view()), Err(MarsError::NotFitted)));
        assert!(model.coefficients().is_none());
    }

    #[test]
    fn fit_recovers_absolute_value_exactly() {
        let (x, y) = line_data();
        let mut model = MarsModel::new(3, x.view(), y.view(), false, 3.0, "rss").unwrap();
        let summary = model.fit(x.view(), y.view()).unwrap().clone();
        assert_eq!(summary.grown_size, 3);
        assert_eq!(summary.convergence, ConvergenceReason::ReachedMaximum);
        assert!(summary.retained.is_none());
        assert_abs_diff_eq!(summary.rss, 0.0, epsilon = 1e-18);

        let knot = model.basis_functions()[1].hinges()[0].knot();
        assert_abs_diff_eq!(knot, 0.5, epsilon = 1e-12);
        let preds = model.predict(array![[0.0], [0.25], [0.9]].view()).unwrap();
        assert_abs_diff_eq!(preds[0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(preds[1], 0.25, epsilon = 1e-9);
        assert_abs_diff_eq!(preds[2], 0.4, epsilon = 1e-9);
    }

    #[test]
    fn fit_and_predict_check_predictor_dimension() {
        let (x, y) = line_data();
        let mut model = MarsModel::new(3, x.view(), y.view(), true, 3.0, "gcv").unwrap();
        let wide = Array2::<f64>::zeros((25, 2));
        assert!(matches!(
            model.fit(wide.view(), y.view()),
            Err(MarsError::DimensionMismatch {
                expected: 1,
                found: 2
            })
        ));
        model.fit(x.view(), y.view()).unwrap();
        assert!(matches!(
            model.predict(wide.view()),
            Err(MarsError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn refit_discards_previous_state() {
        let (x, y) = line_data();
        let mut model = MarsModel::new(5, x.view(), y.view(), true, 3.0, "rss").unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let first_basis = model.basis_functions().to_vec();
        let first_coef = model.coefficients().cloned();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.basis_functions(), first_basis.as_slice());
        assert_eq!(model.coefficients().cloned(), first_coef);
    }
}
