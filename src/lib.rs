#![deny(dead_code)]
#![deny(unused_imports)]

pub mod basis;
pub mod diagnostics;
pub mod estimate;
pub mod linalg;
pub mod matrix;
pub mod solver;
pub mod terms;
pub mod types;

pub use basis::{BasisFunction, HingeSign, HingeTerm};
pub use diagnostics::{RegressionMetrics, regression_metrics};
pub use estimate::{FitSummary, MarsError, MarsModel, Predictor, column_predictors};
pub use solver::forward::{ConvergenceReason, ForwardStep};
pub use types::{Coefficients, Criterion, MarsConfig};
