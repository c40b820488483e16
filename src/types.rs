use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use thiserror::Error;

/// Lack-of-fit criterion used to rank candidate basis sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Residual sum of squares.
    Rss,
    /// Generalized cross-validation with the MARS complexity penalty.
    Gcv,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Rss => "rss",
            Criterion::Gcv => "gcv",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a criterion name is neither `rss` nor `gcv`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown criterion '{0}'; expected 'rss' or 'gcv'")]
pub struct UnknownCriterion(pub String);

impl FromStr for Criterion {
    type Err = UnknownCriterion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" => Ok(Criterion::Rss),
            "gcv" => Ok(Criterion::Gcv),
            _ => Err(UnknownCriterion(s.to_string())),
        }
    }
}

pub fn default_prune() -> bool {
    true
}

pub fn default_smoothing() -> f64 {
    3.0
}

pub fn default_criterion() -> Criterion {
    Criterion::Gcv
}

pub fn default_parallel() -> bool {
    true
}

/// Coerce a requested basis budget to the odd cap used by the forward pass.
///
/// Functions are added in mirrored pairs on top of the constant, so the
/// committed model size is always odd.
#[inline]
pub fn coerce_odd(requested: usize) -> usize {
    requested | 1
}

/// Search configuration for a MARS fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarsConfig {
    /// Maximum number of basis functions, constant included. Always odd.
    pub max_basis_count: usize,
    /// Run the backward (pruning) pass after growth.
    #[serde(default = "default_prune")]
    pub prune: bool,
    /// GCV smoothing parameter `d`; larger values favour smaller models.
    /// Typical range is 2 to 4.
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    #[serde(default = "default_criterion")]
    pub criterion: Criterion,
    /// Score forward candidates and backward removals on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl MarsConfig {
    pub fn new(max_basis_count: usize) -> Self {
        Self {
            max_basis_count: coerce_odd(max_basis_count),
            prune: default_prune(),
            smoothing: default_smoothing(),
            criterion: default_criterion(),
            parallel: default_parallel(),
        }
    }

    pub fn with_pruning(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coefficients(pub Array1<f64>);

impl Coefficients {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl Deref for Coefficients {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Array1<f64>> for Coefficients {
    fn as_ref(&self) -> &Array1<f64> {
        &self.0
    }
}

impl From<Array1<f64>> for Coefficients {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl From<Coefficients> for Array1<f64> {
    fn from(values: Coefficients) -> Self {
        values.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_parses_case_insensitively() {
        assert_eq!("rss".parse::<Criterion>(), Ok(Criterion::Rss));
        assert_eq!(" GCV ".parse::<Criterion>(), Ok(Criterion::Gcv));
        let err = "aic".parse::<Criterion>().unwrap_err();
        assert_eq!(err, UnknownCriterion("aic".to_string()));
        assert_eq!(
            err.to_string(),
            "unknown criterion 'aic'; expected 'rss' or 'gcv'"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn basis_budget_is_forced_odd() {
        assert_eq!(coerce_odd(0), 1);
        assert_eq!(coerce_odd(1), 1);
        assert_eq!(coerce_odd(6), 7);
        assert_eq!(coerce_odd(21), 21);
        assert_eq!(MarsConfig::new(10).max_basis_count, 11);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: MarsConfig =
            serde_json::from_str(r#"{"max_basis_count": 9}"#).expect("config should parse");
        assert_eq!(cfg, MarsConfig::new(9));
        assert!(cfg.prune);
        assert_eq!(cfg.criterion, Criterion::Gcv);
        assert_eq!(cfg.smoothing, 3.0);

        let json = serde_json::to_string(&cfg.clone().with_criterion(Criterion::Rss))
            .expect("config should serialize");
        assert!(json.contains(r#""criterion":"rss""#));
    }
}
