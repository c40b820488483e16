//! Nested backward pruning.
//!
//! Starting from the full grown model, each size level removes one function at
//! a time from the best subset retained at the previous level (`K*`) and keeps
//! a running best across all levels (`J*`). `J*` starts as the full model, so
//! the result never scores worse than it. Comparisons use `≤`, so among equal
//! scores the later-evaluated subset is retained. The constant (position 0) is
//! never removed. The search costs `O(M²)` evaluator calls and does not claim a
//! globally optimal subset.

use crate::estimate::MarsError;
use crate::matrix::select_columns;
use crate::solver::lof::{LackOfFit, LofError};
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct PruneResult {
    /// Ascending positions (into the grown model) of the retained functions.
    pub retained: Vec<usize>,
    /// Lack-of-fit of the retained subset.
    pub lof: f64,
    /// Number of subsets scored, the full model included.
    pub evaluations: usize,
}

fn without(set: &[usize], position: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(set.len().saturating_sub(1));
    out.extend_from_slice(&set[..position]);
    out.extend_from_slice(&set[position + 1..]);
    out
}

/// Prune the model whose full design matrix is `design` (column 0 constant).
pub fn backward_pass(
    design: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    lof: &LackOfFit,
    parallel: bool,
) -> Result<PruneResult, MarsError> {
    let m_max = design.ncols();
    let full: Vec<usize> = (0..m_max).collect();

    let mut best_overall = full.clone(); // J*
    let mut best_at_level = full; // K*
    let mut best_overall_lof = lof.evaluate(design, y)?;
    let mut evaluations = 1usize;

    let score = |subset: &Vec<usize>| -> Result<f64, LofError> {
        let reduced = select_columns(design, subset);
        lof.evaluate(reduced.view(), y)
    };

    for size in (2..=m_max).rev() {
        let level = best_at_level.clone(); // L
        debug_assert_eq!(level.len(), size);

        let removals: Vec<Vec<usize>> = (1..level.len()).map(|i| without(&level, i)).collect();
        let scores: Vec<f64> = if parallel {
            removals.par_iter().map(score).collect::<Result<_, _>>()?
        } else {
            removals.iter().map(score).collect::<Result<_, _>>()?
        };
        evaluations += removals.len();

        let mut best_level_lof = f64::INFINITY;
        for (subset, score) in removals.into_iter().zip(scores) {
            if score <= best_level_lof {
                best_level_lof = score;
                best_at_level = subset.clone();
            }
            if score <= best_overall_lof {
                best_overall_lof = score;
                best_overall = subset;
            }
        }
        log::debug!(
            "pruning level {}: best removal scores {:.6e}",
            size - 1,
            best_level_lof
        );
    }

    log::info!(
        "pruned model from {} to {} basis functions (lof {:.6e})",
        m_max,
        best_overall.len(),
        best_overall_lof
    );

    Ok(PruneResult {
        retained: best_overall,
        lof: best_overall_lof,
        evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Criterion;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    #[test]
    fn removal_sets_keep_the_constant() {
        assert_eq!(without(&[0, 2, 5, 7], 1), vec![0, 5, 7]);
        assert_eq!(without(&[0, 2, 5, 7], 3), vec![0, 2, 5]);
    }

    fn noisy_hinge_design(n: usize) -> (Array2<f64>, Array1<f64>) {
        // Column 1 carries the signal; column 2 is unrelated to it.
        let design = Array2::from_shape_fn((n, 3), |(i, j)| {
            let x = i as f64 / (n - 1) as f64;
            match j {
                0 => 1.0,
                1 => (x - 0.3_f64).max(0.0),
                _ => ((i * 7919) % 13) as f64,
            }
        });
        let y = Array1::from_shape_fn(n, |i| {
            2.0 * design[[i, 1]] + 1.0 + 0.01 * (i as f64 * 1.7).sin()
        });
        (design, y)
    }

    #[test]
    fn drops_an_irrelevant_column_under_gcv() {
        let (design, y) = noisy_hinge_design(50);
        let lof = LackOfFit::new(Criterion::Gcv, 3.0);
        let full_lof = lof.evaluate(design.view(), y.view()).unwrap();
        let result = backward_pass(design.view(), y.view(), &lof, false).unwrap();
        assert_eq!(result.retained, vec![0, 1]);
        assert!(result.lof < full_lof);
        // Full model, two removals at level 3, one at level 2.
        assert_eq!(result.evaluations, 4);
    }

    #[test]
    fn keeps_the_full_model_when_every_column_matters() {
        let n = 25;
        let design = Array2::from_shape_fn((n, 3), |(i, j)| {
            let x = i as f64 / (n - 1) as f64;
            match j {
                0 => 1.0,
                1 => (x - 0.5_f64).max(0.0),
                _ => (0.5_f64 - x).max(0.0),
            }
        });
        let y = Array1::from_shape_fn(n, |i| design[[i, 1]] + design[[i, 2]]);
        for criterion in [Criterion::Rss, Criterion::Gcv] {
            let lof = LackOfFit::new(criterion, 3.0);
            let full_lof = lof.evaluate(design.view(), y.view()).unwrap();
            let result = backward_pass(design.view(), y.view(), &lof, true).unwrap();
            assert_eq!(result.retained, vec![0, 1, 2], "{criterion}");
            assert!(result.lof <= full_lof, "{criterion}");
        }
    }

    #[test]
    fn parallel_and_serial_pruning_agree() {
        let n = 60;
        let knots = [0.2, 0.5, 0.8];
        let design = Array2::from_shape_fn((n, 7), |(i, j)| {
            let x = i as f64 / (n - 1) as f64;
            if j == 0 {
                return 1.0;
            }
            let t = knots[(j - 1) / 2];
            if j % 2 == 1 {
                (x - t).max(0.0)
            } else {
                (t - x).max(0.0)
            }
        });
        let y = Array1::from_shape_fn(n, |i| (i as f64 * 0.3).sin());
        let lof = LackOfFit::new(Criterion::Gcv, 3.0);
        let serial = backward_pass(design.view(), y.view(), &lof, false).unwrap();
        let parallel = backward_pass(design.view(), y.view(), &lof, true).unwrap();
        assert_eq!(serial, parallel);
        assert_eq!(serial.retained[0], 0);
        assert!(serial.retained.len() < 7);
        assert_eq!(serial.evaluations, 1 + 6 + 5 + 4 + 3 + 2 + 1);
    }

    #[test]
    fn constant_only_model_is_returned_unchanged() {
        let design = Array2::<f64>::ones((5, 1));
        let y = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let lof = LackOfFit::new(Criterion::Rss, 3.0);
        let result = backward_pass(design.view(), y.view(), &lof, true).unwrap();
        assert_eq!(result.retained, vec![0]);
        assert_eq!(result.evaluations, 1);
        assert_abs_diff_eq!(result.lof, 10.0, epsilon = 1e-10);
    }
}
