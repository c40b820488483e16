use crate::basis::BasisFunction;
use crate::estimate::MarsError;
use crate::matrix::{design_matrix, with_pair};
use crate::solver::lof::{LackOfFit, LofError};
use crate::terms::candidates::{Candidate, CandidateGenerator};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Why the forward pass stopped growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceReason {
    /// The model reached the configured (odd) maximum size.
    ReachedMaximum,
    /// No legal split remained before the maximum was reached.
    Exhausted,
    /// Every candidate pair would push the GCV complexity to the sample
    /// count, so no larger model can be scored.
    Saturated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardState {
    Growing,
    Converged(ConvergenceReason),
}

/// One committed growth step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardStep {
    pub parent: usize,
    pub predictor: usize,
    pub knot: f64,
    /// Lack-of-fit of the model after the pair was added.
    pub lof: f64,
    /// Model size after the pair was added.
    pub model_size: usize,
    /// Number of candidates scored in this step.
    pub candidates: usize,
}

#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub basis: Vec<BasisFunction>,
    /// Design matrix of `basis` on the training predictors.
    pub design: Array2<f64>,
    pub steps: Vec<ForwardStep>,
    pub reason: ConvergenceReason,
}

/// Greedy growth controller: starts from the constant and repeatedly commits
/// the best mirrored hinge pair.
pub struct ForwardPass<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    lof: LackOfFit,
    max_basis_count: usize,
    parallel: bool,
    state: ForwardState,
    basis: Vec<BasisFunction>,
    design: Array2<f64>,
    steps: Vec<ForwardStep>,
}

impl<'a> ForwardPass<'a> {
    pub fn new(
        x: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        lof: LackOfFit,
        max_basis_count: usize,
        parallel: bool,
    ) -> Self {
        let basis = vec![BasisFunction::constant(x.ncols())];
        let design = design_matrix(&basis, x);
        Self {
            x,
            y,
            lof,
            max_basis_count,
            parallel,
            state: ForwardState::Growing,
            basis,
            design,
            steps: Vec::new(),
        }
    }

    pub fn state(&self) -> ForwardState {
        self.state
    }

    pub fn basis(&self) -> &[BasisFunction] {
        &self.basis
    }

    pub fn steps(&self) -> &[ForwardStep] {
        &self.steps
    }

    fn score_all(&self, candidates: &[Candidate]) -> Result<Vec<f64>, LofError> {
        let score = |c: &Candidate| -> Result<f64, LofError> {
            let (plus, minus) = c.pair_columns(self.design.view(), self.x);
            let trial = with_pair(self.design.view(), plus.view(), minus.view());
            self.lof.evaluate(trial.view(), self.y)
        };
        if self.parallel {
            candidates.par_iter().map(score).collect()
        } else {
            candidates.iter().map(score).collect()
        }
    }

    /// Advance by one step. Returns the state after the step.
    pub fn step(&mut self) -> Result<ForwardState, MarsError> {
        if let ForwardState::Converged(_) = self.state {
            return Ok(self.state);
        }
        if self.basis.len() + 2 > self.max_basis_count {
            self.state = ForwardState::Converged(ConvergenceReason::ReachedMaximum);
            return Ok(self.state);
        }

        let candidates: Vec<Candidate> =
            CandidateGenerator::new(&self.basis, self.design.view(), self.x.reborrow()).collect();
        if candidates.is_empty() {
            log::info!(
                "forward pass exhausted candidates at {} basis functions",
                self.basis.len()
            );
            self.state = ForwardState::Converged(ConvergenceReason::Exhausted);
            return Ok(self.state);
        }
        log::debug!(
            "scoring {} candidates for model size {}",
            candidates.len(),
            self.basis.len() + 2
        );

        let scores = self.score_all(&candidates)?;
        // Strict comparison keeps the first-enumerated candidate on ties.
        let mut best: Option<(usize, f64)> = None;
        for (i, &score) in scores.iter().enumerate() {
            if !score.is_finite() {
                continue;
            }
            if best.is_none_or(|(_, b)| score < b) {
                best = Some((i, score));
            }
        }
        let Some((best_idx, best_lof)) = best else {
            if scores.iter().all(|&s| s == f64::INFINITY) {
                log::info!(
                    "forward pass saturated at {} basis functions: all {} candidates exceed the GCV complexity limit",
                    self.basis.len(),
                    candidates.len()
                );
                self.state = ForwardState::Converged(ConvergenceReason::Saturated);
                return Ok(self.state);
            }
            log::warn!(
                "none of {} candidates produced a finite lack-of-fit at model size {}",
                candidates.len(),
                self.basis.len()
            );
            return Err(MarsError::NoFiniteCandidate {
                model_size: self.basis.len(),
                candidates: candidates.len(),
            });
        };

        let chosen = candidates[best_idx];
        let (plus, minus) = chosen.pair(&self.basis);
        let (plus_col, minus_col) = chosen.pair_columns(self.design.view(), self.x);
        self.design = with_pair(self.design.view(), plus_col.view(), minus_col.view());

        log::info!("added B[{}] = {}", self.basis.len(), plus);
        log::info!("added B[{}] = {}", self.basis.len() + 1, minus);
        self.basis.push(plus);
        self.basis.push(minus);

        self.steps.push(ForwardStep {
            parent: chosen.parent,
            predictor: chosen.predictor,
            knot: chosen.knot,
            lof: best_lof,
            model_size: self.basis.len(),
            candidates: candidates.len(),
        });
        Ok(self.state)
    }

    /// Grow until converged.
    pub fn run(mut self) -> Result<ForwardResult, MarsError> {
        loop {
            if let ForwardState::Converged(reason) = self.step()? {
                return Ok(ForwardResult {
                    basis: self.basis,
                    design: self.design,
                    steps: self.steps,
                    reason,
                });
            }
        }
    }
}
