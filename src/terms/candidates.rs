//! Enumeration of forward-pass split candidates.
//!
//! A candidate is a `(parent, predictor, knot)` triple. It implies the mirrored
//! pair `parent × [x_v − t]_+` and `parent × [−(x_v − t)]_+`. Candidates are
//! produced lazily in a fixed order (parent, then predictor, then knot, all
//! ascending); the forward pass relies on this order to break ties.

use crate::basis::{BasisFunction, HingeSign, HingeTerm, extend_column};
use ndarray::{Array1, ArrayView1, ArrayView2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Position of the parent basis function in the current model.
    pub parent: usize,
    pub predictor: usize,
    pub knot: f64,
}

impl Candidate {
    pub fn hinge(&self, sign: HingeSign) -> HingeTerm {
        HingeTerm::new(self.predictor, self.knot, sign)
    }

    /// The mirrored `(+, −)` pair of basis functions this candidate implies.
    pub fn pair(&self, model: &[BasisFunction]) -> (BasisFunction, BasisFunction) {
        let parent = &model[self.parent];
        (
            BasisFunction::combine(parent, self.parent, self.hinge(HingeSign::Positive)),
            BasisFunction::combine(parent, self.parent, self.hinge(HingeSign::Negative)),
        )
    }

    /// Design-matrix columns of [`Candidate::pair`], derived from the parent's
    /// already evaluated column.
    pub fn pair_columns(
        &self,
        design: ArrayView2<'_, f64>,
        x: ArrayView2<'_, f64>,
    ) -> (Array1<f64>, Array1<f64>) {
        let parent_column = design.column(self.parent);
        (
            extend_column(parent_column, &self.hinge(HingeSign::Positive), x),
            extend_column(parent_column, &self.hinge(HingeSign::Negative), x),
        )
    }
}

/// Distinct values of `values` on the rows where `support` is strictly
/// positive, in ascending order.
pub fn active_knots(values: ArrayView1<'_, f64>, support: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut knots: Vec<f64> = values
        .iter()
        .zip(support.iter())
        .filter(|&(_, &s)| s > 0.0)
        .map(|(&v, _)| v)
        .collect();
    knots.sort_by(f64::total_cmp);
    knots.dedup();
    knots
}

/// Lazy, finite iterator over every legal split of the current model.
///
/// Bounded by `M × P × N` items. A new generator must be built for each
/// forward step since the model it reads has changed.
pub struct CandidateGenerator<'a> {
    model: &'a [BasisFunction],
    design: ArrayView2<'a, f64>,
    x: ArrayView2<'a, f64>,
    parent: usize,
    predictor: usize,
    knots: Vec<f64>,
    knot_pos: usize,
}

impl<'a> CandidateGenerator<'a> {
    /// `design` must hold the evaluated columns of `model` on `x`, in order.
    pub fn new(
        model: &'a [BasisFunction],
        design: ArrayView2<'a, f64>,
        x: ArrayView2<'a, f64>,
    ) -> Self {
        debug_assert_eq!(design.ncols(), model.len());
        debug_assert_eq!(design.nrows(), x.nrows());
        Self {
            model,
            design,
            x,
            parent: 0,
            predictor: 0,
            knots: Vec::new(),
            knot_pos: 0,
        }
    }

    /// Move to the next `(parent, predictor)` pair that is not yet used along
    /// the parent's ancestry and load its knots. Returns `false` once every
    /// parent has been visited.
    fn advance_split(&mut self) -> bool {
        let n_predictors = self.x.ncols();
        while self.parent < self.model.len() {
            while self.predictor < n_predictors {
                let v = self.predictor;
                self.predictor += 1;
                if self.model[self.parent].uses_predictor(v) {
                    continue;
                }
                self.knots = active_knots(self.x.column(v), self.design.column(self.parent));
                self.knot_pos = 0;
                if !self.knots.is_empty() {
                    return true;
                }
            }
            self.parent += 1;
            self.predictor = 0;
        }
        false
    }
}

impl Iterator for CandidateGenerator<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        if self.knot_pos >= self.knots.len() && !self.advance_split() {
            return None;
        }
        let knot = self.knots[self.knot_pos];
        self.knot_pos += 1;
        Some(Candidate {
            parent: self.parent,
            // `advance_split` has already stepped past the predictor in use.
            predictor: self.predictor - 1,
            knot,
        })
    }
}
