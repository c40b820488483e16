use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(test)]
use approx::assert_abs_diff_eq;

// ============================================================================
// Hinge terms
// ============================================================================

/// Orientation of a hinge: `Positive` is `max(0, x − t)`, `Negative` is
/// `max(0, t − x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HingeSign {
    Positive,
    Negative,
}

impl HingeSign {
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            HingeSign::Positive => 1.0,
            HingeSign::Negative => -1.0,
        }
    }

    pub fn mirrored(self) -> Self {
        match self {
            HingeSign::Positive => HingeSign::Negative,
            HingeSign::Negative => HingeSign::Positive,
        }
    }
}

/// One-sided ramp `max(0, sign · (x[predictor] − knot))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HingeTerm {
    predictor: usize,
    knot: f64,
    sign: HingeSign,
}

impl HingeTerm {
    pub fn new(predictor: usize, knot: f64, sign: HingeSign) -> Self {
        Self {
            predictor,
            knot,
            sign,
        }
    }

    pub fn predictor(&self) -> usize {
        self.predictor
    }

    pub fn knot(&self) -> f64 {
        self.knot
    }

    pub fn sign(&self) -> HingeSign {
        self.sign
    }

    #[inline]
    pub fn evaluate_at(&self, value: f64) -> f64 {
        (self.sign.as_f64() * (value - self.knot)).max(0.0)
    }

    #[inline]
    pub fn evaluate(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.evaluate_at(row[self.predictor])
    }

    /// Evaluate the hinge on every row of `x`.
    pub fn evaluate_column(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.column(self.predictor).mapv(|v| self.evaluate_at(v))
    }
}

impl fmt::Display for HingeTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sign {
            HingeSign::Positive => write!(f, "[x{} - {}]_+", self.predictor, self.knot),
            HingeSign::Negative => write!(f, "[-(x{} - {})]_+", self.predictor, self.knot),
        }
    }
}

// ============================================================================
// Basis functions
// ============================================================================

/// Product of zero or more hinge terms; the empty product is the constant 1.
///
/// A basis function is never mutated after construction. Growing the model
/// derives a child through [`BasisFunction::combine`], which copies the
/// parent's hinge list and appends one factor, so evaluation of a depth-`d`
/// function costs `d` hinge evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisFunction {
    hinges: Vec<HingeTerm>,
    /// Sorted predictor indices used anywhere along the ancestry chain.
    used_predictors: Vec<usize>,
    /// Position of the parent within the model at the time of derivation.
    parent: Option<usize>,
    n_predictors: usize,
}

impl BasisFunction {
    pub fn constant(n_predictors: usize) -> Self {
        Self {
            hinges: Vec::new(),
            used_predictors: Vec::new(),
            parent: None,
            n_predictors,
        }
    }

    /// Derive `parent × hinge` without touching `parent`.
    pub fn combine(parent: &BasisFunction, parent_position: usize, hinge: HingeTerm) -> Self {
        debug_assert!(hinge.predictor < parent.n_predictors);
        debug_assert!(
            !parent.uses_predictor(hinge.predictor),
            "predictor {} already split along this ancestry",
            hinge.predictor
        );
        let mut hinges = Vec::with_capacity(parent.hinges.len() + 1);
        hinges.extend_from_slice(&parent.hinges);
        hinges.push(hinge);

        let mut used_predictors = parent.used_predictors.clone();
        if let Err(pos) = used_predictors.binary_search(&hinge.predictor) {
            used_predictors.insert(pos, hinge.predictor);
        }

        Self {
            hinges,
            used_predictors,
            parent: Some(parent_position),
            n_predictors: parent.n_predictors,
        }
    }

    pub fn hinges(&self) -> &[HingeTerm] {
        &self.hinges
    }

    /// Interaction order (number of hinge factors).
    pub fn degree(&self) -> usize {
        self.hinges.len()
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn used_predictors(&self) -> &[usize] {
        &self.used_predictors
    }

    #[inline]
    pub fn uses_predictor(&self, predictor: usize) -> bool {
        self.used_predictors.binary_search(&predictor).is_ok()
    }

    pub fn n_predictors(&self) -> usize {
        self.n_predictors
    }

    pub fn is_constant(&self) -> bool {
        self.hinges.is_empty()
    }

    #[inline]
    pub fn evaluate(&self, row: ArrayView1<'_, f64>) -> f64 {
        debug_assert_eq!(row.len(), self.n_predictors);
        let mut value = 1.0;
        for hinge in &self.hinges {
            value *= hinge.evaluate(row);
            if value == 0.0 {
                break;
            }
        }
        value
    }

    /// Evaluate on every row of `x`, producing one design-matrix column.
    pub fn evaluate_column(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        debug_assert_eq!(x.ncols(), self.n_predictors);
        let mut column = Array1::<f64>::ones(x.nrows());
        for hinge in &self.hinges {
            Zip::from(&mut column)
                .and(x.column(hinge.predictor))
                .for_each(|c, &v| *c *= hinge.evaluate_at(v));
        }
        column
    }
}

impl fmt::Display for BasisFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hinges.is_empty() {
            return f.write_str("1");
        }
        for (i, hinge) in self.hinges.iter().enumerate() {
            if i > 0 {
                f.write_str(" * ")?;
            }
            write!(f, "{hinge}")?;
        }
        Ok(())
    }
}

/// Multiply an already evaluated parent column by a hinge evaluated on `x`.
///
/// This is the column-space counterpart of [`BasisFunction::combine`] and lets
/// the forward pass build candidate columns without re-evaluating the parent.
pub fn extend_column(
    parent_column: ArrayView1<'_, f64>,
    hinge: &HingeTerm,
    x: ArrayView2<'_, f64>,
) -> Array1<f64> {
    let mut column = parent_column.to_owned();
    Zip::from(&mut column)
        .and(x.column(hinge.predictor))
        .for_each(|c, &v| *c *= hinge.evaluate_at(v));
    column
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn hinge_evaluates_one_sided_ramp() {
        let up = HingeTerm::new(0, 1.0, HingeSign::Positive);
        let down = HingeTerm::new(0, 1.0, HingeSign::Negative);
        assert_abs_diff_eq!(up.evaluate_at(3.0), 2.0);
        assert_abs_diff_eq!(up.evaluate_at(0.5), 0.0);
        assert_abs_diff_eq!(down.evaluate_at(0.5), 0.5);
        assert_abs_diff_eq!(down.evaluate_at(1.0), 0.0);
        assert_eq!(down.sign().mirrored(), HingeSign::Positive);
    }

    #[test]
    fn constant_is_one_everywhere() {
        let c = BasisFunction::constant(2);
        assert!(c.is_constant());
        assert_eq!(c.degree(), 0);
        assert_abs_diff_eq!(c.evaluate(array![-4.0, 1e9].view()), 1.0);
        assert_eq!(c.to_string(), "1");
    }

    #[test]
    fn combine_leaves_parent_untouched_and_tracks_ancestry() {
        let root = BasisFunction::constant(3);
        let first = BasisFunction::combine(&root, 0, HingeTerm::new(2, 0.5, HingeSign::Positive));
        let second =
            BasisFunction::combine(&first, 1, HingeTerm::new(0, -1.0, HingeSign::Negative));

        assert!(root.is_constant());
        assert_eq!(first.degree(), 1);
        assert_eq!(first.parent(), Some(0));
        assert_eq!(first.used_predictors(), &[2]);
        assert_eq!(second.degree(), 2);
        assert_eq!(second.parent(), Some(1));
        assert_eq!(second.used_predictors(), &[0, 2]);
        assert!(second.uses_predictor(0));
        assert!(!second.uses_predictor(1));

        // (1.5 - 0.5)_+ * (-1 - (-2))_+ = 1 * 1
        assert_abs_diff_eq!(second.evaluate(array![-2.0, 7.0, 1.5].view()), 1.0);
        assert_abs_diff_eq!(second.evaluate(array![0.0, 7.0, 1.5].view()), 0.0);
        assert_eq!(second.to_string(), "[x2 - 0.5]_+ * [-(x0 - -1)]_+");
    }

    #[test]
    fn column_evaluation_matches_row_evaluation() {
        let x = array![[0.0, 1.0], [1.0, 2.0], [2.0, 0.5], [3.0, 3.0]];
        let root = BasisFunction::constant(2);
        let hinge = HingeTerm::new(0, 1.0, HingeSign::Positive);
        let child = BasisFunction::combine(&root, 0, hinge);
        let grandchild =
            BasisFunction::combine(&child, 1, HingeTerm::new(1, 1.0, HingeSign::Negative));

        let column = grandchild.evaluate_column(x.view());
        for (i, row) in x.rows().into_iter().enumerate() {
            assert_abs_diff_eq!(column[i], grandchild.evaluate(row), epsilon = 1e-14);
        }

        let parent_column = child.evaluate_column(x.view());
        let extended = extend_column(
            parent_column.view(),
            &HingeTerm::new(1, 1.0, HingeSign::Negative),
            x.view(),
        );
        assert_eq!(extended, column);
        assert_eq!(hinge.evaluate_column(x.view()), array![0.0, 0.0, 1.0, 2.0]);
    }
}
