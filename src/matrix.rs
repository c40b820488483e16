use crate::basis::BasisFunction;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Below this many cells, column evaluation stays on the calling thread.
const PARALLEL_DESIGN_MIN_CELLS: usize = 1 << 14;

/// Build the `N × M` design matrix whose column `j` is `basis[j]` evaluated on
/// every row of `x`.
pub fn design_matrix(basis: &[BasisFunction], x: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = x.nrows();
    let mut design = Array2::<f64>::zeros((n, basis.len()));
    if n == 0 || basis.is_empty() {
        return design;
    }

    if n.saturating_mul(basis.len()) >= PARALLEL_DESIGN_MIN_CELLS {
        design
            .axis_iter_mut(Axis(1))
            .into_par_iter()
            .zip(basis.par_iter())
            .for_each(|(mut column, bf)| column.assign(&bf.evaluate_column(x)));
    } else {
        for (mut column, bf) in design.axis_iter_mut(Axis(1)).zip(basis.iter()) {
            column.assign(&bf.evaluate_column(x));
        }
    }
    design
}

/// Gather the listed columns of `design` into a new matrix, in the given order.
pub fn select_columns(design: ArrayView2<'_, f64>, columns: &[usize]) -> Array2<f64> {
    design.select(Axis(1), columns)
}

/// Append two columns to `design`; used for the mirrored hinge pair of a
/// forward candidate.
pub fn with_pair(
    design: ArrayView2<'_, f64>,
    first: ArrayView1<'_, f64>,
    second: ArrayView1<'_, f64>,
) -> Array2<f64> {
    let (n, m) = design.dim();
    debug_assert_eq!(first.len(), n);
    debug_assert_eq!(second.len(), n);
    let mut out = Array2::<f64>::zeros((n, m + 2));
    out.slice_mut(ndarray::s![.., ..m]).assign(&design);
    out.column_mut(m).assign(&first);
    out.column_mut(m + 1).assign(&second);
    out
}

#[inline]
pub fn dense_matvec(matrix: ArrayView2<'_, f64>, vector: ArrayView1<'_, f64>) -> Array1<f64> {
    let nrows = matrix.nrows();
    let ncols = matrix.ncols();
    debug_assert_eq!(ncols, vector.len());
    let mut out = Array1::<f64>::zeros(nrows);

    if ncols == 0 || nrows == 0 {
        return out;
    }

    if matrix.is_standard_layout()
        && let (Some(ms), Some(vs), Some(os)) = (
            matrix.as_slice_memory_order(),
            vector.as_slice(),
            out.as_slice_mut(),
        )
    {
        for (i, row) in ms.chunks_exact(ncols).enumerate() {
            let mut acc = 0.0_f64;
            for j in 0..ncols {
                acc += row[j] * vs[j];
            }
            os[i] = acc;
        }
        return out;
    }

    for i in 0..nrows {
        let mut acc = 0.0_f64;
        for j in 0..ncols {
            acc += matrix[[i, j]] * vector[j];
        }
        out[i] = acc;
    }
    out
}
