use ndarray::ArrayView1;

/// Compensated summation; residual sums over a few hundred rows are compared
/// against each other during the search, so rounding drift matters.
#[derive(Default, Clone, Copy)]
pub(crate) struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub(crate) fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn sum(self) -> f64 {
        self.sum
    }
}

/// Σ (a_i − b_i)², accumulated with Kahan compensation.
pub(crate) fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = KahanSum::default();
    for (&x, &y) in a.iter().zip(b.iter()) {
        let r = x - y;
        acc.add(r * r);
    }
    acc.sum()
}

/// Compensated mean; `None` for an empty input.
pub(crate) fn mean(values: ArrayView1<'_, f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut acc = KahanSum::default();
    for &v in values {
        acc.add(v);
    }
    Some(acc.sum() / values.len() as f64)
}

/// Median of a finite sample; `None` for an empty input.
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}
