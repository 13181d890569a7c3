//! NaN-aware summary statistics.
//!
//! Excluded epochs are carried as NaN and dropped here, never zero-filled.
//! An aggregate over zero finite values is NaN, not an error.

/// Mean of the non-NaN values in `xs`; NaN when there are none.
pub fn nanmean<I: IntoIterator<Item = f64>>(xs: I) -> f64 {
    let (sum, n) = xs
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (`n - 1` denominator).
///
/// NaN for an empty slice, `0.0` for a single value.
pub fn std(xs: &[f64]) -> f64 {
    match xs.len() {
        0 => f64::NAN,
        1 => 0.0,
        n => {
            let m = mean(xs);
            let var = xs.iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        }
    }
}

/// Root mean square; NaN for an empty slice.
pub fn rms(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    (xs.iter().map(|v| v * v).sum::<f64>() / xs.len() as f64).sqrt()
}
