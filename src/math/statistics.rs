//! Summary statistics and error metrics over arrays

use ndarray::{ArrayBase, Data, Dimension, Zip};
use num_complex::Complex64;

/// Median of the finite values, `None` when there are none
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        let lower = sorted.get(mid - 1)?;
        let upper = sorted.get(mid)?;
        Some(lower.midpoint(*upper))
    } else {
        sorted.get(mid).copied()
    }
}

/// Mean squared error between two intensity arrays after scaling each to unit maximum
///
/// Returns NaN when either array has no positive maximum or the shapes differ.
pub fn normalized_mse<S, T, D>(measured: &ArrayBase<S, D>, model: &ArrayBase<T, D>) -> f64
where
    S: Data<Elem = f64>,
    T: Data<Elem = f64>,
    D: Dimension,
{
    if measured.shape() != model.shape() || measured.is_empty() {
        return f64::NAN;
    }
    let measured_max = measured.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let model_max = model.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    if measured_max <= 0.0 || model_max <= 0.0 {
        return f64::NAN;
    }

    let sum = Zip::from(measured)
        .and(model)
        .fold(0.0, |acc, &m, &p| {
            let diff = m / measured_max - p / model_max;
            diff.mul_add(diff, acc)
        });
    sum / measured.len() as f64
}

/// Relative squared change `Σ|new − old|² / Σ|old|²` between two complex fields
///
/// Returns NaN when the previous field is zero everywhere or the shapes differ.
pub fn relative_change<S, T, D>(old: &ArrayBase<S, D>, new: &ArrayBase<T, D>) -> f64
where
    S: Data<Elem = Complex64>,
    T: Data<Elem = Complex64>,
    D: Dimension,
{
    if old.shape() != new.shape() {
        return f64::NAN;
    }
    let (difference, reference) = Zip::from(old)
        .and(new)
        .fold((0.0, 0.0), |(diff, norm), o, n| {
            (diff + (n - o).norm_sqr(), norm + o.norm_sqr())
        });
    if reference > 0.0 {
        difference / reference
    } else {
        f64::NAN
    }
}
