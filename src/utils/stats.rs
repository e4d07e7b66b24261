//! Statistical utility functions.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Calculate the mean of a slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (n denominator), matching `numpy.std`.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Pearson correlation of two equally long slices.
///
/// Returns `NaN` when fewer than two pairs exist or either side has zero
/// variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if is_degenerate(sxx, mx, n) || is_degenerate(syy, my, n) {
        return f64::NAN;
    }
    let denom = (sxx * syy).sqrt();
    if !denom.is_finite() {
        return f64::NAN;
    }
    (sxy / denom).clamp(-1.0, 1.0)
}

/// Sum of squared deviations indistinguishable from rounding noise.
fn is_degenerate(sum_sq: f64, center: f64, n: usize) -> bool {
    let ulp = 16.0 * f64::EPSILON * center.abs().max(1.0);
    sum_sq <= ulp * ulp * n as f64
}

/// Two-sided p-value for a Pearson correlation `r` over `n` pairs.
///
/// Uses the Student-t statistic `r * sqrt((n - 2) / (1 - r^2))`.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if !r.is_finite() || n < 3 {
        return f64::NAN;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Empirical quantile with linear interpolation between order statistics.
///
/// `sorted` must already be ascending. This is the default method of
/// `numpy.quantile`, so quantiles taken at increasing `q` are non-decreasing.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    let value = sorted[lo] + frac * (sorted[hi] - sorted[lo]);
    // Guard against rounding pushing the interpolant outside its bracket.
    value.clamp(sorted[lo], sorted[hi])
}

/// Differences `x[t] - x[t - lag]` over a NaN-tolerant slice, skipping pairs
/// with a missing side.
pub fn lagged_differences(values: &[f64], lag: usize) -> Vec<f64> {
    if lag == 0 || values.len() <= lag {
        return Vec::new();
    }
    (lag..values.len())
        .map(|t| values[t] - values[t - lag])
        .filter(|d| d.is_finite())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_and_population_std() {
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3.0, epsilon = 1e-12);
        assert!(mean(&[]).is_nan());
        assert_relative_eq!(population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn pearson_perfect_and_inverse() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        let z = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert_relative_eq!(pearson(&x, &y), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pearson(&x, &z), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn pearson_constant_side_is_nan() {
        assert!(pearson(&[1.0, 2.0, 3.0], &[7.0, 7.0, 7.0]).is_nan());
        assert!(pearson(&[1.0], &[1.0]).is_nan());
    }

    #[test]
    fn p_value_shrinks_with_stronger_correlation() {
        let weak = correlation_p_value(0.1, 30);
        let strong = correlation_p_value(0.8, 30);
        assert!(strong < weak);
        assert!(strong < 0.001);
        assert!(weak > 0.5);
    }

    #[test]
    fn quantile_interpolates_like_numpy() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile_sorted(&sorted, 0.5), 2.5, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&sorted, 0.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&sorted, 1.0), 4.0, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&sorted, 0.1), 1.3, epsilon = 1e-12);
    }

    #[test]
    fn lagged_differences_skip_missing() {
        let values = [1.0, 2.0, f64::NAN, 5.0, 6.0];
        assert_eq!(lagged_differences(&values, 1), vec![1.0, 1.0]);
        assert!(lagged_differences(&values, 12).is_empty());
    }
}
