//! Accuracy metrics for in-sample and backtest evaluation.

use crate::error::{ForecastError, Result};
use crate::utils::stats::{mean, pearson};
use serde::{Deserialize, Serialize};

/// Accuracy metrics for a fit against actuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Squared correlation between fit and actual.
    #[serde(deserialize_with = "crate::utils::serde_nan::null_as_nan")]
    pub r_squared: f64,
}

/// Calculate accuracy metrics between actual and predicted values.
pub fn calculate_metrics(actual: &[f64], predicted: &[f64]) -> Result<AccuracyMetrics> {
    if actual.is_empty() || predicted.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if actual.len() != predicted.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: actual.len(),
            got: predicted.len(),
        });
    }

    let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();
    let mae = mean(&errors.iter().map(|e| e.abs()).collect::<Vec<_>>());
    let rmse = mean(&errors.iter().map(|e| e * e).collect::<Vec<_>>()).sqrt();

    Ok(AccuracyMetrics {
        mae,
        rmse,
        r_squared: squared_correlation(actual, predicted),
    })
}

/// Squared Pearson correlation between fit and actual.
///
/// `NaN` with fewer than 3 pairs. When either side has no spread the
/// correlation is undefined; the score is then 1 for an exact match and 0
/// otherwise, so it always lies in `[0, 1]`.
pub fn squared_correlation(actual: &[f64], fitted: &[f64]) -> f64 {
    let n = actual.len().min(fitted.len());
    if n < 3 {
        return f64::NAN;
    }
    let r = pearson(&actual[..n], &fitted[..n]);
    if r.is_finite() {
        return (r * r).clamp(0.0, 1.0);
    }

    let scale = actual[..n].iter().fold(1.0_f64, |m, a| m.max(a.abs()));
    let exact = actual[..n]
        .iter()
        .zip(&fitted[..n])
        .all(|(a, f)| (a - f).abs() <= 1e-9 * scale);
    if exact {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn metrics_known_values() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let predicted = [1.5, 2.5, 2.5, 4.5];
        let m = calculate_metrics(&actual, &predicted).unwrap();
        assert_relative_eq!(m.mae, 0.5, epsilon = 1e-12);
        assert_relative_eq!(m.rmse, 0.5, epsilon = 1e-12);
        assert!(m.r_squared > 0.7 && m.r_squared <= 1.0);
    }

    #[test]
    fn score_needs_three_points() {
        assert!(squared_correlation(&[1.0, 2.0], &[1.0, 2.0]).is_nan());
    }

    #[test]
    fn flat_actual_scores_exact_match_as_one() {
        let actual = [100.0; 6];
        assert_eq!(squared_correlation(&actual, &[100.0; 6]), 1.0);
        assert_eq!(
            squared_correlation(&actual, &[99.0, 100.0, 101.0, 100.0, 100.0, 100.0]),
            0.0
        );
    }

    #[test]
    fn mismatch_is_an_error() {
        assert!(calculate_metrics(&[1.0, 2.0], &[1.0]).is_err());
        assert!(calculate_metrics(&[], &[]).is_err());
    }
}
