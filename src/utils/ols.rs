//! Ordinary and weighted least squares utilities.
//!
//! Used by the stacker (blend of base-learner fits), the structural model
//! (regression on lagged exogenous columns) and the ridge path of the linear
//! learner.

use crate::error::{ForecastError, Result};

/// Least squares coefficients and intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct OLSResult {
    /// Regression coefficients (one per column).
    pub coefficients: Vec<f64>,
    /// Intercept term.
    pub intercept: f64,
}

impl OLSResult {
    /// Predict a single observation.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row.iter())
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    /// Predict every row of a design matrix.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }

    /// Get the number of regressors.
    pub fn num_regressors(&self) -> usize {
        self.coefficients.len()
    }
}

/// Fit `y = intercept + rows @ coefficients`, optionally with observation
/// weights.
///
/// Columns are centered on their weighted means before the normal equations
/// are solved, so the intercept is recovered exactly and constant columns
/// receive a zero coefficient instead of making the system singular.
pub fn weighted_ols(y: &[f64], rows: &[Vec<f64>], weights: Option<&[f64]>) -> Result<OLSResult> {
    let n = y.len();
    if n == 0 {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    if rows.len() != n {
        return Err(ForecastError::DimensionMismatch {
            expected: n,
            got: rows.len(),
        });
    }
    if let Some(w) = weights {
        if w.len() != n {
            return Err(ForecastError::DimensionMismatch {
                expected: n,
                got: w.len(),
            });
        }
        if w.iter().any(|&wi| !(wi.is_finite() && wi >= 0.0)) {
            return Err(ForecastError::InvalidParameter(
                "weights must be finite and non-negative".into(),
            ));
        }
    }

    let k = rows.first().map(|r| r.len()).unwrap_or(0);
    for row in rows {
        if row.len() != k {
            return Err(ForecastError::DimensionMismatch {
                expected: k,
                got: row.len(),
            });
        }
    }

    let weight = |i: usize| weights.map(|w| w[i]).unwrap_or(1.0);
    let w_sum: f64 = (0..n).map(weight).sum();
    if w_sum <= 0.0 {
        return Err(ForecastError::InvalidParameter("weights sum to zero".into()));
    }

    let y_mean = (0..n).map(|i| weight(i) * y[i]).sum::<f64>() / w_sum;
    let x_mean: Vec<f64> = (0..k)
        .map(|j| (0..n).map(|i| weight(i) * rows[i][j]).sum::<f64>() / w_sum)
        .collect();

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for i in 0..n {
        let wi = weight(i);
        let dy = y[i] - y_mean;
        for a in 0..k {
            let da = rows[i][a] - x_mean[a];
            xty[a] += wi * da * dy;
            for b in 0..=a {
                xtx[a][b] += wi * da * (rows[i][b] - x_mean[b]);
            }
        }
    }
    for a in 0..k {
        for b in 0..a {
            xtx[b][a] = xtx[a][b];
        }
    }

    // Columns without spread carry no information; pin them to zero.
    let active: Vec<usize> = (0..k)
        .filter(|&j| {
            let scale = 16.0 * f64::EPSILON * x_mean[j].abs().max(1.0);
            xtx[j][j] > scale * scale * w_sum
        })
        .collect();

    let mut coefficients = vec![0.0; k];
    if !active.is_empty() {
        let m = active.len();
        let trace: f64 = active.iter().map(|&j| xtx[j][j]).sum();
        let jitter = 1e-10 * (trace / m as f64).max(1e-12);

        let mut a = vec![vec![0.0; m]; m];
        let mut b = vec![0.0; m];
        for (p, &jp) in active.iter().enumerate() {
            b[p] = xty[jp];
            for (q, &jq) in active.iter().enumerate() {
                a[p][q] = xtx[jp][jq];
            }
            a[p][p] += jitter;
        }

        let beta = solve_symmetric(&a, &b).ok_or_else(|| {
            ForecastError::SingularMatrix("least squares normal equations".into())
        })?;
        for (p, &jp) in active.iter().enumerate() {
            coefficients[jp] = beta[p];
        }
    }

    let intercept = y_mean
        - coefficients
            .iter()
            .zip(x_mean.iter())
            .map(|(c, m)| c * m)
            .sum::<f64>();

    if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
        return Err(ForecastError::ComputationError(
            "least squares produced non-finite coefficients".into(),
        ));
    }

    Ok(OLSResult {
        coefficients,
        intercept,
    })
}

/// Solve symmetric positive definite system using Cholesky decomposition.
///
/// Solves A @ x = b where A is symmetric positive definite.
pub(crate) fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // Forward substitution: L @ y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // Backward substitution: L' @ x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}
