//! Regularized linear learner with recursive multi-step forecasting.
//!
//! Features are standardized on training statistics, the penalty strength is
//! chosen by contiguous k-fold cross-validation, and forecasts feed their own
//! outputs back into the autoregressive columns one month at a time.

use crate::config::{LinearPenalty, PipelineConfig};
use crate::core::{Month, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{BaseLearner, FittedLearner, LearnerData};
use crate::pipeline::features::FutureDesign;
use crate::utils::cross_validation::kfold;
use crate::utils::ols::solve_symmetric;
use crate::utils::stats::{mean, population_std};
use std::collections::BTreeMap;
use tracing::debug;

const CD_MAX_ITER: usize = 20_000;
const CD_TOLERANCE: f64 = 1e-4;

/// Column-wise standardization fitted on training rows.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Zero-variance columns get scale 1, so they standardize to zero.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let k = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut means = Vec::with_capacity(k);
        let mut scales = Vec::with_capacity(k);
        for j in 0..k {
            let col: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            let m = mean(&col);
            let s = population_std(&col);
            means.push(m);
            scales.push(if s > 1e-12 * m.abs().max(1.0) { s } else { 1.0 });
        }
        Self { means, scales }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.scales.iter()))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

/// Penalized weights on standardized features.
#[derive(Debug, Clone, PartialEq)]
struct PenalizedFit {
    weights: Vec<f64>,
    intercept: f64,
}

impl PenalizedFit {
    fn predict(&self, z: &[f64]) -> f64 {
        self.intercept + self.weights.iter().zip(z).map(|(w, x)| w * x).sum::<f64>()
    }
}

/// Fit on standardized rows `z`. The intercept is the mean of `y`.
fn fit_penalized(z: &[Vec<f64>], y: &[f64], penalty: LinearPenalty, alpha: f64) -> Result<PenalizedFit> {
    let n = y.len();
    if n == 0 {
        return Err(ForecastError::EmptyData);
    }
    let k = z.first().map(|r| r.len()).unwrap_or(0);
    let y_mean = mean(y);
    // Center so the intercept stays unpenalized.
    let z_mean: Vec<f64> = (0..k)
        .map(|j| z.iter().map(|r| r[j]).sum::<f64>() / n as f64)
        .collect();
    let xc: Vec<Vec<f64>> = z
        .iter()
        .map(|r| r.iter().zip(&z_mean).map(|(x, m)| x - m).collect())
        .collect();
    let yc: Vec<f64> = y.iter().map(|v| v - y_mean).collect();

    let weights = if k == 0 {
        Vec::new()
    } else {
        match penalty {
            LinearPenalty::Ridge => ridge_weights(&xc, &yc, alpha)?,
            LinearPenalty::Lasso => coordinate_descent(&xc, &yc, alpha, 1.0)?,
            LinearPenalty::ElasticNet { l1_ratio } => coordinate_descent(&xc, &yc, alpha, l1_ratio)?,
        }
    };
    let intercept = y_mean - weights.iter().zip(&z_mean).map(|(w, m)| w * m).sum::<f64>();
    Ok(PenalizedFit { weights, intercept })
}

/// Minimize `||y - Xw||^2 + alpha ||w||^2` in closed form.
fn ridge_weights(x: &[Vec<f64>], y: &[f64], alpha: f64) -> Result<Vec<f64>> {
    let k = x[0].len();
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &yi) in x.iter().zip(y) {
        for a in 0..k {
            xty[a] += row[a] * yi;
            for b in 0..=a {
                xtx[a][b] += row[a] * row[b];
            }
        }
    }
    for a in 0..k {
        for b in 0..a {
            xtx[b][a] = xtx[a][b];
        }
        xtx[a][a] += alpha;
    }
    solve_symmetric(&xtx, &xty)
        .ok_or_else(|| ForecastError::SingularMatrix(format!("ridge system at alpha {alpha}")))
}

/// Cyclic coordinate descent for
/// `(1 / 2n) ||y - Xw||^2 + alpha * l1 ||w||_1 + alpha * (1 - l1) / 2 ||w||^2`.
fn coordinate_descent(x: &[Vec<f64>], y: &[f64], alpha: f64, l1_ratio: f64) -> Result<Vec<f64>> {
    let n = y.len() as f64;
    let k = x[0].len();
    let col_sq: Vec<f64> = (0..k).map(|j| x.iter().map(|r| r[j] * r[j]).sum::<f64>() / n).collect();
    let l1 = alpha * l1_ratio;
    let l2 = alpha * (1.0 - l1_ratio);

    let mut w = vec![0.0; k];
    let mut residual = y.to_vec();
    for iter in 0..CD_MAX_ITER {
        let mut max_delta: f64 = 0.0;
        let mut max_w: f64 = 0.0;
        for j in 0..k {
            if col_sq[j] <= 0.0 {
                continue;
            }
            let rho = x
                .iter()
                .zip(&residual)
                .map(|(r, e)| r[j] * e)
                .sum::<f64>()
                / n
                + col_sq[j] * w[j];
            let updated = soft_threshold(rho, l1) / (col_sq[j] + l2);
            let delta = updated - w[j];
            if delta != 0.0 {
                for (e, r) in residual.iter_mut().zip(x) {
                    *e -= delta * r[j];
                }
                w[j] = updated;
            }
            max_delta = max_delta.max(delta.abs());
            max_w = max_w.max(updated.abs());
        }
        if max_delta <= CD_TOLERANCE * max_w.max(1e-12) || max_delta == 0.0 {
            debug!(iterations = iter + 1, alpha, "coordinate descent converged");
            return Ok(w);
        }
    }
    Err(ForecastError::NonConvergence {
        iterations: CD_MAX_ITER,
        context: format!("coordinate descent at alpha {alpha}"),
    })
}

fn soft_threshold(x: f64, t: f64) -> f64 {
    if x > t {
        x - t
    } else if x < -t {
        x + t
    } else {
        0.0
    }
}

/// Mean squared CV error of `alpha` over contiguous folds.
fn cv_score(rows: &[Vec<f64>], y: &[f64], penalty: LinearPenalty, alpha: f64, folds: usize) -> Result<f64> {
    let mut total = 0.0;
    let splits = kfold(y.len(), folds)?;
    for fold in &splits {
        let train_rows: Vec<Vec<f64>> = fold.train.iter().map(|&i| rows[i].clone()).collect();
        let train_y: Vec<f64> = fold.train.iter().map(|&i| y[i]).collect();
        let scaler = StandardScaler::fit(&train_rows);
        let fit = fit_penalized(&scaler.transform(&train_rows), &train_y, penalty, alpha)?;
        let sse: f64 = fold
            .test
            .iter()
            .map(|&i| (y[i] - fit.predict(&scaler.transform_row(&rows[i]))).powi(2))
            .sum();
        total += sse / fold.test.len() as f64;
    }
    Ok(total / splits.len() as f64)
}

/// Factory for [`LinearModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLearner {
    pub penalty: LinearPenalty,
    pub grid: Vec<f64>,
    pub folds: usize,
    pub ar_order: usize,
}

impl LinearLearner {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            penalty: config.linear_penalty,
            grid: config.effective_grid(),
            folds: config.cv_folds,
            ar_order: config.ar_order,
        }
    }

    /// Pick the grid value with the lowest CV error; ties go to the earliest.
    fn select_alpha(&self, rows: &[Vec<f64>], y: &[f64]) -> Result<f64> {
        let mut best: Option<(f64, f64)> = None;
        let mut last_err = None;
        for &alpha in &self.grid {
            match cv_score(rows, y, self.penalty, alpha, self.folds) {
                Ok(score) if score.is_finite() => {
                    if best.map(|(_, s)| score < s).unwrap_or(true) {
                        best = Some((alpha, score));
                    }
                }
                Ok(_) => {}
                Err(e) => last_err = Some(e),
            }
        }
        best.map(|(alpha, _)| alpha).ok_or_else(|| {
            last_err.unwrap_or_else(|| {
                ForecastError::InvalidParameter("regularization grid is empty".to_string())
            })
        })
    }
}

impl BaseLearner for LinearLearner {
    fn name(&self) -> &str {
        "linear"
    }

    fn fit(&self, data: &LearnerData<'_>) -> Result<Box<dyn FittedLearner>> {
        let design = data.frame.design(data.target, data.origin, self.ar_order);
        let needed = (2 * self.folds).max(design.num_features() + 2);
        if design.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: design.len(),
            });
        }

        let alpha = self.select_alpha(&design.rows, &design.target)?;
        let scaler = StandardScaler::fit(&design.rows);
        let fit = fit_penalized(&scaler.transform(&design.rows), &design.target, self.penalty, alpha)?;

        let fitted: Vec<(Month, f64)> = design
            .months
            .iter()
            .zip(&design.rows)
            .map(|(m, row)| (*m, fit.predict(&scaler.transform_row(row))))
            .collect();
        let residuals: Vec<f64> = design
            .target
            .iter()
            .zip(&fitted)
            .map(|(y, (_, f))| y - f)
            .collect();

        debug!(
            penalty = self.penalty.name(),
            alpha,
            rows = design.len(),
            features = design.num_features(),
            "linear learner fitted"
        );

        Ok(Box::new(LinearModel {
            ar_order: self.ar_order,
            scaler,
            weights: fit.weights,
            intercept: fit.intercept,
            alpha,
            fitted,
            residual_std: population_std(&residuals),
        }))
    }
}

/// Fitted regularized linear model.
#[derive(Debug, Clone)]
pub struct LinearModel {
    ar_order: usize,
    scaler: StandardScaler,
    weights: Vec<f64>,
    intercept: f64,
    alpha: f64,
    fitted: Vec<(Month, f64)>,
    residual_std: f64,
}

impl LinearModel {
    /// Coefficients on standardized features (exogenous first, then lags).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let z = self.scaler.transform_row(row);
        self.intercept + self.weights.iter().zip(&z).map(|(w, x)| w * x).sum::<f64>()
    }
}

impl FittedLearner for LinearModel {
    fn name(&self) -> &str {
        "linear"
    }

    fn fitted_values(&self) -> &[(Month, f64)] {
        &self.fitted
    }

    fn residual_std(&self) -> f64 {
        self.residual_std
    }

    fn regularization(&self) -> Option<f64> {
        Some(self.alpha)
    }

    /// Month-by-month recursion over a known-plus-forecast map.
    ///
    /// Lag `l` of month `m` reads the target at `m - l` when that month is at
    /// or before `origin`, a previous forecast after it, and the most recent
    /// known-or-forecast value when neither exists.
    fn forecast(&self, target: &TimeSeries, origin: Month, future: &FutureDesign) -> Result<Vec<f64>> {
        let mut path: BTreeMap<Month, f64> = target
            .observed()
            .take_while(|(m, _)| *m <= origin)
            .collect();
        let mut last_known = path
            .values()
            .next_back()
            .copied()
            .ok_or(ForecastError::EmptyData)?;

        let mut out = Vec::with_capacity(future.horizon());
        for (month, exog) in future.months.iter().zip(&future.exog) {
            let mut row = exog.clone();
            for lag in 1..=self.ar_order {
                let value = path.get(&(*month - lag as i32)).copied().unwrap_or(last_known);
                row.push(value);
            }
            if row.len() != self.scaler.means.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: self.scaler.means.len(),
                    got: row.len(),
                });
            }
            let yhat = self.predict_row(&row);
            path.insert(*month, yhat);
            last_known = yhat;
            out.push(yhat);
        }
        Ok(out)
    }
}
