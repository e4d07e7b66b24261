//! Stacking of base-learner fits and isotonic bias correction.
//!
//! The stack is a weighted least-squares blend of the learners' in-sample
//! fits over the most recent window, followed by a monotone calibration map
//! fitted on the same window. Short overlaps and single learners degrade to
//! simpler blends instead of failing.

use crate::core::{Month, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::FittedLearner;
use crate::utils::ols::weighted_ols;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Smallest overlap that supports a fitted blend.
const MIN_STACK_OVERLAP: usize = 12;

/// How much of the stack could be estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Weighted OLS blend plus isotonic calibration.
    Full,
    /// Equal-weight blend, no calibration.
    ReducedFidelity,
    /// Single learner passed through unchanged.
    PassThrough,
}

/// Monotone non-decreasing map fitted by pool-adjacent-violators.
///
/// Between knots the map interpolates linearly; outside the knot range it
/// clips to the boundary values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    knots_x: Vec<f64>,
    knots_y: Vec<f64>,
}

impl IsotonicCalibrator {
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: x.len(),
                got: y.len(),
            });
        }
        let mut order: Vec<usize> = (0..x.len())
            .filter(|&i| x[i].is_finite() && y[i].is_finite())
            .collect();
        if order.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        order.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(Ordering::Equal));

        // Tied x values collapse into one weighted point.
        let mut knots_x: Vec<f64> = Vec::new();
        let mut sums: Vec<f64> = Vec::new();
        let mut counts: Vec<f64> = Vec::new();
        for i in order {
            if knots_x.last() == Some(&x[i]) {
                if let (Some(s), Some(c)) = (sums.last_mut(), counts.last_mut()) {
                    *s += y[i];
                    *c += 1.0;
                }
            } else {
                knots_x.push(x[i]);
                sums.push(y[i]);
                counts.push(1.0);
            }
        }

        // Blocks of (mean, weight, number of knots).
        let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(knots_x.len());
        for (s, c) in sums.iter().zip(&counts) {
            blocks.push((s / c, *c, 1));
            while blocks.len() >= 2 {
                let (v2, w2, n2) = blocks[blocks.len() - 1];
                let (v1, w1, n1) = blocks[blocks.len() - 2];
                if v1 <= v2 {
                    break;
                }
                blocks.pop();
                blocks.pop();
                blocks.push(((v1 * w1 + v2 * w2) / (w1 + w2), w1 + w2, n1 + n2));
            }
        }

        let knots_y = blocks
            .iter()
            .flat_map(|&(v, _, n)| std::iter::repeat(v).take(n))
            .collect();
        Ok(Self { knots_x, knots_y })
    }

    pub fn knots(&self) -> (&[f64], &[f64]) {
        (&self.knots_x, &self.knots_y)
    }

    pub fn predict(&self, v: f64) -> f64 {
        if v.is_nan() {
            return f64::NAN;
        }
        let last = self.knots_x.len() - 1;
        if v <= self.knots_x[0] {
            return self.knots_y[0];
        }
        if v >= self.knots_x[last] {
            return self.knots_y[last];
        }
        let hi = self.knots_x.partition_point(|&x| x <= v);
        let lo = hi - 1;
        let (x0, x1) = (self.knots_x[lo], self.knots_x[hi]);
        let (y0, y1) = (self.knots_y[lo], self.knots_y[hi]);
        y0 + (y1 - y0) * (v - x0) / (x1 - x0)
    }
}

/// `exp(ln 2 * (i - (n - 1)) / half_life)`: the newest point weighs 1.
pub fn recency_weights(n: usize, half_life: usize) -> Vec<f64> {
    let lambda = std::f64::consts::LN_2 / half_life.max(1) as f64;
    (0..n)
        .map(|i| (lambda * (i as f64 - (n as f64 - 1.0))).exp())
        .collect()
}

/// Fitted blend plus optional calibrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackModel {
    pub learners: Vec<String>,
    pub intercept: f64,
    pub weights: Vec<f64>,
    pub mode: CalibrationMode,
    calibrator: Option<IsotonicCalibrator>,
}

impl StackModel {
    pub fn pass_through(learner: &str) -> Self {
        Self {
            learners: vec![learner.to_string()],
            intercept: 0.0,
            weights: vec![1.0],
            mode: CalibrationMode::PassThrough,
            calibrator: None,
        }
    }

    pub fn equal_blend(learners: Vec<String>) -> Self {
        let w = 1.0 / learners.len().max(1) as f64;
        Self {
            weights: vec![w; learners.len()],
            learners,
            intercept: 0.0,
            mode: CalibrationMode::ReducedFidelity,
            calibrator: None,
        }
    }

    pub fn calibrator(&self) -> Option<&IsotonicCalibrator> {
        self.calibrator.as_ref()
    }

    /// Blend one value per learner.
    pub fn combine(&self, outputs: &[f64]) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(outputs)
                .map(|(w, v)| w * v)
                .sum::<f64>()
    }

    /// Calibrate a blended value; identity without a calibrator.
    pub fn calibrate(&self, value: f64) -> f64 {
        match &self.calibrator {
            Some(iso) => iso.predict(value),
            None => value,
        }
    }

    /// Blend and calibrate per-learner paths (`paths[learner][step]`).
    pub fn apply(&self, paths: &[Vec<f64>]) -> Result<Vec<f64>> {
        if paths.len() != self.weights.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.weights.len(),
                got: paths.len(),
            });
        }
        let steps = paths.first().map(|p| p.len()).unwrap_or(0);
        if paths.iter().any(|p| p.len() != steps) {
            return Err(ForecastError::ComputationError(
                "learner paths differ in length".to_string(),
            ));
        }
        Ok((0..steps)
            .map(|t| {
                let outputs: Vec<f64> = paths.iter().map(|p| p[t]).collect();
                self.calibrate(self.combine(&outputs))
            })
            .collect())
    }
}

/// A stack together with its in-sample series.
#[derive(Debug, Clone)]
pub struct StackFit {
    pub model: StackModel,
    /// Overlap months shared by every learner fit and the actuals.
    pub months: Vec<Month>,
    pub actual: Vec<f64>,
    /// Blend over the whole overlap.
    pub stacked: Vec<f64>,
    /// `stacked` with the recent window replaced by its calibrated values.
    pub calibrated: Vec<f64>,
    /// Index of the first month of the recent window.
    pub window_start: usize,
}

impl StackFit {
    pub fn window_actual(&self) -> &[f64] {
        &self.actual[self.window_start..]
    }

    pub fn window_calibrated(&self) -> &[f64] {
        &self.calibrated[self.window_start..]
    }

    /// `actual - stacked` over the overlap.
    pub fn residuals(&self) -> Vec<f64> {
        self.actual
            .iter()
            .zip(&self.stacked)
            .map(|(a, s)| a - s)
            .collect()
    }

    /// Calibrated in-sample value at `month`.
    pub fn calibrated_at(&self, month: Month) -> Option<f64> {
        self.months
            .binary_search(&month)
            .ok()
            .map(|i| self.calibrated[i])
    }
}

/// Fit the stack over the trailing `window` months of the overlap.
pub fn fit_stack(
    learners: &[&dyn FittedLearner],
    target: &TimeSeries,
    window: usize,
    half_life: Option<usize>,
) -> Result<StackFit> {
    let first = learners.first().ok_or_else(|| {
        ForecastError::ComputationError("stacking needs at least one learner".to_string())
    })?;
    let fits: Vec<BTreeMap<Month, f64>> = learners
        .iter()
        .map(|l| l.fitted_values().iter().copied().collect())
        .collect();

    let mut months = Vec::new();
    let mut actual = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); learners.len()];
    for &(month, _) in first.fitted_values() {
        let Some(y) = target.get(month) else {
            continue;
        };
        let row: Option<Vec<f64>> = fits
            .iter()
            .map(|f| f.get(&month).copied().filter(|v| v.is_finite()))
            .collect();
        let Some(row) = row else {
            continue;
        };
        months.push(month);
        actual.push(y);
        for (col, v) in columns.iter_mut().zip(row) {
            col.push(v);
        }
    }
    if months.is_empty() {
        return Err(ForecastError::ComputationError(
            "learner fits do not overlap the target".to_string(),
        ));
    }

    let n = months.len();
    let window_start = n - window.min(n);
    let names: Vec<String> = learners.iter().map(|l| l.name().to_string()).collect();

    let model = if learners.len() == 1 {
        StackModel::pass_through(&names[0])
    } else if n < MIN_STACK_OVERLAP.max(window) {
        warn!(overlap = n, window, "overlap too short, using equal-weight blend");
        StackModel::equal_blend(names)
    } else {
        let rows: Vec<Vec<f64>> = (window_start..n)
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect();
        let y_tail = &actual[window_start..];
        let weights = half_life.map(|h| recency_weights(y_tail.len(), h));
        match weighted_ols(y_tail, &rows, weights.as_deref()) {
            Ok(ols) => {
                let mut model = StackModel {
                    learners: names,
                    intercept: ols.intercept,
                    weights: ols.coefficients,
                    mode: CalibrationMode::Full,
                    calibrator: None,
                };
                let stacked_tail: Vec<f64> = rows.iter().map(|r| model.combine(r)).collect();
                model.calibrator = Some(IsotonicCalibrator::fit(&stacked_tail, y_tail)?);
                model
            }
            Err(e) => {
                warn!(error = %e, "stack regression failed, using equal-weight blend");
                StackModel::equal_blend(names)
            }
        }
    };

    let stacked: Vec<f64> = (0..n)
        .map(|i| {
            let outputs: Vec<f64> = columns.iter().map(|c| c[i]).collect();
            model.combine(&outputs)
        })
        .collect();
    let calibrated: Vec<f64> = stacked
        .iter()
        .enumerate()
        .map(|(i, &v)| if i >= window_start { model.calibrate(v) } else { v })
        .collect();

    debug!(
        mode = ?model.mode,
        intercept = model.intercept,
        weights = ?model.weights,
        overlap = n,
        "stack fitted"
    );

    Ok(StackFit {
        model,
        months,
        actual,
        stacked,
        calibrated,
        window_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::FutureDesign;
    use approx::assert_relative_eq;

    #[derive(Debug)]
    struct Fixed {
        name: String,
        fitted: Vec<(Month, f64)>,
    }

    impl FittedLearner for Fixed {
        fn name(&self) -> &str {
            &self.name
        }

        fn fitted_values(&self) -> &[(Month, f64)] {
            &self.fitted
        }

        fn residual_std(&self) -> f64 {
            0.0
        }

        fn forecast(&self, _: &TimeSeries, _: Month, future: &FutureDesign) -> Result<Vec<f64>> {
            Ok(vec![0.0; future.horizon()])
        }
    }

    fn jan(year: i32) -> Month {
        Month::new(year, 1).unwrap()
    }

    fn fixed(name: &str, start: Month, values: &[f64]) -> Fixed {
        Fixed {
            name: name.to_string(),
            fitted: values.iter().enumerate().map(|(i, v)| (start + i as i32, *v)).collect(),
        }
    }

    #[test]
    fn isotonic_is_monotone_and_clips() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 3.0, 2.0, 4.0, 3.5];
        let iso = IsotonicCalibrator::fit(&x, &y).unwrap();
        let (_, ky) = iso.knots();
        assert!(ky.windows(2).all(|w| w[0] <= w[1]));
        assert_relative_eq!(ky[1], 2.5);
        assert_relative_eq!(ky[4], 3.75);
        assert_eq!(iso.predict(-10.0), 1.0);
        assert_eq!(iso.predict(10.0), 3.75);
        assert_relative_eq!(iso.predict(1.5), 1.75);
        assert!(iso.predict(f64::NAN).is_nan());
    }

    #[test]
    fn isotonic_averages_tied_inputs() {
        let iso = IsotonicCalibrator::fit(&[2.0, 1.0, 2.0], &[4.0, 0.0, 6.0]).unwrap();
        assert_eq!(iso.knots().0, &[1.0, 2.0]);
        assert_eq!(iso.knots().1, &[0.0, 5.0]);
    }

    #[test]
    fn recency_weights_halve_every_half_life() {
        let w = recency_weights(13, 12);
        assert_relative_eq!(w[12], 1.0);
        assert_relative_eq!(w[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn single_learner_passes_through() {
        let start = jan(2020);
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let target = TimeSeries::monthly(start, values.iter().map(|v| v + 1.0).collect());
        let a = fixed("a", start, &values);
        let fit = fit_stack(&[&a], &target, 18, Some(12)).unwrap();
        assert_eq!(fit.model.mode, CalibrationMode::PassThrough);
        assert_eq!(fit.calibrated, values);
        assert_eq!(fit.model.apply(&[vec![3.0]]).unwrap(), vec![3.0]);
    }

    #[test]
    fn short_overlap_blends_equally() {
        let start = jan(2020);
        let target = TimeSeries::monthly(start, vec![10.0; 20]);
        let a = fixed("a", start, &[8.0; 10]);
        let b = fixed("b", start + 2, &[12.0; 10]);
        let fit = fit_stack(&[&a, &b], &target, 18, Some(12)).unwrap();
        assert_eq!(fit.months.len(), 8);
        assert_eq!(fit.model.mode, CalibrationMode::ReducedFidelity);
        assert_eq!(fit.model.weights, vec![0.5, 0.5]);
        assert_eq!(fit.stacked[0], 10.0);
    }

    #[test]
    fn full_stack_recovers_blend_and_calibrates_window() {
        let start = jan(2018);
        let a_vals: Vec<f64> = (0..40).map(|i| (i as f64 * 0.5).sin() * 5.0 + 100.0).collect();
        let b_vals: Vec<f64> = (0..40).map(|i| (i as f64 * 0.9).cos() * 3.0 + 100.0).collect();
        let actual: Vec<f64> = a_vals
            .iter()
            .zip(&b_vals)
            .map(|(a, b)| 1.0 + 0.7 * a + 0.29 * b)
            .collect();
        let target = TimeSeries::monthly(start, actual.clone());
        let a = fixed("linear", start, &a_vals);
        let b = fixed("structural", start, &b_vals);
        let fit = fit_stack(&[&a, &b], &target, 18, Some(12)).unwrap();

        assert_eq!(fit.model.mode, CalibrationMode::Full);
        assert_relative_eq!(fit.model.weights[0], 0.7, epsilon = 1e-6);
        assert_relative_eq!(fit.model.weights[1], 0.29, epsilon = 1e-6);
        assert_eq!(fit.window_start, 22);
        for (c, y) in fit.window_calibrated().iter().zip(fit.window_actual()) {
            assert_relative_eq!(*c, *y, epsilon = 1e-6);
        }
        assert!(fit.calibrator_is_monotone());
    }

    #[test]
    fn recency_weighting_favours_the_recent_regime() {
        let start = jan(2018);
        let a_vals: Vec<f64> = (0..40).map(|i| (i as f64 * 0.5).sin() * 5.0 + 100.0).collect();
        let b_vals: Vec<f64> = (0..40).map(|i| (i as f64 * 0.9).cos() * 3.0 + 100.0).collect();
        // The target follows `a` until its last six months, then `b`.
        let actual: Vec<f64> = (0..40)
            .map(|i| if i < 34 { a_vals[i] } else { b_vals[i] })
            .collect();
        let target = TimeSeries::monthly(start, actual);
        let a = fixed("linear", start, &a_vals);
        let b = fixed("structural", start, &b_vals);

        let flat = fit_stack(&[&a, &b], &target, 24, None).unwrap();
        let recent = fit_stack(&[&a, &b], &target, 24, Some(2)).unwrap();
        assert_eq!(flat.model.mode, CalibrationMode::Full);
        assert_eq!(recent.model.mode, CalibrationMode::Full);

        assert!(flat.model.weights[0] > flat.model.weights[1]);
        assert!(recent.model.weights[1] > flat.model.weights[1] + 0.2);
        assert!(recent.model.weights[0] < flat.model.weights[0]);
    }

    impl StackFit {
        fn calibrator_is_monotone(&self) -> bool {
            self.model
                .calibrator()
                .map(|c| c.knots().1.windows(2).all(|w| w[0] <= w[1]))
                .unwrap_or(false)
        }
    }
}
