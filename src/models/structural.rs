//! Regression with state-space errors.
//!
//! The target is regressed on the lagged exogenous columns (no target lags);
//! the regression errors follow an additive seasonal state-space model: a
//! damped local linear trend, plus additive seasonal states when the errors
//! span three full cycles, chosen by AIC. Parameters maximize the Gaussian
//! innovations likelihood. Forecasts add the error model's own multi-step
//! forecast to the regression evaluated on the future exogenous rows.

use crate::config::PipelineConfig;
use crate::core::{Month, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::exponential::{ETSSpec, SeasonalType, ETS};
use crate::models::traits::{BaseLearner, FittedLearner, LearnerData, SeriesModel};
use crate::pipeline::features::FutureDesign;
use crate::utils::ols::{weighted_ols, OLSResult};
use crate::utils::stats::population_std;
use tracing::debug;

/// Minimum design rows beyond the number of regressors.
const MIN_EXTRA_ROWS: usize = 12;

/// Seasonal cycles the errors must span before seasonal states are tried.
const MIN_SEASONAL_CYCLES: usize = 3;

/// Factory for [`StructuralModel`].
#[derive(Debug, Clone, Copy)]
pub struct StructuralLearner {
    seasonal_period: usize,
}

impl Default for StructuralLearner {
    fn default() -> Self {
        Self::with_period(12)
    }
}

impl StructuralLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learner offering seasonal error states with `period`; 1 disables them.
    pub fn with_period(period: usize) -> Self {
        Self {
            seasonal_period: period.max(1),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_period(config.seasonal_period)
    }

    pub fn seasonal_period(&self) -> usize {
        self.seasonal_period
    }

    fn error_specs(&self, len: usize) -> Vec<ETSSpec> {
        let mut specs = vec![ETSSpec::aadn()];
        let period = self.seasonal_period;
        if period > 1 && len >= MIN_SEASONAL_CYCLES * period {
            specs.push(ETSSpec::ana());
            specs.push(ETSSpec::aaa());
        }
        specs
    }

    /// Lowest-AIC fit among the damped and seasonal specifications; a
    /// level-only model when none of them can be fit.
    fn fit_errors(&self, errors: &[f64]) -> Result<ETS> {
        let mut best: Option<ETS> = None;
        for spec in self.error_specs(errors.len()) {
            match ETS::fit(spec, self.seasonal_period, errors) {
                Ok(model) if model.aic().is_finite() => {
                    if best.as_ref().map_or(true, |b| model.aic() < b.aic()) {
                        best = Some(model);
                    }
                }
                Ok(_) => debug!(spec = %spec.short_name(), "error model has no finite AIC"),
                Err(e) => debug!(spec = %spec.short_name(), error = %e, "error model rejected"),
            }
        }
        match best {
            Some(model) => Ok(model),
            None => {
                debug!("no damped or seasonal error model, using level only");
                ETS::fit(ETSSpec::ann(), 1, errors)
            }
        }
    }
}

impl BaseLearner for StructuralLearner {
    fn name(&self) -> &str {
        "structural"
    }

    fn fit(&self, data: &LearnerData<'_>) -> Result<Box<dyn FittedLearner>> {
        let design = data.frame.design(data.target, data.origin, 0);
        let needed = design.num_features() + MIN_EXTRA_ROWS;
        if design.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: design.len(),
            });
        }

        let regression = weighted_ols(&design.target, &design.rows, None)?;
        let errors: Vec<f64> = design
            .target
            .iter()
            .zip(&design.rows)
            .map(|(y, row)| y - regression.predict_row(row))
            .collect();
        let error_model = self.fit_errors(&errors)?;

        let fitted: Vec<(Month, f64)> = design
            .months
            .iter()
            .zip(&design.rows)
            .zip(error_model.fitted_values())
            .map(|((m, row), e)| (*m, regression.predict_row(row) + e))
            .collect();
        let residuals: Vec<f64> = design
            .target
            .iter()
            .zip(&fitted)
            .map(|(y, (_, f))| y - f)
            .collect();
        let last_fit_month = design.months.last().copied().ok_or(ForecastError::EmptyData)?;

        debug!(
            regressors = design.num_features(),
            rows = design.len(),
            error_model = error_model.name(),
            seasonal = error_model.spec().seasonal == SeasonalType::Additive,
            "structural learner fitted"
        );

        Ok(Box::new(StructuralModel {
            regression,
            error_model,
            last_fit_month,
            fitted,
            residual_std: population_std(&residuals),
        }))
    }
}

/// Fitted regression-with-ETS-errors model.
#[derive(Debug, Clone)]
pub struct StructuralModel {
    regression: OLSResult,
    error_model: ETS,
    last_fit_month: Month,
    fitted: Vec<(Month, f64)>,
    residual_std: f64,
}

impl StructuralModel {
    pub fn regression(&self) -> &OLSResult {
        &self.regression
    }

    pub fn error_model(&self) -> &ETS {
        &self.error_model
    }
}

impl FittedLearner for StructuralModel {
    fn name(&self) -> &str {
        "structural"
    }

    fn fitted_values(&self) -> &[(Month, f64)] {
        &self.fitted
    }

    fn residual_std(&self) -> f64 {
        self.residual_std
    }

    /// The error model runs from the last fitted month, so when that month
    /// precedes `origin` the leading steps are skipped.
    fn forecast(&self, _target: &TimeSeries, origin: Month, future: &FutureDesign) -> Result<Vec<f64>> {
        let skip = (origin - self.last_fit_month).max(0) as usize;
        let errors = self.error_model.forecast(skip + future.horizon())?;
        future
            .exog
            .iter()
            .zip(&errors[skip..])
            .map(|(row, e)| {
                if row.len() != self.regression.num_regressors() {
                    return Err(ForecastError::DimensionMismatch {
                        expected: self.regression.num_regressors(),
                        got: row.len(),
                    });
                }
                Ok(self.regression.predict_row(row) + e)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::{FeatureFrame, LaggedColumn};
    use approx::assert_relative_eq;

    fn jan(year: i32) -> Month {
        Month::new(year, 1).unwrap()
    }

    #[test]
    fn recovers_exogenous_effect() {
        let x: Vec<f64> = (0..60).map(|i| (i as f64 * 0.4).sin() * 10.0).collect();
        // Target at month m is 50 + 2 * x(m - 2).
        let y: Vec<f64> = (0..48)
            .map(|i| if i >= 2 { 50.0 + 2.0 * x[i - 2] } else { 50.0 })
            .collect();
        let target = TimeSeries::monthly(jan(2020), y);
        let origin = jan(2020) + 47;
        let frame = FeatureFrame::new(vec![LaggedColumn::new("X", 2, jan(2020), x.clone(), 48)]);
        let data = LearnerData {
            frame: &frame,
            target: &target,
            origin,
        };
        let model = StructuralLearner::new().fit(&data).unwrap();
        let future = frame.future_design(origin, 6).unwrap();
        let fc = model.forecast(&target, origin, &future).unwrap();
        for (h, v) in fc.iter().enumerate() {
            assert_relative_eq!(*v, 50.0 + 2.0 * x[46 + h], epsilon = 1e-6);
        }
    }

    #[test]
    fn without_exogenous_columns_tracks_level() {
        let target = TimeSeries::monthly(jan(2020), vec![100.0; 40]);
        let origin = jan(2020) + 39;
        let frame = FeatureFrame::default();
        let data = LearnerData {
            frame: &frame,
            target: &target,
            origin,
        };
        let model = StructuralLearner::new().fit(&data).unwrap();
        assert_eq!(model.fitted_values().len(), 40);
        let fc = model
            .forecast(&target, origin, &frame.future_design(origin, 3).unwrap())
            .unwrap();
        for v in fc {
            assert_relative_eq!(v, 100.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn seasonal_errors_carry_the_cycle_forward() {
        let wave = |m: usize| 100.0 + 10.0 * (2.0 * std::f64::consts::PI * m as f64 / 12.0).sin();
        let values: Vec<f64> = (0..60)
            .map(|m| wave(m) + 0.05 * ((m * 7) % 5) as f64)
            .collect();
        let target = TimeSeries::monthly(jan(2019), values);
        let origin = jan(2019) + 59;
        let frame = FeatureFrame::default();
        let data = LearnerData {
            frame: &frame,
            target: &target,
            origin,
        };
        let fc = StructuralLearner::with_period(12)
            .fit(&data)
            .unwrap()
            .forecast(&target, origin, &frame.future_design(origin, 12).unwrap())
            .unwrap();

        for (h, v) in fc.iter().enumerate() {
            assert!((v - wave(60 + h)).abs() < 3.0, "step {h}: {v} vs {}", wave(60 + h));
        }
        let hi = fc.iter().cloned().fold(f64::MIN, f64::max);
        let lo = fc.iter().cloned().fold(f64::MAX, f64::min);
        assert!(hi - lo > 14.0);
    }

    #[test]
    fn seasonal_states_need_three_cycles() {
        let learner = StructuralLearner::with_period(12);
        assert_eq!(learner.error_specs(35).len(), 1);
        assert_eq!(learner.error_specs(36).len(), 3);
        assert_eq!(StructuralLearner::with_period(1).error_specs(100).len(), 1);
    }

    #[test]
    fn short_design_is_rejected() {
        let target = TimeSeries::monthly(jan(2020), vec![1.0; 8]);
        let frame = FeatureFrame::default();
        let data = LearnerData {
            frame: &frame,
            target: &target,
            origin: jan(2020) + 7,
        };
        assert!(StructuralLearner::new().fit(&data).is_err());
    }
}
