//! Additive-error ETS state-space models.
//!
//! Covers the additive members of the ETS family used to extend candidate
//! series: level only, additive trend, damped trend, each with or without an
//! additive seasonal component. Smoothing parameters are estimated by
//! minimizing the Gaussian negative log-likelihood with Nelder-Mead.

use crate::error::{ForecastError, Result};
use crate::models::traits::SeriesModel;
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};
use crate::utils::stats::population_std;

/// Trend component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendType {
    /// No trend
    #[default]
    None,
    /// Additive trend
    Additive,
    /// Additive damped trend
    AdditiveDamped,
}

/// Seasonal component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeasonalType {
    #[default]
    None,
    Additive,
}

/// ETS model specification (errors are always additive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ETSSpec {
    pub trend: TrendType,
    pub seasonal: SeasonalType,
}

impl ETSSpec {
    pub fn new(trend: TrendType, seasonal: SeasonalType) -> Self {
        Self { trend, seasonal }
    }

    /// ETS(A,N,N) - simple exponential smoothing.
    pub fn ann() -> Self {
        Self::new(TrendType::None, SeasonalType::None)
    }

    /// ETS(A,A,N) - Holt's linear trend.
    pub fn aan() -> Self {
        Self::new(TrendType::Additive, SeasonalType::None)
    }

    /// ETS(A,Ad,N) - damped trend.
    pub fn aadn() -> Self {
        Self::new(TrendType::AdditiveDamped, SeasonalType::None)
    }

    /// ETS(A,N,A) - level with additive seasonality.
    pub fn ana() -> Self {
        Self::new(TrendType::None, SeasonalType::Additive)
    }

    /// ETS(A,A,A) - additive Holt-Winters.
    pub fn aaa() -> Self {
        Self::new(TrendType::Additive, SeasonalType::Additive)
    }

    pub fn short_name(&self) -> String {
        let t = match self.trend {
            TrendType::None => "N",
            TrendType::Additive => "A",
            TrendType::AdditiveDamped => "Ad",
        };
        let s = match self.seasonal {
            SeasonalType::None => "N",
            SeasonalType::Additive => "A",
        };
        format!("ETS(A,{},{})", t, s)
    }

    pub fn has_trend(&self) -> bool {
        !matches!(self.trend, TrendType::None)
    }

    pub fn has_seasonal(&self) -> bool {
        !matches!(self.seasonal, SeasonalType::None)
    }

    pub fn is_damped(&self) -> bool {
        matches!(self.trend, TrendType::AdditiveDamped)
    }
}

/// Smoothing parameters; unused components are ignored by the recursion.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Smoothing {
    alpha: f64,
    beta: f64,
    gamma: f64,
    phi: f64,
}

const SMOOTHING_BOUNDS: (f64, f64) = (0.0001, 0.9999);
const DAMPING_BOUNDS: (f64, f64) = (0.8, 0.98);

/// Output of one pass of the state recursion.
#[derive(Debug, Clone)]
struct FilterPass {
    fitted: Vec<f64>,
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
    sse: f64,
    count: usize,
}

/// A fitted additive ETS model.
#[derive(Debug, Clone)]
pub struct ETS {
    spec: ETSSpec,
    name: String,
    seasonal_period: usize,
    smoothing: Smoothing,
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
    fitted: Vec<f64>,
    residual_std: f64,
    aic: f64,
    n: usize,
}

impl ETS {
    /// Smallest series length `fit` accepts for `spec`.
    pub fn min_length(spec: ETSSpec, seasonal_period: usize) -> usize {
        let base = if spec.has_seasonal() {
            3 * seasonal_period
        } else {
            4
        };
        base.max(Self::count_params(spec, seasonal_period) + 2)
    }

    /// Estimate `spec` on `values`.
    pub fn fit(spec: ETSSpec, seasonal_period: usize, values: &[f64]) -> Result<Self> {
        if spec.has_seasonal() && seasonal_period < 2 {
            return Err(ForecastError::InvalidParameter(
                "seasonal period must be at least 2".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ComputationError(
                "ETS requires finite values".to_string(),
            ));
        }
        let min_len = Self::min_length(spec, seasonal_period);
        if values.len() < min_len {
            return Err(ForecastError::InsufficientData {
                needed: min_len,
                got: values.len(),
            });
        }

        let smoothing = Self::optimize(spec, seasonal_period, values)?;
        let pass = Self::filter(spec, seasonal_period, values, smoothing);
        let start_idx = Self::start_index(spec, seasonal_period);

        let residuals: Vec<f64> = values[start_idx..]
            .iter()
            .zip(pass.fitted[start_idx..].iter())
            .map(|(y, f)| y - f)
            .collect();
        let residual_std = population_std(&residuals);

        let k = Self::count_params(spec, seasonal_period) as f64;
        let aic = -2.0 * log_likelihood(pass.sse, pass.count) + 2.0 * k;

        Ok(Self {
            spec,
            name: spec.short_name(),
            seasonal_period,
            smoothing,
            level: pass.level,
            trend: pass.trend,
            seasonals: pass.seasonals,
            fitted: pass.fitted,
            residual_std,
            aic,
            n: values.len(),
        })
    }

    pub fn spec(&self) -> ETSSpec {
        self.spec
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn alpha(&self) -> f64 {
        self.smoothing.alpha
    }

    /// Damping parameter, when the trend is damped.
    pub fn phi(&self) -> Option<f64> {
        self.spec.is_damped().then_some(self.smoothing.phi)
    }

    fn start_index(spec: ETSSpec, period: usize) -> usize {
        if spec.has_seasonal() {
            period
        } else {
            1
        }
    }

    /// Smoothing parameters plus initial states.
    fn count_params(spec: ETSSpec, period: usize) -> usize {
        let mut count = 2; // alpha, initial level
        if spec.has_trend() {
            count += 2;
        }
        if spec.is_damped() {
            count += 1;
        }
        if spec.has_seasonal() {
            count += 1 + period;
        }
        count
    }

    fn initialize_state(spec: ETSSpec, period: usize, values: &[f64]) -> (f64, f64, Vec<f64>) {
        let level = if spec.has_seasonal() {
            values.iter().take(period).sum::<f64>() / period as f64
        } else {
            values[0]
        };

        let trend = if !spec.has_trend() {
            0.0
        } else if spec.has_seasonal() {
            (0..period)
                .map(|i| (values[period + i] - values[i]) / period as f64)
                .sum::<f64>()
                / period as f64
        } else {
            values[1] - values[0]
        };

        let seasonals = if spec.has_seasonal() {
            values.iter().take(period).map(|y| y - level).collect()
        } else {
            Vec::new()
        };

        (level, trend, seasonals)
    }

    fn filter(spec: ETSSpec, period: usize, values: &[f64], p: Smoothing) -> FilterPass {
        let (mut level, mut trend, mut seasonals) = Self::initialize_state(spec, period, values);
        let start_idx = Self::start_index(spec, period);
        let phi = match spec.trend {
            TrendType::None => 0.0,
            TrendType::Additive => 1.0,
            TrendType::AdditiveDamped => p.phi,
        };

        let mut fitted = Vec::with_capacity(values.len());
        fitted.extend_from_slice(&values[..start_idx.min(values.len())]);
        let mut sse = 0.0;
        let mut count = 0;

        for (t, &y) in values.iter().enumerate().skip(start_idx) {
            let season_idx = if spec.has_seasonal() { t % period } else { 0 };
            let s = if spec.has_seasonal() {
                seasonals[season_idx]
            } else {
                0.0
            };

            let forecast = level + phi * trend + s;
            fitted.push(forecast);
            let error = y - forecast;
            sse += error * error;
            count += 1;

            let level_prev = level;
            level = p.alpha * (y - s) + (1.0 - p.alpha) * (level_prev + phi * trend);
            if spec.has_trend() {
                trend = p.beta * (level - level_prev) + (1.0 - p.beta) * phi * trend;
            }
            if spec.has_seasonal() {
                seasonals[season_idx] = p.gamma * (y - level) + (1.0 - p.gamma) * s;
            }
        }

        FilterPass {
            fitted,
            level,
            trend,
            seasonals,
            sse,
            count,
        }
    }

    fn optimize(spec: ETSSpec, period: usize, values: &[f64]) -> Result<Smoothing> {
        let mut initial = vec![0.3];
        let mut bounds = vec![SMOOTHING_BOUNDS];
        if spec.has_trend() {
            initial.push(0.1);
            bounds.push(SMOOTHING_BOUNDS);
        }
        if spec.has_seasonal() {
            initial.push(0.1);
            bounds.push(SMOOTHING_BOUNDS);
        }
        if spec.is_damped() {
            initial.push(0.95);
            bounds.push(DAMPING_BOUNDS);
        }

        let unpack = |x: &[f64]| {
            let mut it = x.iter().copied();
            let alpha = it.next().unwrap_or(0.3);
            let beta = if spec.has_trend() {
                it.next().unwrap_or(0.1)
            } else {
                0.0
            };
            let gamma = if spec.has_seasonal() {
                it.next().unwrap_or(0.1)
            } else {
                0.0
            };
            let phi = if spec.is_damped() {
                it.next().unwrap_or(0.95)
            } else {
                1.0
            };
            Smoothing {
                alpha,
                beta,
                gamma,
                phi,
            }
        };

        let result = nelder_mead(
            |x| {
                let pass = Self::filter(spec, period, values, unpack(x));
                -log_likelihood(pass.sse, pass.count)
            },
            &initial,
            &bounds,
            &NelderMeadConfig::default(),
        )?;
        Ok(unpack(&result.optimal_point))
    }

    fn damped_sum(phi: f64, h: usize) -> f64 {
        if (phi - 1.0).abs() < 1e-10 {
            h as f64
        } else {
            phi * (1.0 - phi.powi(h as i32)) / (1.0 - phi)
        }
    }
}

/// Gaussian log-likelihood with the variance profiled out.
///
/// A perfect fit would give `ln(0)`; the variance is floored at the smallest
/// positive float so flat series still optimize to a finite value.
fn log_likelihood(sse: f64, count: usize) -> f64 {
    if count == 0 {
        return f64::NEG_INFINITY;
    }
    let n = count as f64;
    let sigma2 = (sse / n).max(f64::MIN_POSITIVE);
    -0.5 * n * (1.0 + sigma2.ln() + (2.0 * std::f64::consts::PI).ln())
}

impl SeriesModel for ETS {
    fn name(&self) -> &str {
        &self.name
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        let period = self.seasonal_period;
        let forecasts = (1..=horizon)
            .map(|h| {
                let trend = match self.spec.trend {
                    TrendType::None => 0.0,
                    TrendType::Additive => h as f64 * self.trend,
                    TrendType::AdditiveDamped => {
                        Self::damped_sum(self.smoothing.phi, h) * self.trend
                    }
                };
                let season = if self.spec.has_seasonal() {
                    self.seasonals[(self.n + h - 1) % period]
                } else {
                    0.0
                };
                self.level + trend + season
            })
            .collect();
        Ok(forecasts)
    }

    fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    fn residual_std(&self) -> f64 {
        self.residual_std
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn spec_names() {
        assert_eq!(ETSSpec::ann().short_name(), "ETS(A,N,N)");
        assert_eq!(ETSSpec::aadn().short_name(), "ETS(A,Ad,N)");
        assert_eq!(ETSSpec::aaa().short_name(), "ETS(A,A,A)");
    }

    #[test]
    fn level_model_forecasts_flat() {
        let values: Vec<f64> = (0..40).map(|i| 50.0 + (i % 3) as f64 * 0.5).collect();
        let model = ETS::fit(ETSSpec::ann(), 1, &values).unwrap();
        let fc = model.forecast(5).unwrap();
        assert_eq!(fc.len(), 5);
        for v in &fc {
            assert_relative_eq!(*v, fc[0], epsilon = 1e-12);
        }
        assert!(model.aic().is_finite());
        assert!(model.residual_std() > 0.0);
    }

    #[test]
    fn trend_model_extrapolates_linear_series() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + 2.0 * i as f64).collect();
        let model = ETS::fit(ETSSpec::aan(), 1, &values).unwrap();
        let fc = model.forecast(3).unwrap();
        assert_relative_eq!(fc[0], 70.0, epsilon = 1e-6);
        assert_relative_eq!(fc[2], 74.0, epsilon = 1e-6);
    }

    #[test]
    fn damped_trend_flattens() {
        let values: Vec<f64> = (0..36).map(|i| 100.0 + i as f64).collect();
        let model = ETS::fit(ETSSpec::aadn(), 1, &values).unwrap();
        let phi = model.phi().unwrap();
        assert!((0.8..=0.98).contains(&phi));
        let fc = model.forecast(48).unwrap();
        let early = fc[1] - fc[0];
        let late = fc[47] - fc[46];
        assert!(late < early);
    }

    #[test]
    fn seasonal_model_repeats_pattern() {
        let pattern = [0.0, 5.0, -5.0, 2.0];
        let values: Vec<f64> = (0..24).map(|i| 20.0 + pattern[i % 4]).collect();
        let model = ETS::fit(ETSSpec::ana(), 4, &values).unwrap();
        let fc = model.forecast(4).unwrap();
        for (h, v) in fc.iter().enumerate() {
            assert_relative_eq!(*v, 20.0 + pattern[h % 4], epsilon = 1e-6);
        }
    }

    #[test]
    fn constant_series_fits() {
        let values = vec![7.0; 20];
        let model = ETS::fit(ETSSpec::aadn(), 1, &values).unwrap();
        assert_eq!(model.residual_std(), 0.0);
        assert!(model.forecast(3).unwrap().iter().all(|v| (*v - 7.0).abs() < 1e-12));
    }

    #[test]
    fn short_or_gappy_input_is_rejected() {
        assert!(matches!(
            ETS::fit(ETSSpec::aaa(), 12, &[1.0; 20]),
            Err(ForecastError::InsufficientData { needed: 36, .. })
        ));
        assert!(ETS::fit(ETSSpec::ann(), 1, &[1.0, f64::NAN, 2.0, 3.0, 4.0]).is_err());
    }
}
