//! Forecasting candidate series forward on their own.
//!
//! Each retained candidate is extended far enough that its lagged column
//! reaches the last forecast month. Strategies are tried in order and the
//! first success wins.

use crate::core::{Month, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::baseline::CarryForwardStrategy;
use crate::models::exponential::AutoETS;
use crate::models::traits::ExtensionStrategy;
use tracing::{debug, warn};

/// A candidate extended beyond its last observation.
#[derive(Debug, Clone)]
pub struct Extension {
    pub id: String,
    pub lag: usize,
    /// The candidate's observed history.
    pub history: TimeSeries,
    /// First extended month.
    pub start: Month,
    /// Point forecast for `start, start + 1, ...`.
    pub point: Vec<f64>,
    /// In-sample residual spread of the chosen model.
    pub residual_std: f64,
    /// Name of the model that produced the extension.
    pub model: String,
}

impl Extension {
    pub fn len(&self) -> usize {
        self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }
}

/// Months to extend a candidate whose last observation is `last_observed`.
///
/// At least `horizon + lag`, and more when the candidate stops before the
/// target so the lagged column still covers `origin + horizon`.
pub fn extension_length(last_observed: Month, origin: Month, horizon: usize, lag: usize) -> usize {
    let needed_through = origin + (horizon as i32 - lag as i32);
    let gap = (needed_through - last_observed).max(0) as usize;
    (horizon + lag).max(gap)
}

/// Fallback chain of extension strategies.
pub struct ExogenousExtender {
    strategies: Vec<Box<dyn ExtensionStrategy>>,
}

impl Default for ExogenousExtender {
    fn default() -> Self {
        Self::with_seasonal_period(12)
    }
}

impl std::fmt::Debug for ExogenousExtender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExogenousExtender")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl ExogenousExtender {
    pub fn new(strategies: Vec<Box<dyn ExtensionStrategy>>) -> Self {
        Self { strategies }
    }

    /// AIC-selected ETS, then carry-forward.
    pub fn with_seasonal_period(period: usize) -> Self {
        Self::new(vec![
            Box::new(AutoETS::with_period(period)),
            Box::new(CarryForwardStrategy),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Extend `history` by `steps` months after its last observation.
    ///
    /// Models see the observed values only, in order; interior gaps are
    /// skipped rather than filled.
    pub fn extend(&self, id: &str, history: &TimeSeries, lag: usize, steps: usize) -> Result<Extension> {
        let last = history.last_observed().ok_or(ForecastError::EmptyData)?;
        let values: Vec<f64> = history.observed().map(|(_, v)| v).collect();

        let mut last_err = ForecastError::ComputationError("no extension strategy configured".into());
        for strategy in &self.strategies {
            let attempt = strategy
                .fit(&values)
                .and_then(|model| Ok((model.forecast(steps)?, model)));
            match attempt {
                Ok((point, model)) if point.len() == steps && point.iter().all(|v| v.is_finite()) => {
                    debug!(
                        candidate = id,
                        model = model.name(),
                        steps,
                        residual_std = model.residual_std(),
                        "extended candidate"
                    );
                    return Ok(Extension {
                        id: id.to_string(),
                        lag,
                        history: history.clone(),
                        start: last + 1,
                        point,
                        residual_std: model.residual_std(),
                        model: model.name().to_string(),
                    });
                }
                Ok(_) => {
                    warn!(candidate = id, strategy = strategy.name(), "non-finite extension discarded");
                    last_err = ForecastError::ComputationError(format!(
                        "{} produced a non-finite forecast",
                        strategy.name()
                    ));
                }
                Err(e) => {
                    debug!(candidate = id, strategy = strategy.name(), error = %e, "extension strategy failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::traits::SeriesModel;

    fn jan(year: i32) -> Month {
        Month::new(year, 1).unwrap()
    }

    struct Failing;

    impl ExtensionStrategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn fit(&self, _values: &[f64]) -> Result<Box<dyn SeriesModel>> {
            Err(ForecastError::ComputationError("boom".into()))
        }
    }

    #[test]
    fn length_covers_horizon_plus_lag() {
        let origin = jan(2024);
        assert_eq!(extension_length(origin, origin, 12, 3), 15);
        // Candidate stopped 20 months before the target.
        assert_eq!(extension_length(origin - 20, origin, 12, 0), 32);
        assert_eq!(extension_length(origin - 20, origin, 12, 6), 26);
    }

    #[test]
    fn extends_trending_candidate_with_ets() {
        let history = TimeSeries::monthly(jan(2020), (0..48).map(|i| 50.0 + i as f64).collect());
        let ext = ExogenousExtender::default().extend("X", &history, 2, 14).unwrap();
        assert_eq!(ext.len(), 14);
        assert_eq!(ext.start, jan(2024));
        assert!(ext.model.starts_with("ETS"));
        assert!(ext.point[13] > ext.point[0]);
    }

    #[test]
    fn falls_back_to_carry_forward() {
        let history = TimeSeries::monthly(jan(2020), vec![1.0, 2.0, 3.0]);
        let ext = ExogenousExtender::default().extend("X", &history, 0, 4).unwrap();
        assert_eq!(ext.model, "carry_forward");
        assert_eq!(ext.point, vec![3.0; 4]);
        assert_eq!(ext.residual_std, 0.0);
    }

    #[test]
    fn exhausted_chain_is_an_error() {
        let history = TimeSeries::monthly(jan(2020), vec![1.0; 30]);
        let extender = ExogenousExtender::new(vec![Box::new(Failing)]);
        assert!(extender.extend("X", &history, 0, 3).is_err());
        assert!(ExogenousExtender::default()
            .extend("X", &TimeSeries::default(), 0, 3)
            .is_err());
    }
}
