//! Automatic ETS model selection.
//!
//! Fits every additive specification the data can support and keeps the one
//! with the lowest AIC. Used as the first link of the exogenous extender's
//! fallback chain.

use crate::error::{ForecastError, Result};
use crate::models::exponential::ets::{ETSSpec, ETS};
use crate::models::traits::{ExtensionStrategy, SeriesModel};
use tracing::debug;

/// Configuration for AutoETS.
#[derive(Debug, Clone)]
pub struct AutoETSConfig {
    /// Seasonal period offered to seasonal specifications; 1 disables them.
    pub seasonal_period: usize,
    /// Full seasonal cycles required before seasonal specifications are tried.
    pub min_seasonal_cycles: usize,
    /// Include the damped-trend specification.
    pub allow_damped: bool,
}

impl Default for AutoETSConfig {
    fn default() -> Self {
        Self {
            seasonal_period: 12,
            min_seasonal_cycles: 3,
            allow_damped: true,
        }
    }
}

impl AutoETSConfig {
    pub fn non_seasonal() -> Self {
        Self {
            seasonal_period: 1,
            ..Default::default()
        }
    }

    pub fn with_period(period: usize) -> Self {
        Self {
            seasonal_period: period,
            ..Default::default()
        }
    }
}

/// AIC-driven selection over additive ETS specifications.
#[derive(Debug, Clone, Default)]
pub struct AutoETS {
    config: AutoETSConfig,
}

impl AutoETS {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AutoETSConfig) -> Self {
        Self { config }
    }

    pub fn with_period(period: usize) -> Self {
        Self::with_config(AutoETSConfig::with_period(period))
    }

    /// Specifications worth trying on a series of `len` values.
    pub fn candidates(&self, len: usize) -> Vec<ETSSpec> {
        let mut specs = vec![ETSSpec::ann(), ETSSpec::aan()];
        if self.config.allow_damped {
            specs.push(ETSSpec::aadn());
        }
        let period = self.config.seasonal_period;
        if period > 1 && len >= self.config.min_seasonal_cycles * period {
            specs.push(ETSSpec::ana());
            specs.push(ETSSpec::aaa());
        }
        specs
    }

    /// Fit every candidate and return the lowest-AIC model.
    pub fn select(&self, values: &[f64]) -> Result<ETS> {
        let mut best: Option<ETS> = None;
        let mut last_err = None;

        for spec in self.candidates(values.len()) {
            match ETS::fit(spec, self.config.seasonal_period, values) {
                Ok(model) => {
                    debug!(spec = %spec.short_name(), aic = model.aic(), "ETS candidate fitted");
                    let better = best
                        .as_ref()
                        .map(|b| model.aic() < b.aic())
                        .unwrap_or(true);
                    if model.aic().is_finite() && better {
                        best = Some(model);
                    }
                }
                Err(e) => {
                    debug!(spec = %spec.short_name(), error = %e, "ETS candidate rejected");
                    last_err = Some(e);
                }
            }
        }

        best.ok_or_else(|| {
            last_err.unwrap_or_else(|| {
                ForecastError::ComputationError("no valid ETS model could be fitted".to_string())
            })
        })
    }
}

impl ExtensionStrategy for AutoETS {
    fn name(&self) -> &str {
        "auto_ets"
    }

    fn fit(&self, values: &[f64]) -> Result<Box<dyn SeriesModel>> {
        Ok(Box::new(self.select(values)?))
    }
}
