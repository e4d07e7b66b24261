//! Carry-forward model: repeats the last observed value.
//!
//! The last link of the extender's fallback chain. It cannot fail on a
//! non-empty series and deliberately reports no residual spread, which makes
//! the uncertainty engine fall back to the series' own differences.

use crate::error::{ForecastError, Result};
use crate::models::traits::{ExtensionStrategy, SeriesModel};

/// Last-value model.
#[derive(Debug, Clone)]
pub struct CarryForward {
    last_value: f64,
    fitted: Vec<f64>,
}

impl CarryForward {
    pub fn fit(values: &[f64]) -> Result<Self> {
        let last_value = values
            .iter()
            .rev()
            .copied()
            .find(|v| v.is_finite())
            .ok_or(ForecastError::EmptyData)?;

        // y_hat[t] = y[t-1]; the first fit is undefined.
        let mut fitted = Vec::with_capacity(values.len());
        fitted.push(f64::NAN);
        fitted.extend_from_slice(&values[..values.len() - 1]);

        Ok(Self { last_value, fitted })
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }
}

impl SeriesModel for CarryForward {
    fn name(&self) -> &str {
        "carry_forward"
    }

    fn forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        Ok(vec![self.last_value; horizon])
    }

    fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    fn residual_std(&self) -> f64 {
        0.0
    }
}

/// Strategy wrapper for [`CarryForward`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CarryForwardStrategy;

impl ExtensionStrategy for CarryForwardStrategy {
    fn name(&self) -> &str {
        "carry_forward"
    }

    fn fit(&self, values: &[f64]) -> Result<Box<dyn SeriesModel>> {
        Ok(Box::new(CarryForward::fit(values)?))
    }
}
