//! Run output: the forecast table plus everything needed to audit it.

use crate::config::{PipelineConfig, UncertaintyMethod};
use crate::core::{ForecastTable, Month};
use crate::error::Result;
use crate::pipeline::lag::LagSelection;
use crate::pipeline::stacking::{CalibrationMode, StackModel};
use crate::utils::metrics::AccuracyMetrics;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// A candidate that made it into the feature set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedCandidate {
    pub id: String,
    pub lag: usize,
    #[serde(deserialize_with = "crate::utils::serde_nan::null_as_nan")]
    pub correlation: f64,
    /// Model that extended the candidate.
    pub extension_model: String,
    #[serde(deserialize_with = "crate::utils::serde_nan::null_as_nan")]
    pub residual_std: f64,
    /// Noise source used when simulating the candidate.
    pub noise: String,
}

/// A candidate excluded from the run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedCandidate {
    pub id: String,
    pub reason: String,
}

/// A base learner that could not be fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerFailure {
    pub learner: String,
    pub reason: String,
}

/// Stack coefficients and calibration state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSummary {
    pub learners: Vec<String>,
    pub intercept: f64,
    pub weights: Vec<f64>,
    pub calibration: CalibrationMode,
    /// Knots of the isotonic map; 0 when calibration was skipped.
    pub calibration_knots: usize,
}

impl From<&StackModel> for StackSummary {
    fn from(model: &StackModel) -> Self {
        Self {
            learners: model.learners.clone(),
            intercept: model.intercept,
            weights: model.weights.clone(),
            calibration: model.mode,
            calibration_knots: model.calibrator().map(|c| c.knots().0.len()).unwrap_or(0),
        }
    }
}

/// How the bands were produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintySummary {
    pub method: UncertaintyMethod,
    pub simulations: usize,
    /// Noise behind the bootstrap variant (`residual_blocks`, or the
    /// fallback when residuals were degenerate).
    pub bootstrap_noise: Option<String>,
}

/// Actual and calibrated fit at the last observed month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSummary {
    pub month: Month,
    #[serde(deserialize_with = "crate::utils::serde_nan::null_as_nan")]
    pub actual: f64,
    pub projected: Option<f64>,
}

/// Audit trail of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub lag_table: Vec<LagSelection>,
    pub selected: Vec<SelectedCandidate>,
    pub dropped: Vec<DroppedCandidate>,
    pub stack: StackSummary,
    /// Penalty strength chosen for the linear learner, if it was fit.
    pub linear_alpha: Option<f64>,
    pub learner_failures: Vec<LearnerFailure>,
    pub uncertainty: UncertaintySummary,
    pub params: PipelineConfig,
    /// Squared correlation of calibrated fit and actual over the recent
    /// window; serialized as `null` when undefined.
    #[serde(deserialize_with = "crate::utils::serde_nan::null_as_nan")]
    pub backtest_score: f64,
    /// Error of the calibrated fit over the same window.
    pub backtest: Option<AccuracyMetrics>,
    pub most_recent: RecentSummary,
}

/// Per-target result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub target: String,
    pub table: ForecastTable,
    pub metadata: RunMetadata,
}

impl ForecastReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// The table as CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        self.table.write_csv(writer)
    }

    pub fn write_forecast_csv<W: Write>(&self, writer: W) -> Result<()> {
        self.table.write_forecast_csv(writer)
    }
}
