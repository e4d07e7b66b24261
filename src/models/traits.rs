//! Strategy interfaces injected into the pipeline.
//!
//! Univariate models used to extend candidates implement [`SeriesModel`] and
//! are produced by an [`ExtensionStrategy`]. Base learners for the target
//! implement [`BaseLearner`] and produce a [`FittedLearner`]. All of them are
//! object-safe so the pipeline can hold `Box<dyn ...>` chains.

use crate::core::{Month, TimeSeries};
use crate::error::Result;
use crate::pipeline::features::{FeatureFrame, FutureDesign};
use std::fmt::Debug;

/// A fitted univariate model.
pub trait SeriesModel: Debug + Send + Sync {
    /// Model name as reported in run metadata.
    fn name(&self) -> &str;

    /// Point forecast for the next `horizon` steps.
    fn forecast(&self, horizon: usize) -> Result<Vec<f64>>;

    /// In-sample one-step fits, aligned with the fitted values.
    fn fitted_values(&self) -> &[f64];

    /// Standard deviation of in-sample residuals; 0 when the model has none.
    fn residual_std(&self) -> f64;
}

/// One link of a fallback chain: fits a model or reports why it cannot.
pub trait ExtensionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Fit on consecutive observed values (oldest first).
    fn fit(&self, values: &[f64]) -> Result<Box<dyn SeriesModel>>;
}

/// Training inputs shared by every base learner of a run.
#[derive(Debug, Clone, Copy)]
pub struct LearnerData<'a> {
    /// Lagged, extended exogenous columns.
    pub frame: &'a FeatureFrame,
    pub target: &'a TimeSeries,
    /// Last observed target month; nothing after it is read.
    pub origin: Month,
}

/// A base learner for the target series.
pub trait BaseLearner: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, data: &LearnerData<'_>) -> Result<Box<dyn FittedLearner>>;
}

/// A fitted base learner.
pub trait FittedLearner: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// In-sample fits by month.
    fn fitted_values(&self) -> &[(Month, f64)];

    /// Standard deviation of in-sample residuals.
    fn residual_std(&self) -> f64;

    /// Forecast the months of `future`, which start right after `origin`.
    ///
    /// Implementations must not read target values after `origin`.
    fn forecast(&self, target: &TimeSeries, origin: Month, future: &FutureDesign)
        -> Result<Vec<f64>>;

    /// Chosen regularization strength, for learners that have one.
    fn regularization(&self) -> Option<f64> {
        None
    }
}
