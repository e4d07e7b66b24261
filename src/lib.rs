//! # leadcast
//!
//! Monthly forecasting of a target series from leading indicators.
//!
//! Candidates are screened for their most predictive lead, extended past
//! their last observation, and fed as lagged features to a penalized
//! autoregressive model and a regression with exponential-smoothing errors.
//! The two are stacked on recent history, isotonically calibrated, and
//! wrapped in Monte Carlo quantile bands.

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod utils;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::config::{LinearPenalty, PipelineConfig, UncertaintyMethod};
    pub use crate::core::{ForecastRow, ForecastTable, Month, SeriesPool, SeriesSource, TimeSeries};
    pub use crate::error::{ForecastError, Result};
    pub use crate::models::{BaseLearner, ExtensionStrategy, FittedLearner, SeriesModel};
    pub use crate::pipeline::{ExogenousExtender, ForecastPipeline, ForecastReport};
}
