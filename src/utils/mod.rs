//! Numerical utilities shared by the models and the pipeline.

pub mod bootstrap;
pub mod cross_validation;
pub mod metrics;
pub mod ols;
pub mod optimization;
pub mod serde_nan;
pub mod stats;

pub use bootstrap::{resample_blocks, resample_iid};
pub use cross_validation::{kfold, log_grid, Fold};
pub use metrics::{calculate_metrics, squared_correlation, AccuracyMetrics};
pub use ols::{weighted_ols, OLSResult};
pub use optimization::{nelder_mead, NelderMeadConfig, NelderMeadResult};
pub use stats::{correlation_p_value, mean, pearson, population_std, quantile_sorted};
