//! Forecasting pipeline: lag screening, candidate extension, feature
//! assembly, stacking, uncertainty and reporting.

pub mod extender;
pub mod features;
pub mod lag;
pub mod orchestrator;
pub mod report;
pub mod stacking;
pub mod uncertainty;

pub use extender::{extension_length, ExogenousExtender, Extension};
pub use features::{DesignMatrix, FeatureFrame, FutureDesign, LaggedColumn};
pub use lag::{best_lag, screen_lag, screen_lags, select_lags, LagRejection, LagSelection};
pub use orchestrator::ForecastPipeline;
pub use report::{
    DroppedCandidate, ForecastReport, LearnerFailure, RecentSummary, RunMetadata,
    SelectedCandidate, StackSummary, UncertaintySummary,
};
pub use stacking::{fit_stack, CalibrationMode, IsotonicCalibrator, StackFit, StackModel};
pub use uncertainty::{block_bootstrap, ExogenousSimulation, NoiseSource, QuantileBand, QUANTILES};
