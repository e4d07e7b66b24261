//! Forecasting models: candidate extension models and target base learners.

pub mod traits;

pub mod baseline;
pub mod exponential;
pub mod linear;
pub mod structural;

pub use linear::{LinearLearner, LinearModel, StandardScaler};
pub use structural::{StructuralLearner, StructuralModel};
pub use traits::{BaseLearner, ExtensionStrategy, FittedLearner, LearnerData, SeriesModel};
