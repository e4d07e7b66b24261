//! Exponential smoothing models.
//!
//! - ETS (additive Error-Trend-Seasonal) state-space models
//! - AutoETS (selection by AIC)

mod auto_ets;
mod ets;

pub use auto_ets::{AutoETS, AutoETSConfig};
pub use ets::{ETSSpec, SeasonalType, TrendType, ETS};
