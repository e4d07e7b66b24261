//! Core data structures: monthly series, the series store and the forecast
//! table.

mod forecast;
mod pool;
mod time_series;

pub use forecast::{ForecastRow, ForecastTable};
pub use pool::{SeriesPool, SeriesSource};
pub use time_series::{Month, TimeSeries};
