//! Read-only store of series histories.

use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use std::collections::BTreeMap;

/// Synchronous access to series histories.
///
/// `history` fails for ids the source has never heard of and returns an
/// empty series when the id exists but has no data. Implementations are
/// shared read-only across concurrent target runs.
pub trait SeriesSource: Sync {
    /// Full history for `id`.
    fn history(&self, id: &str) -> Result<TimeSeries>;

    /// Every id the source can serve, in a stable order.
    fn ids(&self) -> Vec<String>;
}

/// In-memory series store keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SeriesPool {
    series: BTreeMap<String, TimeSeries>,
}

impl SeriesPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a series.
    pub fn insert(&mut self, id: impl Into<String>, series: TimeSeries) {
        self.series.insert(id.into(), series);
    }

    /// Builder-style [`SeriesPool::insert`].
    pub fn with_series(mut self, id: impl Into<String>, series: TimeSeries) -> Self {
        self.insert(id, series);
        self
    }

    pub fn get(&self, id: &str) -> Option<&TimeSeries> {
        self.series.get(id)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Every id except `target`, the default candidate pool for a target.
    pub fn candidates_for(&self, target: &str) -> Vec<String> {
        self.series
            .keys()
            .filter(|id| id.as_str() != target)
            .cloned()
            .collect()
    }
}

impl SeriesSource for SeriesPool {
    fn history(&self, id: &str) -> Result<TimeSeries> {
        self.series
            .get(id)
            .cloned()
            .ok_or_else(|| ForecastError::UnknownSeries(id.to_string()))
    }

    fn ids(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }
}
