//! Monthly time series and the month calendar they live on.

use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A calendar month, stored as `year * 12 + (month - 1)`.
///
/// Serializes as the ISO date of the month start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "NaiveDate", from = "NaiveDate")]
pub struct Month(i32);

impl Month {
    /// Create a month from a year and a 1-based month number.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(ForecastError::TimestampError(format!(
                "month must be in 1..=12, got {month}"
            )));
        }
        Ok(Self(year * 12 + month as i32 - 1))
    }

    /// Month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.year() * 12 + date.month0() as i32)
    }

    pub fn year(self) -> i32 {
        self.0.div_euclid(12)
    }

    /// 1-based month number.
    pub fn month(self) -> u32 {
        self.0.rem_euclid(12) as u32 + 1
    }

    /// First day of the month.
    pub fn start_date(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year(), self.month(), 1).unwrap_or(NaiveDate::MIN)
    }

    /// The month `k` months later (earlier for negative `k`).
    pub fn offset(self, k: i32) -> Self {
        Self(self.0 + k)
    }

    /// Iterate `self..=end` month by month.
    pub fn through(self, end: Month) -> impl Iterator<Item = Month> {
        (self.0..=end.0).map(Month)
    }
}

impl From<NaiveDate> for Month {
    fn from(date: NaiveDate) -> Self {
        Month::from_date(date)
    }
}

impl From<Month> for NaiveDate {
    fn from(month: Month) -> Self {
        month.start_date()
    }
}

impl Add<i32> for Month {
    type Output = Month;

    fn add(self, rhs: i32) -> Month {
        self.offset(rhs)
    }
}

impl Sub<i32> for Month {
    type Output = Month;

    fn sub(self, rhs: i32) -> Month {
        self.offset(-rhs)
    }
}

impl Sub<Month> for Month {
    type Output = i32;

    /// Number of months from `rhs` to `self`.
    fn sub(self, rhs: Month) -> i32 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-01", self.year(), self.month())
    }
}

/// A monthly series: strictly increasing months, one value each.
///
/// Missing observations are stored as `NaN` (non-finite input is normalized
/// to `NaN`) and are never filled in; months absent from the series are
/// missing too.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    months: Vec<Month>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Create a series from parallel month and value vectors.
    pub fn new(months: Vec<Month>, values: Vec<f64>) -> Result<Self> {
        if months.len() != values.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: months.len(),
                got: values.len(),
            });
        }
        for pair in months.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ForecastError::TimestampError(
                    "months must be strictly increasing".to_string(),
                ));
            }
        }
        let values = values
            .into_iter()
            .map(|v| if v.is_finite() { v } else { f64::NAN })
            .collect();
        Ok(Self { months, values })
    }

    /// A gap-free series starting at `start`.
    pub fn monthly(start: Month, values: Vec<f64>) -> Self {
        let months = (0..values.len() as i32).map(|i| start + i).collect();
        let values = values
            .into_iter()
            .map(|v| if v.is_finite() { v } else { f64::NAN })
            .collect();
        Self { months, values }
    }

    /// Build from `(date, value-or-missing)` pairs on month starts.
    pub fn from_observations<I>(observations: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
    {
        let mut months = Vec::new();
        let mut values = Vec::new();
        for (date, value) in observations {
            if date.day() != 1 {
                return Err(ForecastError::TimestampError(format!(
                    "{date} is not a month-start date"
                )));
            }
            months.push(Month::from_date(date));
            values.push(value.unwrap_or(f64::NAN));
        }
        Self::new(months, values)
    }

    /// Number of stored months, observed or not.
    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn months(&self) -> &[Month] {
        &self.months
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Observed value at `month`, if any.
    pub fn get(&self, month: Month) -> Option<f64> {
        self.months
            .binary_search(&month)
            .ok()
            .map(|i| self.values[i])
            .filter(|v| v.is_finite())
    }

    /// Observed `(month, value)` pairs in order.
    pub fn observed(&self) -> impl Iterator<Item = (Month, f64)> + '_ {
        self.months
            .iter()
            .zip(self.values.iter())
            .filter(|(_, v)| v.is_finite())
            .map(|(m, v)| (*m, *v))
    }

    pub fn observed_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    pub fn first_observed(&self) -> Option<Month> {
        self.observed().next().map(|(m, _)| m)
    }

    pub fn last_observed(&self) -> Option<Month> {
        self.months
            .iter()
            .zip(self.values.iter())
            .rev()
            .find(|(_, v)| v.is_finite())
            .map(|(m, _)| *m)
    }

    /// Last observed value.
    pub fn last_value(&self) -> Option<f64> {
        self.values.iter().rev().copied().find(|v| v.is_finite())
    }

    /// Values over `start..=end`, `NaN` where not observed.
    pub fn dense(&self, start: Month, end: Month) -> Vec<f64> {
        start
            .through(end)
            .map(|m| self.get(m).unwrap_or(f64::NAN))
            .collect()
    }

    /// Observed values from the first to the last observation, with interior
    /// gaps kept as `NaN`.
    pub fn observed_span(&self) -> Vec<f64> {
        match (self.first_observed(), self.last_observed()) {
            (Some(first), Some(last)) => self.dense(first, last),
            _ => Vec::new(),
        }
    }

    /// Copy of the series restricted to months `<= end`.
    pub fn truncate_after(&self, end: Month) -> TimeSeries {
        let cut = self.months.partition_point(|m| *m <= end);
        TimeSeries {
            months: self.months[..cut].to_vec(),
            values: self.values[..cut].to_vec(),
        }
    }

    /// Rescale so the mean of `base_year`'s observations equals 100.
    pub fn rebased_to_year(&self, base_year: i32) -> Result<TimeSeries> {
        let base: Vec<f64> = self
            .observed()
            .filter(|(m, _)| m.year() == base_year)
            .map(|(_, v)| v)
            .collect();
        if base.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        let level = base.iter().sum::<f64>() / base.len() as f64;
        if level == 0.0 {
            return Err(ForecastError::ComputationError(format!(
                "base year {base_year} averages to zero"
            )));
        }
        Ok(TimeSeries {
            months: self.months.clone(),
            values: self.values.iter().map(|v| v / level * 100.0).collect(),
        })
    }
}
