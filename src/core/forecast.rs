//! Forecast table: history, calibrated fit and quantile bands by month.

use crate::core::Month;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// One month of the outlook table.
///
/// History rows carry `actual` (and `fitted` where the stack produced an
/// in-sample value); forecast rows carry the calibrated point in `fitted`
/// plus the quantile band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub month: Month,
    pub actual: Option<f64>,
    pub fitted: Option<f64>,
    pub p05: Option<f64>,
    pub p10: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
}

impl ForecastRow {
    /// A history row without bands.
    pub fn history(month: Month, actual: Option<f64>, fitted: Option<f64>) -> Self {
        Self {
            month,
            actual,
            fitted,
            p05: None,
            p10: None,
            p50: None,
            p90: None,
            p95: None,
        }
    }

    /// Whether this row carries a quantile band.
    pub fn is_forecast(&self) -> bool {
        self.p50.is_some()
    }

    /// `p05 <= p10 <= p50 <= p90 <= p95`; rows without a band pass.
    pub fn quantiles_ordered(&self) -> bool {
        match (self.p05, self.p10, self.p50, self.p90, self.p95) {
            (Some(a), Some(b), Some(c), Some(d), Some(e)) => a <= b && b <= c && c <= d && d <= e,
            (None, None, None, None, None) => true,
            _ => false,
        }
    }
}

/// Per-target outlook: contiguous history months followed by forecast months.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastTable {
    rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn new(rows: Vec<ForecastRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn history_rows(&self) -> impl Iterator<Item = &ForecastRow> {
        self.rows.iter().filter(|r| !r.is_forecast())
    }

    pub fn forecast_rows(&self) -> impl Iterator<Item = &ForecastRow> {
        self.rows.iter().filter(|r| r.is_forecast())
    }

    pub fn row(&self, month: Month) -> Option<&ForecastRow> {
        self.rows.iter().find(|r| r.month == month)
    }

    /// Write the table as CSV with a header row; missing cells are empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()
            .map_err(|e| crate::error::ForecastError::Serialization(e.to_string()))?;
        Ok(())
    }

    /// Only the forecast rows, as CSV.
    pub fn write_forecast_csv<W: Write>(&self, writer: W) -> Result<()> {
        ForecastTable::new(self.forecast_rows().cloned().collect()).write_csv(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ForecastTable {
        let m = Month::new(2024, 11).unwrap();
        ForecastTable::new(vec![
            ForecastRow::history(m, Some(101.0), Some(100.5)),
            ForecastRow {
                month: m + 1,
                actual: None,
                fitted: Some(102.0),
                p05: Some(99.0),
                p10: Some(100.0),
                p50: Some(102.0),
                p90: Some(104.0),
                p95: Some(105.0),
            },
        ])
    }

    #[test]
    fn splits_history_and_forecast() {
        let table = sample();
        assert_eq!(table.len(), 2);
        assert_eq!(table.history_rows().count(), 1);
        assert_eq!(table.forecast_rows().count(), 1);
        assert!(table.rows().iter().all(|r| r.quantiles_ordered()));
    }

    #[test]
    fn crossed_quantiles_are_detected() {
        let mut row = sample().rows()[1].clone();
        row.p90 = Some(101.0);
        assert!(!row.quantiles_ordered());
    }

    #[test]
    fn csv_has_header_and_empty_missing_cells() {
        let mut buf = Vec::new();
        sample().write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "month,actual,fitted,p05,p10,p50,p90,p95");
        assert_eq!(lines[1], "2024-11-01,101.0,100.5,,,,,");
        assert_eq!(lines[2], "2024-12-01,,102.0,99.0,100.0,102.0,104.0,105.0");
    }

    #[test]
    fn forecast_csv_skips_history() {
        let mut buf = Vec::new();
        sample().write_forecast_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 2);
    }
}
