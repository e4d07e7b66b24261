//! Lagged-exogenous and autoregressive design matrices.
//!
//! A [`FeatureFrame`] holds one [`LaggedColumn`] per retained candidate:
//! the candidate's history followed by its extension, read `lag` months
//! later. Training rows combine the frame with target lags read by date;
//! future rows come from the frame alone.

use crate::core::{Month, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::pipeline::extender::Extension;

/// A candidate's history plus extension, shifted forward by its lag.
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedColumn {
    name: String,
    lag: usize,
    /// Month of `values[0]` before shifting.
    source_start: Month,
    /// Dense history (`NaN` for gaps) followed by the extension.
    values: Vec<f64>,
    /// Index of the first extension value.
    extension_at: usize,
}

impl LaggedColumn {
    /// Build the column for an extended candidate.
    pub fn from_extension(ext: &Extension) -> Result<Self> {
        let first = ext
            .history
            .first_observed()
            .ok_or(ForecastError::EmptyData)?;
        let mut values = ext.history.observed_span();
        let extension_at = values.len();
        if first + extension_at as i32 != ext.start {
            return Err(ForecastError::TimestampError(format!(
                "extension of {} does not start right after its history",
                ext.id
            )));
        }
        values.extend_from_slice(&ext.point);
        Ok(Self {
            name: format!("{}_lag{}", ext.id, ext.lag),
            lag: ext.lag,
            source_start: first,
            values,
            extension_at,
        })
    }

    /// Column with raw values; `values[0]` belongs to `source_start`.
    pub fn new(
        name: impl Into<String>,
        lag: usize,
        source_start: Month,
        values: Vec<f64>,
        extension_at: usize,
    ) -> Self {
        Self {
            name: name.into(),
            lag,
            source_start,
            extension_at: extension_at.min(values.len()),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lag(&self) -> usize {
        self.lag
    }

    pub fn extension_len(&self) -> usize {
        self.values.len() - self.extension_at
    }

    fn index_of(&self, month: Month) -> i64 {
        i64::from((month - self.lag as i32) - self.source_start)
    }

    /// Value feeding `month`, if present.
    pub fn get(&self, month: Month) -> Option<f64> {
        let idx = self.index_of(month);
        if idx < 0 {
            return None;
        }
        self.values
            .get(idx as usize)
            .copied()
            .filter(|v| v.is_finite())
    }

    /// Forward-filled, then back-filled, value at `month`.
    pub fn filled(&self, month: Month) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let idx = self.index_of(month);
        let last = self.values.len() as i64 - 1;
        if idx >= 0 {
            let upto = idx.min(last) as usize;
            if let Some(v) = self.values[..=upto].iter().rev().find(|v| v.is_finite()) {
                return Some(*v);
            }
        }
        let from = idx.clamp(0, last) as usize;
        self.values[from..].iter().copied().find(|v| v.is_finite())
    }

    /// Same column with the extension replaced by `points`.
    pub fn with_extension(&self, points: &[f64]) -> Result<Self> {
        if points.len() != self.extension_len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.extension_len(),
                got: points.len(),
            });
        }
        let mut values = self.values[..self.extension_at].to_vec();
        values.extend_from_slice(points);
        Ok(Self {
            values,
            ..self.clone()
        })
    }
}

/// Training design: dated rows with every feature and the target present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DesignMatrix {
    pub months: Vec<Month>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl DesignMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.columns.len()
    }
}

/// Exogenous rows for the months after the forecast origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FutureDesign {
    pub months: Vec<Month>,
    pub exog: Vec<Vec<f64>>,
}

impl FutureDesign {
    pub fn horizon(&self) -> usize {
        self.months.len()
    }
}

/// Lagged exogenous columns for one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureFrame {
    columns: Vec<LaggedColumn>,
}

impl FeatureFrame {
    pub fn new(columns: Vec<LaggedColumn>) -> Self {
        Self { columns }
    }

    pub fn from_extensions(extensions: &[Extension]) -> Result<Self> {
        let columns = extensions
            .iter()
            .map(LaggedColumn::from_extension)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[LaggedColumn] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Exogenous values for `month`; `None` if any column is missing there.
    pub fn exog_row(&self, month: Month) -> Option<Vec<f64>> {
        self.columns.iter().map(|c| c.get(month)).collect()
    }

    /// Rows for every observed target month up to `origin` where all
    /// exogenous columns and target lags `1..=ar_order` are present.
    pub fn design(&self, target: &TimeSeries, origin: Month, ar_order: usize) -> DesignMatrix {
        let mut columns = self.names();
        columns.extend((1..=ar_order).map(|l| format!("y_lag{l}")));

        let mut design = DesignMatrix {
            columns,
            ..Default::default()
        };
        for (month, y) in target.observed().take_while(|(m, _)| *m <= origin) {
            let Some(mut row) = self.exog_row(month) else {
                continue;
            };
            let lags: Option<Vec<f64>> = (1..=ar_order)
                .map(|l| target.get(month - l as i32))
                .collect();
            let Some(lags) = lags else {
                continue;
            };
            row.extend(lags);
            design.months.push(month);
            design.rows.push(row);
            design.target.push(y);
        }
        design
    }

    /// Exogenous rows for `origin + 1 ..= origin + horizon`, gaps filled
    /// forward then backward within each column.
    pub fn future_design(&self, origin: Month, horizon: usize) -> Result<FutureDesign> {
        let months: Vec<Month> = (1..=horizon as i32).map(|h| origin + h).collect();
        let exog = months
            .iter()
            .map(|&m| {
                self.columns
                    .iter()
                    .map(|c| {
                        c.filled(m).ok_or_else(|| {
                            ForecastError::ComputationError(format!(
                                "column {} has no values to fill {m}",
                                c.name
                            ))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FutureDesign { months, exog })
    }

    /// Same frame with each column's extension replaced, in column order.
    pub fn with_extensions(&self, extensions: &[Vec<f64>]) -> Result<Self> {
        if extensions.len() != self.columns.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.columns.len(),
                got: extensions.len(),
            });
        }
        let columns = self
            .columns
            .iter()
            .zip(extensions)
            .map(|(c, points)| c.with_extension(points))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }
}
