//! Lead-lag screening of candidate indicators.

use crate::core::TimeSeries;
use crate::utils::stats::{correlation_p_value, pearson};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A candidate's most predictive lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagSelection {
    pub id: String,
    /// Months the candidate leads the target.
    pub best_lag: usize,
    #[serde(deserialize_with = "crate::utils::serde_nan::null_as_nan")]
    pub correlation: f64,
    #[serde(deserialize_with = "crate::utils::serde_nan::null_as_nan")]
    pub p_value: f64,
    /// Aligned samples behind `correlation`.
    pub n_obs: usize,
    /// 1-based position in the |r| ordering.
    pub rank: usize,
}

/// Target/candidate pairs where the candidate is read `lag` months earlier.
fn aligned_pairs(target: &TimeSeries, candidate: &TimeSeries, lag: usize) -> (Vec<f64>, Vec<f64>) {
    target
        .observed()
        .filter_map(|(m, y)| candidate.get(m - lag as i32).map(|x| (y, x)))
        .unzip()
}

/// Why a candidate has no usable lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagRejection {
    /// No lag reached `min_obs` aligned months; `most_aligned` is the best seen.
    TooFewAligned { most_aligned: usize, min_obs: usize },
    /// Lags with enough aligned months exist, but the correlation is
    /// undefined at each of them (constant target or candidate there).
    UndefinedCorrelation { aligned: usize },
}

impl fmt::Display for LagRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LagRejection::TooFewAligned { most_aligned, min_obs } => write!(
                f,
                "no lag with at least {min_obs} aligned months (most aligned: {most_aligned})"
            ),
            LagRejection::UndefinedCorrelation { aligned } => write!(
                f,
                "correlation undefined at every lag ({aligned} aligned months, zero variance)"
            ),
        }
    }
}

/// Best lag for one candidate, or the reason none qualifies.
///
/// Only a strictly larger |r| replaces the current best, so ties resolve to
/// the smallest lag.
pub fn screen_lag(
    id: &str,
    target: &TimeSeries,
    candidate: &TimeSeries,
    max_lag: usize,
    min_obs: usize,
) -> Result<LagSelection, LagRejection> {
    let mut best: Option<LagSelection> = None;
    let mut most_aligned = 0;
    let mut qualifying = 0;
    for lag in 0..=max_lag {
        let (y, x) = aligned_pairs(target, candidate, lag);
        most_aligned = most_aligned.max(y.len());
        if y.len() < min_obs {
            continue;
        }
        qualifying = qualifying.max(y.len());
        let r = pearson(&y, &x);
        if !r.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |b| r.abs() > b.correlation.abs()) {
            best = Some(LagSelection {
                id: id.to_string(),
                best_lag: lag,
                correlation: r,
                p_value: correlation_p_value(r, y.len()),
                n_obs: y.len(),
                rank: 0,
            });
        }
    }
    match best {
        Some(sel) => Ok(sel),
        None if qualifying > 0 => Err(LagRejection::UndefinedCorrelation { aligned: qualifying }),
        None => Err(LagRejection::TooFewAligned {
            most_aligned,
            min_obs,
        }),
    }
}

/// Best lag for one candidate, or `None` when no lag has `min_obs` aligned
/// samples with a defined correlation.
pub fn best_lag(
    id: &str,
    target: &TimeSeries,
    candidate: &TimeSeries,
    max_lag: usize,
    min_obs: usize,
) -> Option<LagSelection> {
    screen_lag(id, target, candidate, max_lag, min_obs).ok()
}

/// Screen every candidate: the survivors ranked by |r| descending (equal |r|
/// keeps input order), and the rejected ids with their reasons.
pub fn screen_lags(
    target: &TimeSeries,
    candidates: &[(String, TimeSeries)],
    max_lag: usize,
    min_obs: usize,
) -> (Vec<LagSelection>, Vec<(String, LagRejection)>) {
    let mut table = Vec::new();
    let mut rejected = Vec::new();
    for (id, series) in candidates {
        match screen_lag(id, target, series, max_lag, min_obs) {
            Ok(sel) => table.push(sel),
            Err(reason) => rejected.push((id.clone(), reason)),
        }
    }
    table.sort_by(|a, b| {
        b.correlation
            .abs()
            .partial_cmp(&a.correlation.abs())
            .unwrap_or(Ordering::Equal)
    });
    for (i, row) in table.iter_mut().enumerate() {
        row.rank = i + 1;
    }
    (table, rejected)
}

/// Ranked survivors of [`screen_lags`].
pub fn select_lags(
    target: &TimeSeries,
    candidates: &[(String, TimeSeries)],
    max_lag: usize,
    min_obs: usize,
) -> Vec<LagSelection> {
    screen_lags(target, candidates, max_lag, min_obs).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Month;
    use approx::assert_relative_eq;

    fn jan(year: i32) -> Month {
        Month::new(year, 1).unwrap()
    }

    fn wiggle(i: usize) -> f64 {
        ((i * 37) % 11) as f64 + (i as f64 * 0.3).sin()
    }

    #[test]
    fn finds_the_planted_lead() {
        let x: Vec<f64> = (0..60).map(wiggle).collect();
        let candidate = TimeSeries::monthly(jan(2019), x.clone());
        // y(m) = x(m - 3)
        let target = TimeSeries::monthly(jan(2019) + 3, x[..57].to_vec());
        let sel = best_lag("X", &target, &candidate, 6, 24).unwrap();
        assert_eq!(sel.best_lag, 3);
        assert_relative_eq!(sel.correlation, 1.0, epsilon = 1e-12);
        assert_eq!(sel.n_obs, 57);
        assert!(sel.p_value < 1e-10);
    }

    #[test]
    fn ties_go_to_the_smallest_lag() {
        let p = [1.0, 5.0, 2.0];
        let q = [0.0, 3.0, 1.0];
        let target = TimeSeries::monthly(jan(2020), (0..40).map(|i| p[i % 3]).collect());
        // Period-3 candidate starting 12 months earlier: lags 0 and 3 align
        // identical vectors.
        let candidate = TimeSeries::monthly(jan(2019), (0..64).map(|i| q[i % 3]).collect());
        let sel = best_lag("X", &target, &candidate, 4, 24).unwrap();
        assert_eq!(sel.best_lag, 0);
        assert_eq!(sel.n_obs, 40);
    }

    #[test]
    fn min_obs_is_enforced() {
        let target = TimeSeries::monthly(jan(2020), (0..30).map(wiggle).collect());
        let candidate = TimeSeries::monthly(jan(2020), (0..30).map(|i| wiggle(i + 1)).collect());
        for lag in 0..=12 {
            if let Some(sel) = best_lag("X", &target, &candidate, lag, 25) {
                assert!(sel.n_obs >= 25);
                assert!(sel.best_lag <= 5);
            }
        }
        assert!(best_lag("X", &target, &candidate, 12, 31).is_none());
    }

    #[test]
    fn constant_candidate_is_dropped() {
        let target = TimeSeries::monthly(jan(2020), (0..30).map(wiggle).collect());
        let candidate = TimeSeries::monthly(jan(2020), vec![5.0; 30]);
        assert!(best_lag("C", &target, &candidate, 3, 24).is_none());
        assert_eq!(
            screen_lag("C", &target, &candidate, 3, 24),
            Err(LagRejection::UndefinedCorrelation { aligned: 30 })
        );
    }

    #[test]
    fn rejections_name_the_cause() {
        let target = TimeSeries::monthly(jan(2020), vec![100.0; 40]);
        let trending = TimeSeries::monthly(jan(2020), (0..40).map(|i| i as f64).collect());
        let short = TimeSeries::monthly(jan(2020), (0..10).map(wiggle).collect());
        let (table, rejected) = screen_lags(
            &target,
            &[("TREND".to_string(), trending), ("SHORT".to_string(), short)],
            2,
            24,
        );
        assert!(table.is_empty());
        assert_eq!(
            rejected,
            vec![
                ("TREND".to_string(), LagRejection::UndefinedCorrelation { aligned: 40 }),
                (
                    "SHORT".to_string(),
                    LagRejection::TooFewAligned { most_aligned: 10, min_obs: 24 }
                ),
            ]
        );
        assert!(rejected[0].1.to_string().contains("correlation undefined"));
        assert!(rejected[1].1.to_string().contains("at least 24 aligned months"));
    }

    #[test]
    fn ranks_by_absolute_correlation() {
        let x: Vec<f64> = (0..48).map(wiggle).collect();
        let target = TimeSeries::monthly(jan(2020), x.clone());
        let strong_neg = TimeSeries::monthly(jan(2020), x.iter().map(|v| -v).collect());
        let weak = TimeSeries::monthly(
            jan(2020),
            x.iter().enumerate().map(|(i, v)| v + 3.0 * wiggle(i * 7 + 1)).collect(),
        );
        let table = select_lags(
            &target,
            &[("WEAK".to_string(), weak), ("NEG".to_string(), strong_neg)],
            0,
            24,
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].id, "NEG");
        assert_eq!(table[0].rank, 1);
        assert_relative_eq!(table[0].correlation, -1.0, epsilon = 1e-12);
        assert_eq!(table[1].rank, 2);
    }
}
