//! Simulation-based forecast bands.
//!
//! The default engine perturbs every candidate extension, pushes each
//! simulated future through the already-fitted learners and stack, and reads
//! empirical quantiles off the resulting paths. The bootstrap variant
//! perturbs the calibrated point forecast with resampled stack residuals.
//!
//! Every path owns a generator seeded from `(seed, path index)` and paths are
//! collected in index order, so results do not depend on thread scheduling.

use crate::core::{Month, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::FittedLearner;
use crate::pipeline::extender::Extension;
use crate::pipeline::features::FeatureFrame;
use crate::pipeline::stacking::StackModel;
use crate::utils::bootstrap::{resample_blocks, resample_iid};
use crate::utils::stats::{lagged_differences, population_std, quantile_sorted};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Quantile levels of the band.
pub const QUANTILES: [f64; 5] = [0.05, 0.10, 0.50, 0.90, 0.95];

/// Below this share of a series' scale a spread counts as zero.
const NEGLIGIBLE_SPREAD: f64 = 1e-9;

/// Smallest difference pool worth resampling.
const MIN_POOL: usize = 6;

/// Generator for one simulated path.
pub fn path_rng(seed: u64, path: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(0x9E37_79B9_7F4A_7C15u64.wrapping_mul(path as u64 + 1)))
}

fn negligible(spread: f64, scale: f64) -> bool {
    !spread.is_finite() || spread <= NEGLIGIBLE_SPREAD * scale.abs().max(1.0)
}

/// Where a series' simulation noise comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoiseSource {
    /// Gaussian with the extension model's residual spread.
    Gaussian { std: f64 },
    /// Resampled month-over-month and year-over-year differences.
    DifferencePool { pool: Vec<f64> },
    /// Gaussian with a spread derived from the series' level.
    Floor { std: f64 },
}

impl NoiseSource {
    /// Pick the noise for a series whose model reported `residual_std`.
    ///
    /// `span` is the series' dense history (gaps as `NaN`). A negligible
    /// residual spread falls back to the series' own differences, and a
    /// degenerate difference pool to `floor_ratio * max(|last|, 1)`.
    pub fn resolve(residual_std: f64, span: &[f64], seasonal_lag: usize, floor_ratio: f64) -> Self {
        let last = span
            .iter()
            .rev()
            .copied()
            .find(|v| v.is_finite())
            .unwrap_or(0.0);
        if !negligible(residual_std, last) {
            return NoiseSource::Gaussian { std: residual_std };
        }

        let mut pool = lagged_differences(span, 1);
        pool.extend(lagged_differences(span, seasonal_lag));
        if pool.len() >= MIN_POOL && !negligible(population_std(&pool), last) {
            return NoiseSource::DifferencePool { pool };
        }

        NoiseSource::Floor {
            std: floor_ratio * last.abs().max(1.0),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NoiseSource::Gaussian { .. } => "gaussian",
            NoiseSource::DifferencePool { .. } => "difference_pool",
            NoiseSource::Floor { .. } => "floor",
        }
    }

    /// Draw `len` noise values.
    pub fn draw<R: Rng + ?Sized>(&self, len: usize, rng: &mut R) -> Result<Vec<f64>> {
        match self {
            NoiseSource::Gaussian { std } | NoiseSource::Floor { std } => {
                let normal = Normal::new(0.0, *std)
                    .map_err(|e| ForecastError::InvalidParameter(e.to_string()))?;
                Ok((0..len).map(|_| normal.sample(rng)).collect())
            }
            NoiseSource::DifferencePool { pool } => Ok(resample_iid(pool, len, rng)),
        }
    }
}

/// Empirical 5/10/50/90/95 % quantiles per forecast month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileBand {
    pub months: Vec<Month>,
    pub p05: Vec<f64>,
    pub p10: Vec<f64>,
    pub p50: Vec<f64>,
    pub p90: Vec<f64>,
    pub p95: Vec<f64>,
}

impl QuantileBand {
    /// Aggregate simulated paths (`paths[path][step]`).
    pub fn from_paths(months: &[Month], paths: &[Vec<f64>]) -> Result<Self> {
        let mut band = QuantileBand {
            months: months.to_vec(),
            p05: Vec::with_capacity(months.len()),
            p10: Vec::with_capacity(months.len()),
            p50: Vec::with_capacity(months.len()),
            p90: Vec::with_capacity(months.len()),
            p95: Vec::with_capacity(months.len()),
        };
        for (step, month) in months.iter().enumerate() {
            let mut values: Vec<f64> = paths
                .iter()
                .filter_map(|p| p.get(step).copied())
                .filter(|v| v.is_finite())
                .collect();
            if values.is_empty() {
                return Err(ForecastError::ComputationError(format!(
                    "no finite simulated values for {month}"
                )));
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let q: Vec<f64> = QUANTILES.iter().map(|&q| quantile_sorted(&values, q)).collect();
            band.p05.push(q[0]);
            band.p10.push(q[1]);
            band.p50.push(q[2]);
            band.p90.push(q[3]);
            band.p95.push(q[4]);
        }
        Ok(band)
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    /// `[p05, p10, p50, p90, p95]` at `step`.
    pub fn at(&self, step: usize) -> Option<[f64; 5]> {
        Some([
            *self.p05.get(step)?,
            *self.p10.get(step)?,
            *self.p50.get(step)?,
            *self.p90.get(step)?,
            *self.p95.get(step)?,
        ])
    }
}

/// Everything a simulated path needs, borrowed from the fitted run.
pub struct ExogenousSimulation<'a> {
    pub frame: &'a FeatureFrame,
    /// Extensions in frame column order.
    pub extensions: &'a [Extension],
    /// Noise per extension, same order.
    pub noise: &'a [NoiseSource],
    pub learners: &'a [&'a dyn FittedLearner],
    /// Each learner's point forecast, used when it cannot forecast a path.
    pub point_forecasts: &'a [Vec<f64>],
    pub stack: &'a StackModel,
    pub target: &'a TimeSeries,
    pub origin: Month,
    pub horizon: usize,
}

impl ExogenousSimulation<'_> {
    /// Simulate `paths` calibrated forecast paths.
    pub fn simulate(&self, paths: usize, seed: u64) -> Result<Vec<Vec<f64>>> {
        if self.extensions.len() != self.noise.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.extensions.len(),
                got: self.noise.len(),
            });
        }
        (0..paths)
            .into_par_iter()
            .map(|index| self.path(seed, index))
            .collect()
    }

    pub fn band(&self, paths: usize, seed: u64) -> Result<QuantileBand> {
        let simulated = self.simulate(paths, seed)?;
        let months: Vec<Month> = (1..=self.horizon as i32).map(|h| self.origin + h).collect();
        debug!(paths, horizon = self.horizon, "exogenous simulation finished");
        QuantileBand::from_paths(&months, &simulated)
    }

    fn path(&self, seed: u64, index: usize) -> Result<Vec<f64>> {
        let mut rng = path_rng(seed, index);
        let mut simulated = Vec::with_capacity(self.extensions.len());
        for (ext, noise) in self.extensions.iter().zip(self.noise) {
            let draws = noise.draw(ext.len(), &mut rng)?;
            simulated.push(ext.point.iter().zip(draws).map(|(p, e)| p + e).collect());
        }
        let frame = self.frame.with_extensions(&simulated)?;
        let future = frame.future_design(self.origin, self.horizon)?;

        let outputs: Vec<Vec<f64>> = self
            .learners
            .iter()
            .zip(self.point_forecasts)
            .map(|(learner, point)| {
                learner
                    .forecast(self.target, self.origin, &future)
                    .unwrap_or_else(|e| {
                        debug!(learner = learner.name(), path = index, error = %e, "path forecast failed, using point forecast");
                        point.clone()
                    })
            })
            .collect();
        self.stack.apply(&outputs)
    }
}

/// Bands from the calibrated point forecast plus block-resampled residuals.
///
/// When the residual pool has no spread the target's own noise source
/// (differences, then floor) is used instead. Returns the band and the name
/// of the noise actually used.
pub fn block_bootstrap(
    point: &[f64],
    months: &[Month],
    residuals: &[f64],
    fallback: &NoiseSource,
    block_len: usize,
    paths: usize,
    seed: u64,
) -> Result<(QuantileBand, &'static str)> {
    let scale = point.last().copied().unwrap_or(0.0);
    let usable = residuals.len() >= 2 && !negligible(population_std(residuals), scale);
    if !usable {
        warn!(kind = fallback.kind(), "stack residuals degenerate, bootstrapping from fallback noise");
    }

    let simulated: Vec<Vec<f64>> = (0..paths)
        .into_par_iter()
        .map(|index| -> Result<Vec<f64>> {
            let mut rng = path_rng(seed, index);
            let noise = if usable {
                resample_blocks(residuals, point.len(), block_len, &mut rng)
            } else {
                fallback.draw(point.len(), &mut rng)?
            };
            Ok(point.iter().zip(noise).map(|(p, e)| p + e).collect())
        })
        .collect::<Result<Vec<_>>>()?;

    let kind = if usable { "residual_blocks" } else { fallback.kind() };
    Ok((QuantileBand::from_paths(months, &simulated)?, kind))
}
