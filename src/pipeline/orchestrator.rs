//! End-to-end forecasting run for one target.
//!
//! Lag screening, candidate extension, base learners, stacking and bands run
//! in dependency order on a single thread per target; only the simulated
//! paths and [`ForecastPipeline::run_many`] fan out over rayon.

use crate::config::{PipelineConfig, UncertaintyMethod};
use crate::core::{ForecastRow, ForecastTable, Month, SeriesSource, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::linear::LinearLearner;
use crate::models::structural::StructuralLearner;
use crate::models::traits::{BaseLearner, FittedLearner, LearnerData};
use crate::pipeline::extender::{extension_length, ExogenousExtender, Extension};
use crate::pipeline::features::FeatureFrame;
use crate::pipeline::lag::screen_lags;
use crate::pipeline::report::{
    DroppedCandidate, ForecastReport, LearnerFailure, RecentSummary, RunMetadata,
    SelectedCandidate, StackSummary, UncertaintySummary,
};
use crate::pipeline::stacking::{fit_stack, StackFit};
use crate::pipeline::uncertainty::{block_bootstrap, ExogenousSimulation, NoiseSource, QuantileBand};
use crate::utils::metrics::{calculate_metrics, squared_correlation};
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Configured pipeline with its injected strategies.
pub struct ForecastPipeline {
    config: PipelineConfig,
    extender: ExogenousExtender,
    learners: Vec<Box<dyn BaseLearner>>,
}

impl std::fmt::Debug for ForecastPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastPipeline")
            .field("config", &self.config)
            .field("extender", &self.extender)
            .field(
                "learners",
                &self.learners.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Learners that were fit, with their point forecasts.
struct FittedSet {
    models: Vec<Box<dyn FittedLearner>>,
    points: Vec<Vec<f64>>,
    failures: Vec<LearnerFailure>,
}

impl ForecastPipeline {
    /// Pipeline with the default extender chain and the linear plus
    /// structural learners.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let extender = ExogenousExtender::with_seasonal_period(config.seasonal_period);
        let learners: Vec<Box<dyn BaseLearner>> = vec![
            Box::new(LinearLearner::from_config(&config)),
            Box::new(StructuralLearner::from_config(&config)),
        ];
        Ok(Self {
            config,
            extender,
            learners,
        })
    }

    pub fn with_extender(mut self, extender: ExogenousExtender) -> Self {
        self.extender = extender;
        self
    }

    pub fn with_learners(mut self, learners: Vec<Box<dyn BaseLearner>>) -> Self {
        self.learners = learners;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Forecast `target_id` using every other series of `source`.
    pub fn run_pool<S>(&self, source: &S, target_id: &str) -> Result<ForecastReport>
    where
        S: SeriesSource + ?Sized,
    {
        let candidates: Vec<String> = source
            .ids()
            .into_iter()
            .filter(|id| id != target_id)
            .collect();
        self.run(source, target_id, &candidates)
    }

    /// Forecast several targets in parallel against the same source.
    ///
    /// Results come back in input order; one target failing does not affect
    /// the others.
    pub fn run_many<S>(&self, source: &S, target_ids: &[String]) -> Vec<(String, Result<ForecastReport>)>
    where
        S: SeriesSource + ?Sized,
    {
        target_ids
            .par_iter()
            .map(|id| (id.clone(), self.run_pool(source, id)))
            .collect()
    }

    /// Forecast `target_id` from the listed candidates.
    ///
    /// Fails only when the target is empty or too short, or when no base
    /// learner can be fit; everything else degrades and is recorded in the
    /// report's metadata.
    pub fn run<S>(&self, source: &S, target_id: &str, candidate_ids: &[String]) -> Result<ForecastReport>
    where
        S: SeriesSource + ?Sized,
    {
        let config = &self.config;
        let target = source.history(target_id)?;
        let usable = target.observed_count();
        if usable == 0 {
            return Err(ForecastError::EmptyData);
        }
        let needed = config.min_target_months();
        if usable < needed {
            return Err(ForecastError::InsufficientData { needed, got: usable });
        }
        let origin = target.last_observed().ok_or(ForecastError::EmptyData)?;
        info!(target = target_id, %origin, candidates = candidate_ids.len(), "forecast run started");

        let mut dropped = Vec::new();
        let pool = self.load_candidates(source, target_id, candidate_ids, &mut dropped);

        let (lag_table, rejected) = screen_lags(&target, &pool, config.max_lag_months, config.min_obs);
        for (id, reason) in rejected {
            debug!(candidate = %id, %reason, "candidate has no usable lag");
            dropped.push(DroppedCandidate {
                id,
                reason: reason.to_string(),
            });
        }

        let mut extensions: Vec<Extension> = Vec::new();
        for sel in lag_table.iter().take(config.top_k_exog) {
            let Some((_, series)) = pool.iter().find(|(id, _)| *id == sel.id) else {
                continue;
            };
            let Some(last) = series.last_observed() else {
                continue;
            };
            let steps = extension_length(last, origin, config.horizon_months, sel.best_lag);
            match self.extender.extend(&sel.id, series, sel.best_lag, steps) {
                Ok(ext) => extensions.push(ext),
                Err(e) => {
                    warn!(candidate = %sel.id, error = %e, "candidate could not be extended");
                    dropped.push(DroppedCandidate {
                        id: sel.id.clone(),
                        reason: format!("extension failed: {e}"),
                    });
                }
            }
        }

        let noise: Vec<NoiseSource> = extensions
            .iter()
            .map(|ext| {
                NoiseSource::resolve(
                    ext.residual_std,
                    &ext.history.observed_span(),
                    config.seasonal_period,
                    config.noise_floor_ratio,
                )
            })
            .collect();
        let selected: Vec<SelectedCandidate> = extensions
            .iter()
            .zip(&noise)
            .map(|(ext, n)| SelectedCandidate {
                id: ext.id.clone(),
                lag: ext.lag,
                correlation: lag_table
                    .iter()
                    .find(|row| row.id == ext.id)
                    .map(|row| row.correlation)
                    .unwrap_or(f64::NAN),
                extension_model: ext.model.clone(),
                residual_std: ext.residual_std,
                noise: n.kind().to_string(),
            })
            .collect();

        let frame = FeatureFrame::from_extensions(&extensions)?;
        let fitted = self.fit_learners(&frame, &target, origin)?;
        let refs: Vec<&dyn FittedLearner> = fitted.models.iter().map(|m| m.as_ref()).collect();

        let stack = fit_stack(
            &refs,
            &target,
            config.calibration_window_months,
            config.recency_half_life_months,
        )?;
        let point = stack.model.apply(&fitted.points)?;

        let months: Vec<Month> = (1..=config.horizon_months as i32).map(|h| origin + h).collect();
        let (band, uncertainty) = if config.uncertainty_method == UncertaintyMethod::ExogenousSimulation
            && !extensions.is_empty()
        {
            let simulation = ExogenousSimulation {
                frame: &frame,
                extensions: &extensions,
                noise: &noise,
                learners: &refs,
                point_forecasts: &fitted.points,
                stack: &stack.model,
                target: &target,
                origin,
                horizon: config.horizon_months,
            };
            let band = simulation.band(config.mc_simulations, config.seed)?;
            let summary = UncertaintySummary {
                method: UncertaintyMethod::ExogenousSimulation,
                simulations: config.mc_simulations,
                bootstrap_noise: None,
            };
            (band, summary)
        } else {
            if config.uncertainty_method == UncertaintyMethod::ExogenousSimulation {
                warn!(target = target_id, "no exogenous features to simulate, bootstrapping residuals");
            }
            self.bootstrap_band(&target, &stack, &point, &months)?
        };

        let table = assemble_table(&target, &stack, &point, &band)?;
        let backtest_score = squared_correlation(stack.window_actual(), stack.window_calibrated());
        let backtest = calculate_metrics(stack.window_actual(), stack.window_calibrated()).ok();
        let most_recent = RecentSummary {
            month: origin,
            actual: target.get(origin).unwrap_or(f64::NAN),
            projected: stack.calibrated_at(origin),
        };

        info!(
            target = target_id,
            selected = selected.len(),
            dropped = dropped.len(),
            calibration = ?stack.model.mode,
            backtest_score,
            "forecast run finished"
        );

        Ok(ForecastReport {
            target: target_id.to_string(),
            table,
            metadata: RunMetadata {
                lag_table,
                selected,
                dropped,
                stack: StackSummary::from(&stack.model),
                linear_alpha: fitted.models.iter().find_map(|m| m.regularization()),
                learner_failures: fitted.failures,
                uncertainty,
                params: config.clone(),
                backtest_score,
                backtest,
                most_recent,
            },
        })
    }

    /// Fetch candidate histories; unknown or empty ids are recorded as dropped.
    fn load_candidates<S>(
        &self,
        source: &S,
        target_id: &str,
        candidate_ids: &[String],
        dropped: &mut Vec<DroppedCandidate>,
    ) -> Vec<(String, TimeSeries)>
    where
        S: SeriesSource + ?Sized,
    {
        let mut pool = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            if id == target_id || pool.iter().any(|(seen, _): &(String, TimeSeries)| seen == id) {
                continue;
            }
            match source.history(id) {
                Ok(series) if series.observed_count() > 0 => pool.push((id.clone(), series)),
                Ok(_) => dropped.push(DroppedCandidate {
                    id: id.clone(),
                    reason: "no observations".to_string(),
                }),
                Err(e) => {
                    warn!(candidate = %id, error = %e, "candidate history unavailable");
                    dropped.push(DroppedCandidate {
                        id: id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        pool
    }

    /// Fit every learner and forecast the future rows; failures are kept
    /// as metadata unless nothing survives.
    fn fit_learners(&self, frame: &FeatureFrame, target: &TimeSeries, origin: Month) -> Result<FittedSet> {
        let data = LearnerData {
            frame,
            target,
            origin,
        };
        let future = frame.future_design(origin, self.config.horizon_months)?;

        let mut set = FittedSet {
            models: Vec::new(),
            points: Vec::new(),
            failures: Vec::new(),
        };
        for learner in &self.learners {
            let outcome = learner.fit(&data).and_then(|model| {
                let point = model.forecast(target, origin, &future)?;
                if point.iter().any(|v| !v.is_finite()) {
                    return Err(ForecastError::ComputationError(
                        "forecast is not finite".to_string(),
                    ));
                }
                Ok((model, point))
            });
            match outcome {
                Ok((model, point)) => {
                    set.models.push(model);
                    set.points.push(point);
                }
                Err(e) => {
                    warn!(learner = learner.name(), error = %e, "base learner failed");
                    set.failures.push(LearnerFailure {
                        learner: learner.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if set.models.is_empty() {
            let reasons: Vec<String> = set
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.learner, f.reason))
                .collect();
            return Err(ForecastError::ComputationError(format!(
                "no base learner could be fit ({})",
                reasons.join("; ")
            )));
        }
        Ok(set)
    }

    fn bootstrap_band(
        &self,
        target: &TimeSeries,
        stack: &StackFit,
        point: &[f64],
        months: &[Month],
    ) -> Result<(QuantileBand, UncertaintySummary)> {
        let config = &self.config;
        let fallback = NoiseSource::resolve(
            0.0,
            &target.observed_span(),
            config.seasonal_period,
            config.noise_floor_ratio,
        );
        let (band, kind) = block_bootstrap(
            point,
            months,
            &stack.residuals(),
            &fallback,
            config.mc_block_length,
            config.mc_simulations,
            config.seed,
        )?;
        let summary = UncertaintySummary {
            method: UncertaintyMethod::BlockBootstrap,
            simulations: config.mc_simulations,
            bootstrap_noise: Some(kind.to_string()),
        };
        Ok((band, summary))
    }
}

/// History rows from the first to the last observed month, then one row per
/// forecast month.
fn assemble_table(
    target: &TimeSeries,
    stack: &StackFit,
    point: &[f64],
    band: &QuantileBand,
) -> Result<ForecastTable> {
    let (Some(first), Some(last)) = (target.first_observed(), target.last_observed()) else {
        return Err(ForecastError::EmptyData);
    };
    if band.len() != point.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: point.len(),
            got: band.len(),
        });
    }

    let mut rows: Vec<ForecastRow> = first
        .through(last)
        .map(|m| ForecastRow::history(m, target.get(m), stack.calibrated_at(m)))
        .collect();
    for (step, (&month, &value)) in band.months.iter().zip(point).enumerate() {
        let [p05, p10, p50, p90, p95] = band.at(step).ok_or(ForecastError::DimensionMismatch {
            expected: point.len(),
            got: step,
        })?;
        rows.push(ForecastRow {
            month,
            actual: None,
            fitted: Some(value),
            p05: Some(p05),
            p10: Some(p10),
            p50: Some(p50),
            p90: Some(p90),
            p95: Some(p95),
        });
    }
    Ok(ForecastTable::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SeriesPool;

    fn jan(year: i32) -> Month {
        Month::new(year, 1).unwrap()
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_horizon(6)
            .with_top_k(2)
            .with_max_lag(3)
            .with_ar_order(2)
            .with_simulations(20)
    }

    #[test]
    fn empty_target_is_fatal() {
        let pool = SeriesPool::new().with_series("T", TimeSeries::default());
        let pipeline = ForecastPipeline::new(small_config()).unwrap();
        assert_eq!(pipeline.run_pool(&pool, "T").unwrap_err(), ForecastError::EmptyData);
    }

    #[test]
    fn short_target_is_fatal() {
        let pool = SeriesPool::new().with_series("T", TimeSeries::monthly(jan(2020), vec![1.0; 20]));
        let pipeline = ForecastPipeline::new(small_config()).unwrap();
        assert_eq!(
            pipeline.run_pool(&pool, "T").unwrap_err(),
            ForecastError::InsufficientData { needed: 26, got: 20 }
        );
    }

    #[test]
    fn unknown_target_is_reported() {
        let pipeline = ForecastPipeline::new(small_config()).unwrap();
        assert!(matches!(
            pipeline.run_pool(&SeriesPool::new(), "NOPE"),
            Err(ForecastError::UnknownSeries(_))
        ));
    }

    #[test]
    fn unusable_candidates_are_dropped_with_reasons() {
        let values: Vec<f64> = (0..40).map(|i| 50.0 + (i as f64 * 0.4).sin() * 4.0 + i as f64 * 0.2).collect();
        let pool = SeriesPool::new()
            .with_series("T", TimeSeries::monthly(jan(2020), values))
            .with_series("EMPTY", TimeSeries::default())
            .with_series("SHORT", TimeSeries::monthly(jan(2020), vec![1.0, 2.0, 3.0]));
        let pipeline = ForecastPipeline::new(small_config()).unwrap();
        let candidates = vec!["EMPTY".to_string(), "SHORT".to_string(), "MISSING".to_string()];
        let report = pipeline.run(&pool, "T", &candidates).unwrap();

        let dropped: Vec<&str> = report.metadata.dropped.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(dropped, vec!["EMPTY", "MISSING", "SHORT"]);
        assert!(report.metadata.selected.is_empty());
        assert_eq!(report.table.len(), 46);
        assert_eq!(
            report.metadata.uncertainty.method,
            UncertaintyMethod::BlockBootstrap
        );
    }

    #[test]
    fn failing_learner_degrades_to_pass_through() {
        struct Broken;
        impl BaseLearner for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn fit(&self, _data: &LearnerData<'_>) -> Result<Box<dyn FittedLearner>> {
                Err(ForecastError::ComputationError("nope".into()))
            }
        }

        let values: Vec<f64> = (0..40).map(|i| 10.0 + (i as f64 * 0.7).cos()).collect();
        let pool = SeriesPool::new().with_series("T", TimeSeries::monthly(jan(2021), values));
        let config = small_config();
        let pipeline = ForecastPipeline::new(config.clone())
            .unwrap()
            .with_learners(vec![Box::new(LinearLearner::from_config(&config)), Box::new(Broken)]);
        let report = pipeline.run_pool(&pool, "T").unwrap();
        assert_eq!(report.metadata.learner_failures.len(), 1);
        assert_eq!(
            report.metadata.stack.calibration,
            crate::pipeline::stacking::CalibrationMode::PassThrough
        );

        let all_broken = ForecastPipeline::new(config)
            .unwrap()
            .with_learners(vec![Box::new(Broken)]);
        assert!(matches!(
            all_broken.run_pool(&pool, "T"),
            Err(ForecastError::ComputationError(_))
        ));
    }
}
