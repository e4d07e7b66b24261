//! Pipeline configuration.
//!
//! One `PipelineConfig` value is passed into every run; nothing in the crate
//! reads process-wide settings, so concurrent targets can use different
//! configurations.

use crate::error::{ForecastError, Result};
use crate::utils::log_grid;
use serde::{Deserialize, Serialize};

/// Penalty used by the linear base learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinearPenalty {
    /// L2 penalty, closed-form solve.
    #[default]
    Ridge,
    /// L1 penalty, coordinate descent.
    Lasso,
    /// Mix of L1 and L2; `l1_ratio = 1` is the lasso.
    ElasticNet { l1_ratio: f64 },
}

impl LinearPenalty {
    pub fn name(&self) -> &'static str {
        match self {
            LinearPenalty::Ridge => "ridge",
            LinearPenalty::Lasso => "lasso",
            LinearPenalty::ElasticNet { .. } => "elastic_net",
        }
    }

    /// Default strength grid: wide for ridge, narrower for L1 penalties.
    pub fn default_grid(&self) -> Vec<f64> {
        match self {
            LinearPenalty::Ridge => log_grid(-4.0, 3.0, 40),
            LinearPenalty::Lasso | LinearPenalty::ElasticNet { .. } => log_grid(-3.0, 1.0, 30),
        }
    }
}

/// How forecast bands are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyMethod {
    /// Simulate exogenous futures and push them through the fitted learners
    /// and stack.
    #[default]
    ExogenousSimulation,
    /// Perturb the calibrated point forecast with block-resampled stack
    /// residuals. Cheaper; ignores exogenous-path uncertainty.
    BlockBootstrap,
}

/// Every tunable of a forecasting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Months forecast beyond the target's last observation.
    pub horizon_months: usize,
    /// Number of lagged candidates kept as features.
    pub top_k_exog: usize,
    /// Largest lead searched by the lag selector.
    pub max_lag_months: usize,
    /// Target lags used by the linear learner.
    pub ar_order: usize,
    /// Aligned samples required for a lag to qualify.
    pub min_obs: usize,
    /// Recent window for stacking, calibration and the backtest score.
    pub calibration_window_months: usize,
    /// Half-life of the stack's recency weights; `None` weighs equally.
    pub recency_half_life_months: Option<usize>,
    /// Simulated paths for the bands.
    pub mc_simulations: usize,
    /// Block length of the bootstrap variant.
    pub mc_block_length: usize,
    pub uncertainty_method: UncertaintyMethod,
    pub linear_penalty: LinearPenalty,
    /// Candidate regularization strengths; empty uses the penalty's default.
    pub regularization_grid: Vec<f64>,
    pub cv_folds: usize,
    /// Seasonal period offered to the extender's seasonal ETS candidates.
    pub seasonal_period: usize,
    /// Noise floor as a fraction of a series' level when its own residuals
    /// and differences are degenerate.
    pub noise_floor_ratio: f64,
    /// Seed for every random draw in the run.
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon_months: 12,
            top_k_exog: 10,
            max_lag_months: 12,
            ar_order: 6,
            min_obs: 24,
            calibration_window_months: 18,
            recency_half_life_months: Some(12),
            mc_simulations: 200,
            mc_block_length: 6,
            uncertainty_method: UncertaintyMethod::ExogenousSimulation,
            linear_penalty: LinearPenalty::Ridge,
            regularization_grid: Vec::new(),
            cv_folds: 5,
            seasonal_period: 12,
            noise_floor_ratio: 0.005,
            seed: 42,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_horizon(mut self, months: usize) -> Self {
        self.horizon_months = months;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k_exog = k;
        self
    }

    pub fn with_max_lag(mut self, months: usize) -> Self {
        self.max_lag_months = months;
        self
    }

    pub fn with_ar_order(mut self, p: usize) -> Self {
        self.ar_order = p;
        self
    }

    pub fn with_min_obs(mut self, n: usize) -> Self {
        self.min_obs = n;
        self
    }

    pub fn with_calibration_window(mut self, months: usize) -> Self {
        self.calibration_window_months = months;
        self
    }

    pub fn with_recency_half_life(mut self, months: Option<usize>) -> Self {
        self.recency_half_life_months = months;
        self
    }

    pub fn with_simulations(mut self, paths: usize) -> Self {
        self.mc_simulations = paths;
        self
    }

    pub fn with_block_length(mut self, months: usize) -> Self {
        self.mc_block_length = months;
        self
    }

    pub fn with_uncertainty(mut self, method: UncertaintyMethod) -> Self {
        self.uncertainty_method = method;
        self
    }

    pub fn with_penalty(mut self, penalty: LinearPenalty) -> Self {
        self.linear_penalty = penalty;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The regularization grid actually searched.
    pub fn effective_grid(&self) -> Vec<f64> {
        if self.regularization_grid.is_empty() {
            self.linear_penalty.default_grid()
        } else {
            self.regularization_grid.clone()
        }
    }

    /// Usable target months a run needs.
    pub fn min_target_months(&self) -> usize {
        self.ar_order + 24
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> {
            Err(ForecastError::InvalidParameter(msg.to_string()))
        };
        if self.horizon_months == 0 {
            return invalid("horizon_months must be at least 1");
        }
        if self.mc_simulations == 0 {
            return invalid("mc_simulations must be at least 1");
        }
        if self.calibration_window_months == 0 {
            return invalid("calibration_window_months must be at least 1");
        }
        if self.min_obs < 3 {
            return invalid("min_obs must be at least 3");
        }
        if self.cv_folds < 2 {
            return invalid("cv_folds must be at least 2");
        }
        if self.recency_half_life_months == Some(0) {
            return invalid("recency_half_life_months must be positive when set");
        }
        if !(self.noise_floor_ratio.is_finite() && self.noise_floor_ratio > 0.0) {
            return invalid("noise_floor_ratio must be positive");
        }
        if let LinearPenalty::ElasticNet { l1_ratio } = self.linear_penalty {
            if !(l1_ratio > 0.0 && l1_ratio <= 1.0) {
                return invalid("elastic net l1_ratio must be in (0, 1]");
            }
        }
        if self
            .regularization_grid
            .iter()
            .any(|a| !(a.is_finite() && *a > 0.0))
        {
            return invalid("regularization_grid values must be positive");
        }
        Ok(())
    }
}
