//! # Frontier Engine
//!
//! $$
//! (\text{prices}, t, r^\*) \mapsto \big(\hat\Sigma_t, \hat\mu_t, \mathbf{w}_{\min}, \mathbf{w}_{r^\*}, \{\mathbf{w}_s\}_{s\le S}\big)
//! $$
//!
//! Query orchestration: range checks, return alignment, rolling estimate, optimization and sampling.

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use super::data::ReturnMatrix;
use super::estimator::RollingEstimate;
use super::estimator::RollingEstimator;
use super::model::PortfolioModel;
use super::model::TRADING_DAYS_PER_YEAR;
use super::model::periods_per_year;
use super::optimizers::constrained_minimum_variance;
use super::optimizers::global_minimum_variance;
use super::optimizers::sample_frontier;
use super::prices::DateRange;
use super::prices::PriceTable;
use super::prices::common_date_range;
use super::types::FrontierPoint;
use super::types::FrontierSample;
use super::types::OptimizationResult;
use crate::error::FrontierError;
use crate::error::Result;
use crate::optimize::Sqp;

/// Runtime configuration for [`FrontierEngine`].
#[derive(Clone, Debug)]
pub struct FrontierEngineConfig {
  /// Rolling window length in rows, also the minimum calendar overlap in days.
  pub window_size: usize,
  /// Random portfolios drawn per query.
  pub n_samples: usize,
  /// Trading-day convention for annualization.
  pub trading_days_per_year: f64,
  /// Iteration limit of each SQP solve.
  pub max_iters: u64,
  /// Objective tolerance of each SQP solve.
  pub tolerance: f64,
  /// Seed for the random portfolios; fresh entropy when `None`.
  pub seed: Option<u64>,
}

impl Default for FrontierEngineConfig {
  fn default() -> Self {
    Self {
      window_size: 10,
      n_samples: 2000,
      trading_days_per_year: TRADING_DAYS_PER_YEAR,
      max_iters: 100,
      tolerance: 1e-10,
      seed: None,
    }
  }
}

impl FrontierEngineConfig {
  pub fn validate(&self) -> Result<()> {
    if self.window_size < 2 {
      return Err(FrontierError::InvalidConfig(format!(
        "window size must be at least 2, got {}",
        self.window_size
      )));
    }
    if self.n_samples == 0 {
      return Err(FrontierError::InvalidConfig(
        "at least one random portfolio is required".into(),
      ));
    }
    if !(self.trading_days_per_year > 0.0 && self.trading_days_per_year.is_finite()) {
      return Err(FrontierError::InvalidConfig(format!(
        "trading days per year must be positive, got {}",
        self.trading_days_per_year
      )));
    }
    if self.max_iters == 0 {
      return Err(FrontierError::InvalidConfig("max_iters must be positive".into()));
    }
    if !(self.tolerance > 0.0) {
      return Err(FrontierError::InvalidConfig(format!(
        "tolerance must be positive, got {}",
        self.tolerance
      )));
    }
    Ok(())
  }

  /// Rolling windows per year.
  pub fn periods_per_year(&self) -> f64 {
    periods_per_year(self.window_size, self.trading_days_per_year)
  }

  fn solver(&self) -> Sqp {
    Sqp::new().with_ftol(self.tolerance)
  }
}

/// Everything one frontier query produces.
#[derive(Clone, Debug)]
pub struct FrontierReport {
  pub date: NaiveDate,
  pub tickers: Vec<String>,
  /// Annualized return floor of the constrained solve, `0` when none was given.
  pub required_return: f64,
  pub periods_per_year: f64,
  pub estimate: RollingEstimate,
  pub global_minimum: OptimizationResult,
  pub constrained_minimum: OptimizationResult,
  /// Annualized coordinates, only for converged solves.
  pub global_point: Option<FrontierPoint>,
  pub constrained_point: Option<FrontierPoint>,
  pub sample: FrontierSample,
}

/// Single entry point for frontier queries.
#[derive(Clone, Debug)]
pub struct FrontierEngine {
  config: FrontierEngineConfig,
}

impl FrontierEngine {
  pub fn new(config: FrontierEngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &FrontierEngineConfig {
    &self.config
  }

  /// Dates a query may ask for: the common range minus its first `window_size` days.
  pub fn query_range(&self, tables: &[PriceTable]) -> Result<DateRange> {
    self.ranges(tables).map(|(_, selectable)| selectable)
  }

  /// Common range of all tickers and the selectable part of it.
  fn ranges(&self, tables: &[PriceTable]) -> Result<(DateRange, DateRange)> {
    if tables.len() < 2 {
      return Err(FrontierError::InsufficientInput(tables.len()));
    }

    let window = self.config.window_size;
    let no_overlap = || FrontierError::NoCommonTimeframe {
      required_days: window as i64,
    };
    let common = common_date_range(tables).ok_or_else(no_overlap)?;
    if common.span_days() < window as i64 {
      return Err(no_overlap());
    }

    let selectable = common.skip_days(window as u64).ok_or_else(no_overlap)?;
    Ok((common, selectable))
  }

  /// Estimate, optimize and sample at `date`.
  pub fn query(
    &self,
    tables: &[PriceTable],
    date: NaiveDate,
    required_return: Option<f64>,
  ) -> Result<FrontierReport> {
    let (common, range) = self.ranges(tables)?;
    if !range.contains(date) {
      return Err(FrontierError::DateOutOfRange {
        date,
        start: range.start,
        end: range.end,
      });
    }

    let clipped: Vec<PriceTable> = tables.iter().filter_map(|t| t.clip(&common)).collect();
    let returns = ReturnMatrix::from_price_tables(&clipped)?;
    let estimator = RollingEstimator::new(self.config.window_size)?;
    let estimate = estimator.estimate_at(&returns, date)?;
    debug!(%date, n_assets = returns.n_assets(), "rolling estimate ready");

    self.optimize(returns.tickers().to_vec(), estimate, required_return)
  }

  /// Optimization and sampling on an existing estimate. A missing `required_return` means `0`.
  pub fn optimize(
    &self,
    tickers: Vec<String>,
    estimate: RollingEstimate,
    required_return: Option<f64>,
  ) -> Result<FrontierReport> {
    let model = PortfolioModel::from_estimate(&estimate)?;
    let periods = self.config.periods_per_year();

    let required_return = required_return.unwrap_or(0.0);

    let global_minimum = global_minimum_variance(&model, self.config.solver(), self.config.max_iters)?;
    let constrained_minimum = constrained_minimum_variance(
      &model,
      required_return,
      periods,
      self.config.solver(),
      self.config.max_iters,
    )?;

    let mut rng = match self.config.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_os_rng(),
    };
    let sample = sample_frontier(&model, self.config.n_samples, periods, &mut rng);

    let point = |res: &OptimizationResult| {
      res
        .converged
        .then(|| model.annualized_point(&res.weights, periods))
    };
    let global_point = point(&global_minimum);
    let constrained_point = point(&constrained_minimum);

    Ok(FrontierReport {
      date: estimate.date,
      tickers,
      required_return,
      periods_per_year: periods,
      estimate,
      global_minimum,
      constrained_minimum,
      global_point,
      constrained_point,
      sample,
    })
  }
}
