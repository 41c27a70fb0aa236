//! # Rolling Estimator
//!
//! $$
//! \hat\Sigma_t = \frac{1}{w-1}\sum_{s=t-w+1}^{t}(r_s-\bar r_t)(r_s-\bar r_t)^\top,\qquad
//! \bar r_t = \frac{1}{w}\sum_{s=t-w+1}^{t} r_s
//! $$
//!
//! Trailing-window covariance and mean-return estimates.

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray::s;
use ndarray_stats::CorrelationExt;

use super::data::ReturnMatrix;
use crate::error::FrontierError;
use crate::error::Result;

/// Covariance and mean returns valid at one date.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingEstimate {
  pub date: NaiveDate,
  /// `N x N` unbiased sample covariance.
  pub covariance: Array2<f64>,
  /// Arithmetic mean return per asset.
  pub mean: Array1<f64>,
}

#[derive(Clone, Copy, Debug)]
pub struct RollingEstimator {
  window: usize,
}

impl RollingEstimator {
  /// A window needs at least two rows for an unbiased covariance.
  pub fn new(window: usize) -> Result<Self> {
    if window < 2 {
      return Err(FrontierError::InvalidConfig(format!(
        "rolling window must be at least 2, got {window}"
      )));
    }
    Ok(Self { window })
  }

  pub fn window(&self) -> usize {
    self.window
  }

  /// Estimate over the `window` rows ending at `date` inclusive.
  pub fn estimate_at(&self, returns: &ReturnMatrix, date: NaiveDate) -> Result<RollingEstimate> {
    let row = returns.row_of(date).ok_or_else(|| FrontierError::Lookup {
      date,
      reason: "not a date of the aligned return series".into(),
    })?;
    self.estimate_at_row(returns, row)
  }

  /// Estimate over the `window` rows ending at row `row` inclusive.
  pub fn estimate_at_row(&self, returns: &ReturnMatrix, row: usize) -> Result<RollingEstimate> {
    let date = *returns.dates().get(row).ok_or_else(|| {
      FrontierError::Numerical(format!(
        "row {row} out of bounds for {} periods",
        returns.n_periods()
      ))
    })?;

    if row + 1 < self.window {
      return Err(FrontierError::Lookup {
        date,
        reason: format!(
          "only {} return rows up to this date, window needs {}",
          row + 1,
          self.window
        ),
      });
    }

    let start = row + 1 - self.window;
    let window = returns.values().slice_move(s![start..=row, ..]);

    // `cov` expects variables in rows and observations in columns
    let covariance = window
      .t()
      .cov(1.0)
      .map_err(|e| FrontierError::Numerical(e.to_string()))?;
    let mean = window
      .mean_axis(Axis(0))
      .ok_or_else(|| FrontierError::Numerical("empty rolling window".into()))?;

    Ok(RollingEstimate {
      date,
      covariance,
      mean,
    })
  }

  /// First date with a full window behind it.
  pub fn first_valid_date(&self, returns: &ReturnMatrix) -> Option<NaiveDate> {
    returns.dates().get(self.window - 1).copied()
  }

  /// Every valid estimate, in date order.
  pub fn estimates(&self, returns: &ReturnMatrix) -> Result<Vec<RollingEstimate>> {
    (self.window.saturating_sub(1)..returns.n_periods())
      .map(|row| self.estimate_at_row(returns, row))
      .collect()
  }
}
