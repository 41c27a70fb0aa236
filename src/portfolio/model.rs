//! # Portfolio Model
//!
//! $$
//! \mu_p = \mathbf{w}^\top\mu,\qquad \sigma_p = \sqrt{\mathbf{w}^\top \Sigma \mathbf{w}},\qquad
//! \mu_p^{\text{ann}} = (1+\mu_p)^{k}-1,\qquad \sigma_p^{\text{ann}} = \sigma_p\sqrt{k}
//! $$
//!
//! Risk and return of a weight vector under one rolling estimate.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use super::estimator::RollingEstimate;
use super::types::FrontierPoint;
use crate::error::FrontierError;
use crate::error::Result;

/// Trading days in the year convention used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 360.0;

/// Number of rolling windows in one year.
pub fn periods_per_year(window: usize, trading_days: f64) -> f64 {
  trading_days / window as f64
}

/// Compound a per-period return over `periods` periods.
pub fn annualize_return(period_return: f64, periods: f64) -> f64 {
  (1.0 + period_return).powf(periods) - 1.0
}

/// Scale a per-period standard deviation with the square root of time.
pub fn annualize_volatility(period_std: f64, periods: f64) -> f64 {
  period_std * periods.sqrt()
}

/// Inverse of [`annualize_return`]. Total losses map to `-1`.
pub fn deannualize_return(annual_return: f64, periods: f64) -> f64 {
  if annual_return <= -1.0 {
    -1.0
  } else {
    (1.0 + annual_return).powf(1.0 / periods) - 1.0
  }
}

/// Covariance matrix and mean returns resolved at a query date.
#[derive(Clone, Debug)]
pub struct PortfolioModel {
  covariance: Array2<f64>,
  mean: Array1<f64>,
}

impl PortfolioModel {
  pub fn new(covariance: Array2<f64>, mean: Array1<f64>) -> Result<Self> {
    let n = mean.len();
    if n == 0 || covariance.dim() != (n, n) {
      return Err(FrontierError::Numerical(format!(
        "covariance shape {:?} does not match {} mean returns",
        covariance.dim(),
        n
      )));
    }
    Ok(Self { covariance, mean })
  }

  pub fn from_estimate(estimate: &RollingEstimate) -> Result<Self> {
    Self::new(estimate.covariance.clone(), estimate.mean.clone())
  }

  pub fn n_assets(&self) -> usize {
    self.mean.len()
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  pub fn mean(&self) -> &Array1<f64> {
    &self.mean
  }

  /// `w . mean`
  pub fn expected_return(&self, weights: &[f64]) -> f64 {
    ArrayView1::from(weights).dot(&self.mean)
  }

  /// `w . Cov . w`, floored at zero.
  pub fn variance(&self, weights: &[f64]) -> f64 {
    let w = ArrayView1::from(weights);
    w.dot(&self.covariance.dot(&w)).max(0.0)
  }

  pub fn std_dev(&self, weights: &[f64]) -> f64 {
    self.variance(weights).sqrt()
  }

  /// Annualized (volatility, expected return) of a weight vector.
  pub fn annualized_point(&self, weights: &[f64], periods: f64) -> FrontierPoint {
    FrontierPoint {
      volatility: annualize_volatility(self.std_dev(weights), periods),
      expected_return: annualize_return(self.expected_return(weights), periods),
    }
  }
}
