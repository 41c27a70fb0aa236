//! # Portfolio Types
//!
//! $$
//! \Delta^{N-1} = \{\mathbf{w}\in[0,1]^N : \textstyle\sum_i w_i = 1\}
//! $$
//!
//! Shared result containers for frontier queries.

use ndarray::Array1;
use ndarray::Array2;

use crate::error::FrontierError;
use crate::error::Result;

/// Tolerance on `sum(w) = 1` for a valid weight vector.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Check the long-only, fully invested constraints.
pub fn is_valid_weight_vector(weights: &[f64]) -> bool {
  !weights.is_empty()
    && weights.iter().all(|&w| (0.0..=1.0).contains(&w))
    && (weights.iter().sum::<f64>() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
}

/// Equal weight in every asset.
pub fn equal_weights(n: usize) -> Vec<f64> {
  vec![1.0 / n as f64; n]
}

/// Annualized risk/return coordinates of one portfolio.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrontierPoint {
  pub volatility: f64,
  pub expected_return: f64,
}

/// Outcome of one minimum-variance solve.
#[derive(Clone, Debug, Default)]
pub struct OptimizationResult {
  /// Final iterate; only meaningful when `converged`.
  pub weights: Vec<f64>,
  pub converged: bool,
  /// Per-period standard deviation at `weights`.
  pub objective: f64,
  pub iterations: u64,
  /// Solver termination message.
  pub message: String,
}

impl OptimizationResult {
  /// Turn a failed solve into a [`FrontierError::Convergence`].
  pub fn ensure_converged(&self, problem: &str) -> Result<&Self> {
    if self.converged {
      Ok(self)
    } else {
      Err(FrontierError::Convergence {
        problem: problem.to_string(),
        reason: self.message.clone(),
      })
    }
  }
}

/// Random portfolios drawn from the simplex with their annualized coordinates.
#[derive(Clone, Debug)]
pub struct FrontierSample {
  /// `n_samples x n_assets`, every row a valid weight vector.
  pub weights: Array2<f64>,
  pub volatility: Array1<f64>,
  pub expected_return: Array1<f64>,
}

impl FrontierSample {
  pub fn len(&self) -> usize {
    self.weights.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.nrows() == 0
  }

  pub fn points(&self) -> impl Iterator<Item = FrontierPoint> + '_ {
    self
      .volatility
      .iter()
      .zip(self.expected_return.iter())
      .map(|(&volatility, &expected_return)| FrontierPoint {
        volatility,
        expected_return,
      })
  }
}
