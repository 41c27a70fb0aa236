//! # Frontier Optimizers
//!
//! $$
//! \min_{\mathbf{w}\in\Delta^{N-1}} \mathbf{w}^\top\Sigma\mathbf{w}
//! \quad\text{s.t.}\quad (1+\mathbf{w}^\top\mu)^{k}-1 \ge r^\*
//! $$
//!
//! Minimum-variance portfolios on the long-only simplex, plus random portfolios for the cloud.

use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::Hessian;
use argmin::core::State;
use argmin::core::TerminationReason;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use rand::Rng;
use rand_distr::Distribution;
use rand_distr::Exp1;
use tracing::debug;

use super::model::PortfolioModel;
use super::model::deannualize_return;
use super::types::FrontierSample;
use super::types::OptimizationResult;
use super::types::equal_weights;
use crate::optimize::Constraints;
use crate::optimize::LinearizedConstraint;
use crate::optimize::Sqp;

/// Variance of a long-only, fully invested portfolio with an optional per-period return floor.
#[derive(Clone, Debug)]
pub struct MinimumVariance {
  covariance: Array2<f64>,
  mean: Array1<f64>,
  return_floor: Option<f64>,
}

impl MinimumVariance {
  pub fn new(model: &PortfolioModel) -> Self {
    Self {
      covariance: model.covariance().clone(),
      mean: model.mean().clone(),
      return_floor: None,
    }
  }

  /// Require `w . mean >= floor` per period.
  pub fn with_return_floor(mut self, floor: f64) -> Self {
    self.return_floor = Some(floor);
    self
  }
}

impl CostFunction for MinimumVariance {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, Error> {
    let w = ArrayView1::from(w);
    Ok(w.dot(&self.covariance.dot(&w)))
  }
}

impl Gradient for MinimumVariance {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, Error> {
    let w = ArrayView1::from(w);
    Ok((self.covariance.dot(&w) * 2.0).to_vec())
  }
}

impl Hessian for MinimumVariance {
  type Param = Vec<f64>;
  type Hessian = Vec<Vec<f64>>;

  fn hessian(&self, _w: &Self::Param) -> Result<Self::Hessian, Error> {
    Ok(
      self
        .covariance
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|c| 2.0 * c).collect())
        .collect(),
    )
  }
}

impl Constraints for MinimumVariance {
  fn bounds(&self) -> Vec<(f64, f64)> {
    vec![(0.0, 1.0); self.mean.len()]
  }

  fn constraints(&self, w: &[f64]) -> Result<Vec<LinearizedConstraint>, Error> {
    let n = self.mean.len();
    let mut out = vec![LinearizedConstraint::equality(
      w.iter().sum::<f64>() - 1.0,
      vec![1.0; n],
    )];
    if let Some(floor) = self.return_floor {
      out.push(LinearizedConstraint::inequality(
        ArrayView1::from(w).dot(&self.mean) - floor,
        self.mean.to_vec(),
      ));
    }
    Ok(out)
  }
}

/// Starting point of both solves.
pub fn initial_guess(n_assets: usize) -> Vec<f64> {
  equal_weights(n_assets)
}

/// Clamp into `[0, 1]` and rescale to sum to one.
pub fn clean_weights(weights: &[f64]) -> Vec<f64> {
  let clamped: Vec<f64> = weights.iter().map(|w| w.clamp(0.0, 1.0)).collect();
  let total: f64 = clamped.iter().sum();
  if total <= 0.0 || !total.is_finite() {
    return equal_weights(weights.len());
  }
  clamped.iter().map(|w| w / total).collect()
}

fn solve(
  model: &PortfolioModel,
  problem: MinimumVariance,
  solver: Sqp,
  max_iters: u64,
) -> crate::error::Result<OptimizationResult> {
  let x0 = initial_guess(model.n_assets());
  let res = Executor::new(problem, solver)
    .configure(|state| state.param(x0.clone()).max_iters(max_iters))
    .run()?;

  let state = res.state();
  let (converged, message) = match state.get_termination_reason() {
    Some(TerminationReason::SolverConverged) => {
      (true, "optimization terminated successfully".to_string())
    }
    Some(TerminationReason::SolverExit(reason)) => (false, reason.clone()),
    Some(TerminationReason::MaxItersReached) => (false, "iteration limit reached".to_string()),
    Some(other) => (false, format!("{other:?}")),
    None => (false, "solver did not terminate".to_string()),
  };

  let raw = state.get_param().cloned().unwrap_or(x0);
  let weights = if converged { clean_weights(&raw) } else { raw };
  let objective = model.std_dev(&weights);

  debug!(
    converged,
    iterations = state.get_iter(),
    objective,
    message = message.as_str(),
    "minimum-variance solve finished"
  );

  Ok(OptimizationResult {
    weights,
    converged,
    objective,
    iterations: state.get_iter(),
    message,
  })
}

/// Least risky fully invested long-only portfolio.
pub fn global_minimum_variance(
  model: &PortfolioModel,
  solver: Sqp,
  max_iters: u64,
) -> crate::error::Result<OptimizationResult> {
  solve(model, MinimumVariance::new(model), solver, max_iters)
}

/// Least risky portfolio whose annualized expected return is at least `required_return`.
pub fn constrained_minimum_variance(
  model: &PortfolioModel,
  required_return: f64,
  periods_per_year: f64,
  solver: Sqp,
  max_iters: u64,
) -> crate::error::Result<OptimizationResult> {
  // annualization is increasing, so the floor can be applied per period
  let floor = deannualize_return(required_return, periods_per_year);
  let problem = MinimumVariance::new(model).with_return_floor(floor);
  solve(model, problem, solver, max_iters)
}

/// Uniform draw from the simplex, i.e. Dirichlet(1, ..., 1).
pub fn random_simplex_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
  let raw: Vec<f64> = (0..n).map(|_| Exp1.sample(rng)).collect();
  let total: f64 = raw.iter().sum();
  if total <= 0.0 {
    return equal_weights(n);
  }
  raw.iter().map(|x| x / total).collect()
}

/// `n_samples` random portfolios with their annualized risk and return.
pub fn sample_frontier<R: Rng + ?Sized>(
  model: &PortfolioModel,
  n_samples: usize,
  periods_per_year: f64,
  rng: &mut R,
) -> FrontierSample {
  let n = model.n_assets();
  let mut weights = Array2::<f64>::zeros((n_samples, n));
  let mut volatility = Array1::<f64>::zeros(n_samples);
  let mut expected_return = Array1::<f64>::zeros(n_samples);

  for i in 0..n_samples {
    let w = random_simplex_weights(n, rng);
    let point = model.annualized_point(&w, periods_per_year);
    weights.row_mut(i).assign(&ArrayView1::from(&w));
    volatility[i] = point.volatility;
    expected_return[i] = point.expected_return;
  }

  FrontierSample {
    weights,
    volatility,
    expected_return,
  }
}
