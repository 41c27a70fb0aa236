//! # Sequential Quadratic Programming
//!
//! $$
//! \min_{d}\ \tfrac12 d^\top \nabla^2 f(x_k)\, d + \nabla f(x_k)^\top d
//! \quad\text{s.t.}\quad c_i(x_k) + \nabla c_i(x_k)^\top d \;\{=,\ge\}\; 0,\quad
//! l \le x_k + d \le u
//! $$
//!
//! Line search on the exact penalty
//! $\phi_\mu(x) = f(x) + \mu\big(\sum_{eq}|c_i| + \sum_{ineq}\max(-c_i,0)\big)$.

use anyhow::anyhow;
use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Gradient;
use argmin::core::Hessian;
use argmin::core::IterState;
use argmin::core::KV;
use argmin::core::Problem;
use argmin::core::Solver;
use argmin::core::State;
use argmin::core::TerminationReason;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

use super::qp::QpSettings;
use super::qp::QpStatus;
use super::qp::QuadraticProgram;

/// State the solver runs on: parameter vector and scalar cost only.
pub type SqpState = IterState<Vec<f64>, (), (), (), (), f64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
  /// `c(x) = 0`
  Equality,
  /// `c(x) >= 0`
  Inequality,
}

/// Value and gradient of one constraint at a point.
#[derive(Clone, Debug)]
pub struct LinearizedConstraint {
  pub kind: ConstraintKind,
  pub value: f64,
  pub gradient: Vec<f64>,
}

impl LinearizedConstraint {
  pub fn equality(value: f64, gradient: Vec<f64>) -> Self {
    Self {
      kind: ConstraintKind::Equality,
      value,
      gradient,
    }
  }

  pub fn inequality(value: f64, gradient: Vec<f64>) -> Self {
    Self {
      kind: ConstraintKind::Inequality,
      value,
      gradient,
    }
  }

  /// Amount by which the constraint is violated.
  pub fn violation(&self) -> f64 {
    match self.kind {
      ConstraintKind::Equality => self.value.abs(),
      ConstraintKind::Inequality => (-self.value).max(0.0),
    }
  }
}

/// Box bounds and general constraints of a problem solved by [`Sqp`].
pub trait Constraints {
  /// `(lower, upper)` per variable; use infinities for free variables.
  fn bounds(&self) -> Vec<(f64, f64)>;

  /// Evaluate every constraint and its gradient at `x`.
  fn constraints(&self, x: &[f64]) -> Result<Vec<LinearizedConstraint>, Error>;
}

fn bound_violation(x: &[f64], bounds: &[(f64, f64)]) -> f64 {
  x.iter()
    .zip(bounds.iter())
    .fold(0.0, |acc, (&xi, &(lo, hi))| acc.max(lo - xi).max(xi - hi))
}

fn l1_violation(cons: &[LinearizedConstraint]) -> f64 {
  cons.iter().map(|c| c.violation()).sum()
}

fn max_violation(cons: &[LinearizedConstraint]) -> f64 {
  cons.iter().fold(0.0, |acc, c| acc.max(c.violation()))
}

/// SQP with exact Hessians and interior-point QP subproblems.
#[derive(Clone, Debug)]
pub struct Sqp {
  xtol: f64,
  ftol: f64,
  feasibility_tol: f64,
  min_step: f64,
  armijo: f64,
  qp_settings: QpSettings,
  penalty: f64,
}

impl Default for Sqp {
  fn default() -> Self {
    Self {
      xtol: 1e-9,
      ftol: 1e-10,
      feasibility_tol: 1e-9,
      min_step: 1e-10,
      armijo: 1e-4,
      qp_settings: QpSettings::default(),
      penalty: 0.0,
    }
  }
}

impl Sqp {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stop once a step moves no component by more than `xtol`.
  pub fn with_xtol(mut self, xtol: f64) -> Self {
    self.xtol = xtol;
    self
  }

  /// Stop once the objective changes by less than `ftol * (1 + |f|)`.
  pub fn with_ftol(mut self, ftol: f64) -> Self {
    self.ftol = ftol;
    self
  }

  pub fn with_feasibility_tol(mut self, tol: f64) -> Self {
    self.feasibility_tol = tol;
    self
  }

  pub fn with_min_step(mut self, min_step: f64) -> Self {
    self.min_step = min_step;
    self
  }

  pub fn with_qp_settings(mut self, settings: QpSettings) -> Self {
    self.qp_settings = settings;
    self
  }

  /// Linearize at `x` and assemble `min 1/2 d'Hd + g'd` over the shifted constraints.
  fn subproblem(
    x: &[f64],
    gradient: &[f64],
    hessian: &[Vec<f64>],
    bounds: &[(f64, f64)],
    cons: &[LinearizedConstraint],
  ) -> Result<QuadraticProgram, Error> {
    let n = x.len();
    if gradient.len() != n || hessian.len() != n || hessian.iter().any(|r| r.len() != n) {
      return Err(anyhow!("gradient or Hessian does not match {n} variables"));
    }
    if bounds.len() != n {
      return Err(anyhow!("{} bounds for {n} variables", bounds.len()));
    }
    if cons.iter().any(|c| c.gradient.len() != n) {
      return Err(anyhow!("constraint gradient does not match {n} variables"));
    }

    let p = DMatrix::from_fn(n, n, |i, j| 0.5 * (hessian[i][j] + hessian[j][i]));
    let q = DVector::from_column_slice(gradient);

    let m = cons.len() + n;
    let mut a = DMatrix::<f64>::zeros(m, n);
    let mut l = DVector::<f64>::zeros(m);
    let mut u = DVector::<f64>::zeros(m);
    for (i, c) in cons.iter().enumerate() {
      for j in 0..n {
        a[(i, j)] = c.gradient[j];
      }
      l[i] = -c.value;
      u[i] = match c.kind {
        ConstraintKind::Equality => -c.value,
        ConstraintKind::Inequality => f64::INFINITY,
      };
    }
    for (j, &(lo, hi)) in bounds.iter().enumerate() {
      let r = cons.len() + j;
      a[(r, j)] = 1.0;
      l[r] = lo - x[j];
      u[r] = hi - x[j];
    }

    QuadraticProgram::new(p, q, a, l, u)
  }
}

impl<O> Solver<O, SqpState> for Sqp
where
  O: CostFunction<Param = Vec<f64>, Output = f64>
    + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>
    + Hessian<Param = Vec<f64>, Hessian = Vec<Vec<f64>>>
    + Constraints,
{
  const NAME: &'static str = "SQP";

  fn init(
    &mut self,
    problem: &mut Problem<O>,
    state: SqpState,
  ) -> Result<(SqpState, Option<KV>), Error> {
    let x = state
      .get_param()
      .ok_or_else(|| anyhow!("SQP needs an initial parameter vector"))?
      .clone();
    let cost = problem.cost(&x)?;
    self.penalty = 0.0;
    Ok((state.param(x).cost(cost), None))
  }

  fn next_iter(
    &mut self,
    problem: &mut Problem<O>,
    mut state: SqpState,
  ) -> Result<(SqpState, Option<KV>), Error> {
    let x = state
      .take_param()
      .ok_or_else(|| anyhow!("SQP state lost its parameter vector"))?;

    let f = problem.cost(&x)?;
    let g = problem.gradient(&x)?;
    let h = problem.hessian(&x)?;
    let bounds = problem.problem("bounds_count", |p| Ok(p.bounds()))?;
    let cons = problem.problem("constraint_count", |p| p.constraints(&x))?;

    let qp = Self::subproblem(&x, &g, &h, &bounds, &cons)?;
    let sol = qp.solve(&self.qp_settings)?;
    let exit = match &sol.status {
      QpStatus::Solved => None,
      QpStatus::PrimalInfeasible => Some("linearized constraints are incompatible".to_string()),
      QpStatus::Unsolved(_) if qp.constraint_violation(&sol.x) <= 1e-6 => None,
      QpStatus::Unsolved(status) => Some(format!("QP subproblem failed: {status}")),
    };
    if let Some(reason) = exit {
      return Ok((
        state
          .param(x)
          .cost(f)
          .terminate_with(TerminationReason::SolverExit(reason)),
        None,
      ));
    }

    let d: Vec<f64> = sol.x.iter().copied().collect();
    let step_norm = d.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let violation = max_violation(&cons).max(bound_violation(&x, &bounds));

    if step_norm <= self.xtol && violation <= self.feasibility_tol {
      return Ok((
        state
          .param(x)
          .cost(f)
          .terminate_with(TerminationReason::SolverConverged),
        None,
      ));
    }

    let largest_multiplier = sol
      .y
      .iter()
      .take(cons.len())
      .fold(0.0f64, |acc, v| acc.max(v.abs()));
    self.penalty = self.penalty.max(1.5 * largest_multiplier);

    let merit = |fx: f64, cs: &[LinearizedConstraint]| fx + self.penalty * l1_violation(cs);
    let merit_0 = merit(f, &cons);
    let g_dot_d: f64 = g.iter().zip(d.iter()).map(|(a, b)| a * b).sum();
    let directional = g_dot_d - self.penalty * l1_violation(&cons);

    if directional >= 0.0 {
      let reason = if violation > self.feasibility_tol {
        TerminationReason::SolverExit("positive directional derivative for line search".into())
      } else {
        TerminationReason::SolverConverged
      };
      return Ok((state.param(x).cost(f).terminate_with(reason), None));
    }

    let slack = 1e-14 * merit_0.abs().max(1.0);
    let mut t = 1.0;
    let (x_new, f_new, cons_new) = loop {
      let candidate: Vec<f64> = x.iter().zip(d.iter()).map(|(xi, di)| xi + t * di).collect();
      let fc = problem.cost(&candidate)?;
      let cc = problem.problem("constraint_count", |p| p.constraints(&candidate))?;
      if merit(fc, &cc) <= merit_0 + self.armijo * t * directional + slack {
        break (candidate, fc, cc);
      }
      t *= 0.5;
      if t < self.min_step {
        return Ok((
          state.param(x).cost(f).terminate_with(TerminationReason::SolverExit(
            "line search failed to reduce the merit function".into(),
          )),
          None,
        ));
      }
    };

    debug!(
      iter = state.get_iter(),
      step = t,
      step_norm,
      cost = f_new,
      penalty = self.penalty,
      "SQP step accepted"
    );

    let feasible = max_violation(&cons_new).max(bound_violation(&x_new, &bounds)) <= self.feasibility_tol;
    let small_step = t * step_norm <= self.xtol;
    let flat = (f_new - f).abs() <= self.ftol * (1.0 + f.abs());

    let next = state.param(x_new).cost(f_new);
    if feasible && (small_step || flat) {
      Ok((next.terminate_with(TerminationReason::SolverConverged), None))
    } else {
      Ok((next, None))
    }
  }
}
