//! # Quadratic Programming
//!
//! $$
//! \min_{x}\ \tfrac12 x^\top P x + q^\top x \quad\text{s.t.}\quad l \le Ax \le u
//! $$
//!
//! Dense convex QPs handed to the Clarabel interior-point solver.
//! Rows with `l = u` go into a zero cone, every finite side of the other rows into a
//! nonnegative cone.

use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::NonnegativeConeT;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT;
use clarabel::solver::ZeroConeT;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::trace;

/// Interior-point tolerances.
#[derive(Clone, Debug)]
pub struct QpSettings {
  pub max_iters: u32,
  pub tol_gap_abs: f64,
  pub tol_gap_rel: f64,
  pub tol_feas: f64,
  /// Tolerance of the primal infeasibility certificate.
  pub tol_infeas: f64,
}

impl Default for QpSettings {
  fn default() -> Self {
    Self {
      max_iters: 200,
      tol_gap_abs: 1e-11,
      tol_gap_rel: 1e-11,
      tol_feas: 1e-11,
      tol_infeas: 1e-8,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QpStatus {
  Solved,
  PrimalInfeasible,
  /// Any other Clarabel status, by name.
  Unsolved(String),
}

#[derive(Clone, Debug)]
pub struct QpSolution {
  pub x: DVector<f64>,
  /// Constraint multipliers: negative on active lower bounds, positive on active upper bounds.
  pub y: DVector<f64>,
  pub status: QpStatus,
  pub iterations: u32,
}

/// `min 1/2 x'Px + q'x` subject to `l <= Ax <= u`.
#[derive(Clone, Debug)]
pub struct QuadraticProgram {
  p: DMatrix<f64>,
  q: DVector<f64>,
  a: DMatrix<f64>,
  l: DVector<f64>,
  u: DVector<f64>,
}

/// Which side of constraint `i` a cone row encodes.
#[derive(Clone, Copy, Debug)]
enum Side {
  Equal(usize),
  Upper(usize),
  Lower(usize),
}

/// Upper triangle of a dense symmetric matrix in compressed columns.
fn upper_triangle_csc(p: &DMatrix<f64>) -> CscMatrix<f64> {
  let n = p.ncols();
  let mut colptr = vec![0];
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();
  for j in 0..n {
    for i in 0..=j {
      let v = p[(i, j)];
      if v != 0.0 {
        rowval.push(i);
        nzval.push(v);
      }
    }
    colptr.push(nzval.len());
  }
  CscMatrix::new(n, n, colptr, rowval, nzval)
}

fn rows_csc(rows: &[(Vec<f64>, f64)], n: usize) -> CscMatrix<f64> {
  let mut colptr = vec![0];
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();
  for j in 0..n {
    for (i, (row, _)) in rows.iter().enumerate() {
      if row[j] != 0.0 {
        rowval.push(i);
        nzval.push(row[j]);
      }
    }
    colptr.push(nzval.len());
  }
  CscMatrix::new(rows.len(), n, colptr, rowval, nzval)
}

impl QuadraticProgram {
  /// `P` must be symmetric positive semi-definite.
  pub fn new(
    p: DMatrix<f64>,
    q: DVector<f64>,
    a: DMatrix<f64>,
    l: DVector<f64>,
    u: DVector<f64>,
  ) -> Result<Self> {
    let n = q.len();
    if p.shape() != (n, n) {
      bail!("P is {:?}, expected {n}x{n}", p.shape());
    }
    if a.ncols() != n || a.nrows() != l.len() || l.len() != u.len() {
      bail!(
        "A is {:?} with {} lower and {} upper bounds for {n} variables",
        a.shape(),
        l.len(),
        u.len()
      );
    }
    if p.iter().chain(q.iter()).chain(a.iter()).any(|v| !v.is_finite()) {
      bail!("QP data contains non-finite values");
    }
    for (i, (lo, hi)) in l.iter().zip(u.iter()).enumerate() {
      if lo.is_nan() || hi.is_nan() || lo > hi || *lo == f64::INFINITY || *hi == f64::NEG_INFINITY {
        bail!("invalid bounds [{lo}, {hi}] on constraint {i}");
      }
    }

    Ok(Self { p, q, a, l, u })
  }

  pub fn n_vars(&self) -> usize {
    self.q.len()
  }

  pub fn n_constraints(&self) -> usize {
    self.l.len()
  }

  /// Largest bound violation of `Ax` at `x`.
  pub fn constraint_violation(&self, x: &DVector<f64>) -> f64 {
    let ax = &self.a * x;
    (0..ax.len()).fold(0.0, |acc, i| {
      acc.max(self.l[i] - ax[i]).max(ax[i] - self.u[i])
    })
  }

  /// Objective value at `x`.
  pub fn objective(&self, x: &DVector<f64>) -> f64 {
    0.5 * x.dot(&(&self.p * x)) + self.q.dot(x)
  }

  /// Rows of `Ax + s = b` in cone order: equalities first, then one-sided inequalities.
  fn cone_rows(&self) -> (Vec<(Vec<f64>, f64)>, Vec<Side>, usize) {
    let n = self.n_vars();
    let row = |i: usize, sign: f64| (0..n).map(|j| sign * self.a[(i, j)]).collect::<Vec<_>>();

    let mut rows = Vec::new();
    let mut sides = Vec::new();
    for i in 0..self.n_constraints() {
      if self.l[i] == self.u[i] {
        rows.push((row(i, 1.0), self.u[i]));
        sides.push(Side::Equal(i));
      }
    }
    let n_eq = rows.len();
    for i in 0..self.n_constraints() {
      if self.l[i] == self.u[i] {
        continue;
      }
      if self.u[i].is_finite() {
        rows.push((row(i, 1.0), self.u[i]));
        sides.push(Side::Upper(i));
      }
      if self.l[i].is_finite() {
        rows.push((row(i, -1.0), -self.l[i]));
        sides.push(Side::Lower(i));
      }
    }
    (rows, sides, n_eq)
  }

  pub fn solve(&self, settings: &QpSettings) -> Result<QpSolution> {
    let n = self.n_vars();
    let (rows, sides, n_eq) = self.cone_rows();

    let p = upper_triangle_csc(&self.p);
    let q: Vec<f64> = self.q.iter().copied().collect();
    let a = rows_csc(&rows, n);
    let b: Vec<f64> = rows.iter().map(|(_, b)| *b).collect();

    let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
    if n_eq > 0 {
      cones.push(ZeroConeT(n_eq));
    }
    if rows.len() > n_eq {
      cones.push(NonnegativeConeT(rows.len() - n_eq));
    }

    let ipm_settings = DefaultSettingsBuilder::default()
      .max_iter(settings.max_iters)
      .tol_gap_abs(settings.tol_gap_abs)
      .tol_gap_rel(settings.tol_gap_rel)
      .tol_feas(settings.tol_feas)
      .tol_infeas_abs(settings.tol_infeas)
      .tol_infeas_rel(settings.tol_infeas)
      .verbose(false)
      .build()
      .map_err(|e| anyhow!("invalid Clarabel settings: {e}"))?;

    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, ipm_settings)
      .map_err(|e| anyhow!("could not set up Clarabel: {e:?}"))?;
    solver.solve();

    let solution = &solver.solution;
    let status = match &solution.status {
      SolverStatus::Solved | SolverStatus::AlmostSolved => QpStatus::Solved,
      SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
        QpStatus::PrimalInfeasible
      }
      other => QpStatus::Unsolved(format!("{other:?}")),
    };

    let mut y = DVector::<f64>::zeros(self.n_constraints());
    for (side, z) in sides.iter().zip(solution.z.iter()) {
      match *side {
        Side::Equal(i) | Side::Upper(i) => y[i] += z,
        Side::Lower(i) => y[i] -= z,
      }
    }

    trace!(
      status = ?solution.status,
      iterations = solution.iterations,
      "QP subproblem solved"
    );

    Ok(QpSolution {
      x: DVector::from_column_slice(&solution.x),
      y,
      status,
      iterations: solution.iterations,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  /// `sum(x) = 1`, `0 <= x <= 1`, plus optional extra rows.
  fn simplex_rows(n: usize, extra: &[(Vec<f64>, f64, f64)]) -> (DMatrix<f64>, DVector<f64>, DVector<f64>) {
    let m = 1 + extra.len() + n;
    let mut a = DMatrix::zeros(m, n);
    let mut l = DVector::zeros(m);
    let mut u = DVector::zeros(m);
    for j in 0..n {
      a[(0, j)] = 1.0;
    }
    l[0] = 1.0;
    u[0] = 1.0;
    for (r, (row, lo, hi)) in extra.iter().enumerate() {
      for j in 0..n {
        a[(1 + r, j)] = row[j];
      }
      l[1 + r] = *lo;
      u[1 + r] = *hi;
    }
    for j in 0..n {
      let r = 1 + extra.len() + j;
      a[(r, j)] = 1.0;
      l[r] = 0.0;
      u[r] = 1.0;
    }
    (a, l, u)
  }

  #[test]
  fn equality_constrained_center() {
    let (a, l, u) = simplex_rows(2, &[]);
    let qp = QuadraticProgram::new(
      DMatrix::identity(2, 2),
      DVector::from_vec(vec![-1.0, -1.0]),
      a,
      l,
      u,
    )
    .unwrap();
    let sol = qp.solve(&QpSettings::default()).unwrap();

    assert_eq!(sol.status, QpStatus::Solved);
    assert_abs_diff_eq!(sol.x[0], 0.5, epsilon = 1e-7);
    assert_abs_diff_eq!(sol.x[1], 0.5, epsilon = 1e-7);
    // stationarity: x - 1 + y_eq = 0
    assert_abs_diff_eq!(sol.y[0], 0.5, epsilon = 1e-6);
  }

  #[test]
  fn active_upper_bound() {
    let qp = QuadraticProgram::new(
      DMatrix::identity(2, 2),
      DVector::from_vec(vec![-2.0, 0.0]),
      DMatrix::identity(2, 2),
      DVector::zeros(2),
      DVector::from_element(2, 1.0),
    )
    .unwrap();
    let sol = qp.solve(&QpSettings::default()).unwrap();

    assert_eq!(sol.status, QpStatus::Solved);
    assert_abs_diff_eq!(sol.x[0], 1.0, epsilon = 1e-7);
    assert_abs_diff_eq!(sol.x[1], 0.0, epsilon = 1e-7);
    assert_abs_diff_eq!(sol.y[0], 1.0, epsilon = 1e-6);
    assert!(qp.constraint_violation(&sol.x) < 1e-8);
  }

  #[test]
  fn active_lower_bound_has_a_negative_multiplier() {
    let qp = QuadraticProgram::new(
      DMatrix::identity(1, 1),
      DVector::from_vec(vec![1.0]),
      DMatrix::identity(1, 1),
      DVector::zeros(1),
      DVector::from_element(1, 1.0),
    )
    .unwrap();
    let sol = qp.solve(&QpSettings::default()).unwrap();

    assert_eq!(sol.status, QpStatus::Solved);
    assert_abs_diff_eq!(sol.x[0], 0.0, epsilon = 1e-7);
    assert_abs_diff_eq!(sol.y[0], -1.0, epsilon = 1e-6);
  }

  #[test]
  fn minimum_variance_on_simplex() {
    // diagonal covariance: weights proportional to inverse variance
    let p = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0 * 0.04, 2.0 * 0.01]));
    let (a, l, u) = simplex_rows(2, &[]);
    let qp = QuadraticProgram::new(p, DVector::zeros(2), a, l, u).unwrap();
    let sol = qp.solve(&QpSettings::default()).unwrap();

    assert_eq!(sol.status, QpStatus::Solved);
    assert_abs_diff_eq!(sol.x[0], 0.2, epsilon = 1e-7);
    assert_abs_diff_eq!(sol.x[1], 0.8, epsilon = 1e-7);
  }

  #[test]
  fn linear_objective_picks_a_vertex() {
    let (a, l, u) = simplex_rows(2, &[]);
    let qp = QuadraticProgram::new(
      DMatrix::zeros(2, 2),
      DVector::from_vec(vec![-1.0, 0.0]),
      a,
      l,
      u,
    )
    .unwrap();
    let sol = qp.solve(&QpSettings::default()).unwrap();

    assert_eq!(sol.status, QpStatus::Solved);
    assert_abs_diff_eq!(sol.x[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(sol.x[1], 0.0, epsilon = 1e-6);
  }

  #[test]
  fn detects_primal_infeasibility() {
    let (a, l, u) = simplex_rows(2, &[(vec![1.0, 1.0], 3.0, f64::INFINITY)]);
    let qp = QuadraticProgram::new(DMatrix::identity(2, 2), DVector::zeros(2), a, l, u).unwrap();
    let sol = qp.solve(&QpSettings::default()).unwrap();

    assert_eq!(sol.status, QpStatus::PrimalInfeasible);
  }

  #[test]
  fn return_floor_above_best_asset_is_infeasible() {
    let mu = vec![0.001, 0.002, 0.0015];
    let (a, l, u) = simplex_rows(3, &[(mu, 0.01, f64::INFINITY)]);
    let qp = QuadraticProgram::new(DMatrix::identity(3, 3) * 1e-4, DVector::zeros(3), a, l, u).unwrap();
    let sol = qp.solve(&QpSettings::default()).unwrap();

    assert_eq!(sol.status, QpStatus::PrimalInfeasible);
  }

  #[test]
  fn rejects_inconsistent_dimensions() {
    let res = QuadraticProgram::new(
      DMatrix::identity(2, 2),
      DVector::zeros(3),
      DMatrix::zeros(1, 3),
      DVector::zeros(1),
      DVector::zeros(1),
    );
    assert!(res.is_err());

    let crossed = QuadraticProgram::new(
      DMatrix::identity(1, 1),
      DVector::zeros(1),
      DMatrix::identity(1, 1),
      DVector::from_element(1, 1.0),
      DVector::from_element(1, 0.0),
    );
    assert!(crossed.is_err());
  }
}
