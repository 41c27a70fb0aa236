//! # Optimize
//!
//! $$
//! \min_x f(x)\quad\text{s.t.}\quad c_E(x)=0,\ c_I(x)\ge 0,\ l\le x\le u
//! $$
//!
//! Constrained solvers that run under the argmin executor.

pub mod qp;
pub mod sqp;

pub use qp::QpSettings;
pub use qp::QpSolution;
pub use qp::QpStatus;
pub use qp::QuadraticProgram;
pub use sqp::ConstraintKind;
pub use sqp::Constraints;
pub use sqp::LinearizedConstraint;
pub use sqp::Sqp;
pub use sqp::SqpState;
