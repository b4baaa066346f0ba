//! Numerical integration solvers
//!
//! Explicit Runge-Kutta methods built on one staged engine
//! ([`RungeKutta`]) parameterized by a Butcher tableau:
//! - Fixed step: Euler, RK4
//! - Adaptive embedded pairs: RKBS32, RKF45, RKDP54
//!
//! [`OdeSolver`] wraps a staged solver with accept/reject step-size control
//! and is what the batch scheduler drives.

mod base;
mod euler;
mod rk4;
mod rkbs32;
mod rkdp54;
mod rkf45;
mod stepper;

pub use base::*;
pub use euler::{Euler, EulerTableau};
pub use rk4::{RK4Tableau, RK4};
pub use rkbs32::{RKBS32Tableau, RKBS32};
pub use rkdp54::{RKDP54Tableau, RKDP54};
pub use rkf45::{RKF45Tableau, RKF45};
pub use stepper::{OdeSolver, SolverKind, SolverOptions, StepResult, Stepper};
