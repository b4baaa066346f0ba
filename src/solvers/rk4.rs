//! Classical fourth-order Runge-Kutta method

use super::base::{ButcherTableau, RungeKutta};

/// Coefficients of the classical RK4 method
#[derive(Debug, Clone, Copy)]
pub struct RK4Tableau;

impl ButcherTableau for RK4Tableau {
    const NAME: &'static str = "rk4";
    const ORDER: usize = 4;
    const C: &'static [f64] = &[0.0, 0.5, 0.5, 1.0];
    #[rustfmt::skip]
    const A: &'static [&'static [f64]] = &[
        &[0.5],
        &[0.0, 0.5],
        &[0.0, 0.0, 1.0],
    ];
    const B: &'static [f64] = &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0];
}

/// Classical Runge-Kutta method, fourth order, fixed step.
///
/// # Characteristics
/// - Order: 4
/// - Stages: 4
/// - Explicit, fixed timestep
///
/// A good choice when the step is dictated by the sample rate of the
/// diagram rather than by accuracy, e.g. a fixed `max_step` matched to a
/// clock period.
pub type RK4 = RungeKutta<RK4Tableau>;
