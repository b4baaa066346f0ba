//! Dormand-Prince 5(4) adaptive Runge-Kutta solver

use super::base::{ButcherTableau, RungeKutta};

/// Coefficients of the Dormand-Prince 5(4) pair
#[derive(Debug, Clone, Copy)]
pub struct RKDP54Tableau;

impl ButcherTableau for RKDP54Tableau {
    const NAME: &'static str = "rkdp54";
    const ORDER: usize = 5;
    const EMBEDDED_ORDER: usize = 4;
    const C: &'static [f64] = &[0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
    #[rustfmt::skip]
    const A: &'static [&'static [f64]] = &[
        &[1.0/5.0],
        &[3.0/40.0, 9.0/40.0],
        &[44.0/45.0, -56.0/15.0, 32.0/9.0],
        &[19372.0/6561.0, -25360.0/2187.0, 64448.0/6561.0, -212.0/729.0],
        &[9017.0/3168.0, -355.0/33.0, 46732.0/5247.0, 49.0/176.0, -5103.0/18656.0],
        &[35.0/384.0, 0.0, 500.0/1113.0, 125.0/192.0, -2187.0/6784.0, 11.0/84.0],
    ];
    #[rustfmt::skip]
    const B: &'static [f64] = &[35.0/384.0, 0.0, 500.0/1113.0, 125.0/192.0, -2187.0/6784.0, 11.0/84.0, 0.0];
    #[rustfmt::skip]
    const TR: Option<&'static [f64]> = Some(&[
        71.0/57600.0, 0.0, -71.0/16695.0, 71.0/1920.0, -17253.0/339200.0, 22.0/525.0, -1.0/40.0,
    ]);
}

/// Dormand-Prince 5(4) adaptive solver (DOPRI5), the basis of MATLAB's
/// `ode45`.
///
/// # Characteristics
/// - Order: 5 (propagating) / 4 (embedded)
/// - Stages: 7 (the last one evaluated at the new state)
/// - Explicit, adaptive timestep
///
/// # Note
/// Default solver for batch runs. If a run fails with step underflow the
/// diagram is likely stiff or discontinuous in a way the event queue does
/// not see.
///
/// # References
/// - Dormand, J. R., & Prince, P. J. (1980). "A family of embedded
///   Runge-Kutta formulae". Journal of Computational and Applied
///   Mathematics, 6(1), 19-26.
pub type RKDP54 = RungeKutta<RKDP54Tableau>;
