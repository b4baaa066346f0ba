//! Runge-Kutta-Fehlberg 4(5) adaptive solver

use super::base::{ButcherTableau, RungeKutta};

/// Coefficients of the Fehlberg 4(5) pair, propagating the fourth-order
/// solution
#[derive(Debug, Clone, Copy)]
pub struct RKF45Tableau;

impl ButcherTableau for RKF45Tableau {
    const NAME: &'static str = "rkf45";
    const ORDER: usize = 4;
    const C: &'static [f64] = &[0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0];
    #[rustfmt::skip]
    const A: &'static [&'static [f64]] = &[
        &[1.0/4.0],
        &[3.0/32.0, 9.0/32.0],
        &[1932.0/2197.0, -7200.0/2197.0, 7296.0/2197.0],
        &[439.0/216.0, -8.0, 3680.0/513.0, -845.0/4104.0],
        &[-8.0/27.0, 2.0, -3544.0/2565.0, 1859.0/4104.0, -11.0/40.0],
    ];
    #[rustfmt::skip]
    const B: &'static [f64] = &[25.0/216.0, 0.0, 1408.0/2565.0, 2197.0/4104.0, -1.0/5.0, 0.0];
    #[rustfmt::skip]
    const TR: Option<&'static [f64]> = Some(&[
        1.0/360.0, 0.0, -128.0/4275.0, -2197.0/75240.0, 1.0/50.0, 2.0/55.0,
    ]);
}

/// Runge-Kutta-Fehlberg 4(5) pair.
///
/// # Characteristics
/// - Order: 4 (propagating) / 5 (embedded)
/// - Stages: 6
/// - Explicit, adaptive timestep
pub type RKF45 = RungeKutta<RKF45Tableau>;
