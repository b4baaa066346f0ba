//! Bogacki-Shampine 3(2) adaptive solver

use super::base::{ButcherTableau, RungeKutta};

/// Coefficients of the Bogacki-Shampine 3(2) pair
#[derive(Debug, Clone, Copy)]
pub struct RKBS32Tableau;

impl ButcherTableau for RKBS32Tableau {
    const NAME: &'static str = "rkbs32";
    const ORDER: usize = 3;
    const EMBEDDED_ORDER: usize = 2;
    const C: &'static [f64] = &[0.0, 1.0 / 2.0, 3.0 / 4.0, 1.0];
    #[rustfmt::skip]
    const A: &'static [&'static [f64]] = &[
        &[1.0/2.0],
        &[0.0, 3.0/4.0],
        &[2.0/9.0, 1.0/3.0, 4.0/9.0],
    ];
    const B: &'static [f64] = &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0];
    const TR: Option<&'static [f64]> = Some(&[-5.0 / 72.0, 1.0 / 12.0, 1.0 / 9.0, -1.0 / 8.0]);
}

/// Bogacki-Shampine 3(2) pair, the method behind MATLAB's `ode23`.
///
/// Fewer stages than the fifth-order pairs, so cheaper per step but needs
/// more steps for the same global error. Efficient for smooth dynamics with
/// relaxed tolerances.
pub type RKBS32 = RungeKutta<RKBS32Tableau>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::base::{integrate_step, Solver};
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_rkbs32_decay_and_error_estimate() {
        let mut solver = RKBS32::with_tolerances(DVector::from_vec(vec![1.0]), 1e-8, 1e-6);
        let x = solver.state().clone();
        let result = integrate_step(&mut solver, &mut |_t, x| Ok(-x), 0.0, &x, 0.05).unwrap();

        let scale = result.scale.unwrap();
        assert!((0.1..=10.0).contains(&scale));
        assert!(result.error_norm > 0.0);
        assert_relative_eq!(solver.state()[0], (-0.05f64).exp(), epsilon = 1e-6);
        assert!(solver.is_adaptive());
    }
}
