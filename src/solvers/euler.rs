//! Forward Euler method

use super::base::{ButcherTableau, RungeKutta};

/// Coefficients of the explicit forward Euler method
///
/// ```text
/// x_{n+1} = x_n + h * f(t_n, x_n)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EulerTableau;

impl ButcherTableau for EulerTableau {
    const NAME: &'static str = "euler";
    const ORDER: usize = 1;
    const C: &'static [f64] = &[0.0];
    const A: &'static [&'static [f64]] = &[];
    const B: &'static [f64] = &[1.0];
}

/// Explicit forward Euler, first order, fixed step.
///
/// The cheapest solver per step and the least accurate. Mainly useful for
/// diagrams whose dynamics are trivial (pure integrators of piecewise
/// constant signals) or for checking results against a hand calculation.
pub type Euler = RungeKutta<EulerTableau>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::base::{integrate_step, Solver};
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_euler_single_step() {
        let mut solver = Euler::new(DVector::from_vec(vec![1.0]));
        let x = solver.state().clone();
        let result = integrate_step(&mut solver, &mut |_t, x| Ok(-x), 0.0, &x, 0.1).unwrap();

        assert!(result.success);
        assert!(result.scale.is_none());
        assert_relative_eq!(solver.state()[0], 0.9, epsilon = 1e-15);
        assert!(!solver.is_adaptive());
        assert_eq!(solver.stages(), 1);
    }
}
