//! Full-step ODE solving with step-size control on top of the staged solvers

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::base::{integrate_step, Rhs, Solver};
use super::{Euler, RK4, RKBS32, RKDP54, RKF45};
use crate::error::{RuntimeError, SolverError};
use crate::utils::constants::{
    MIN_STEP, SOL_REJECTIONS_MAX, SOL_TOLERANCE_LTE_ABS, SOL_TOLERANCE_LTE_REL,
};

/// Solver selection for batch runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SolverKind {
    Euler,
    RK4,
    RKBS32,
    RKF45,
    #[default]
    RKDP54,
}

impl SolverKind {
    /// Build a solver configured by `options`
    pub fn build(self, options: &SolverOptions) -> Box<dyn OdeSolver> {
        let x0 = DVector::zeros(0);
        let (atol, rtol) = (options.atol, options.rtol);
        match self {
            SolverKind::Euler => Box::new(Stepper::new(Euler::new(x0), options)),
            SolverKind::RK4 => Box::new(Stepper::new(RK4::new(x0), options)),
            SolverKind::RKBS32 => Box::new(Stepper::new(
                RKBS32::with_tolerances(x0, atol, rtol),
                options,
            )),
            SolverKind::RKF45 => Box::new(Stepper::new(
                RKF45::with_tolerances(x0, atol, rtol),
                options,
            )),
            SolverKind::RKDP54 => Box::new(Stepper::new(
                RKDP54::with_tolerances(x0, atol, rtol),
                options,
            )),
        }
    }
}

/// Step-size and tolerance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Largest step, `None` lets the scheduler pick a fraction of the run
    pub max_step: Option<f64>,
    /// First trial step of an adaptive solver, defaults to `max_step`
    pub first_step: Option<f64>,
    pub rtol: f64,
    pub atol: f64,
    /// Step floor; a proposed step below it is a failure
    pub min_step: f64,
    /// Consecutive rejections allowed within one step
    pub max_rejections: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_step: None,
            first_step: None,
            rtol: SOL_TOLERANCE_LTE_REL,
            atol: SOL_TOLERANCE_LTE_ABS,
            min_step: MIN_STEP,
            max_rejections: SOL_REJECTIONS_MAX,
        }
    }
}

/// One accepted step
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub t: f64,
    pub y: DVector<f64>,
    /// Size of the step taken
    pub h: f64,
    /// Proposed size of the next step
    pub h_next: f64,
    /// Right-hand side evaluations spent, including rejected attempts
    pub nfev: usize,
    pub nrejected: usize,
}

/// ODE solver advancing `dy/dt = rhs(t, y)` one accepted step at a time.
pub trait OdeSolver: Send {
    fn name(&self) -> &'static str;

    fn is_adaptive(&self) -> bool;

    /// Largest step this solver will take
    fn max_step(&self) -> f64;

    fn set_max_step(&mut self, max_step: f64);

    /// Take one accepted step from `(t, y)` without passing `t_bound`
    fn step(
        &mut self,
        rhs: &mut Rhs<'_>,
        t: f64,
        y: &DVector<f64>,
        t_bound: f64,
    ) -> Result<StepResult, RuntimeError>;

    /// Forget step-size history before a new run
    fn reset(&mut self);
}

/// Accept/reject controller wrapping a staged [`Solver`]
#[derive(Debug, Clone)]
pub struct Stepper<S: Solver> {
    solver: S,
    max_step: f64,
    first_step: Option<f64>,
    min_step: f64,
    max_rejections: usize,
    h: Option<f64>,
}

impl<S: Solver> Stepper<S> {
    pub fn new(solver: S, options: &SolverOptions) -> Self {
        Self {
            solver,
            max_step: options.max_step.unwrap_or(f64::INFINITY),
            first_step: options.first_step,
            min_step: options.min_step,
            max_rejections: options.max_rejections,
            h: None,
        }
    }

    fn fail(&self, t: f64, source: SolverError) -> RuntimeError {
        RuntimeError::Solver {
            solver: self.solver.name(),
            t,
            source,
        }
    }
}

impl<S: Solver> OdeSolver for Stepper<S> {
    fn name(&self) -> &'static str {
        self.solver.name()
    }

    fn is_adaptive(&self) -> bool {
        self.solver.is_adaptive()
    }

    fn max_step(&self) -> f64 {
        self.max_step
    }

    fn set_max_step(&mut self, max_step: f64) {
        self.max_step = max_step;
    }

    fn step(
        &mut self,
        rhs: &mut Rhs<'_>,
        t: f64,
        y: &DVector<f64>,
        t_bound: f64,
    ) -> Result<StepResult, RuntimeError> {
        let remaining = t_bound - t;
        let adaptive = self.solver.is_adaptive();
        let preferred = if adaptive {
            self.h
                .or(self.first_step)
                .unwrap_or(self.max_step)
                .min(self.max_step)
        } else {
            self.max_step
        };
        if !preferred.is_finite() {
            return Err(RuntimeError::InvalidOption(format!(
                "{} needs a finite max_step",
                self.solver.name()
            )));
        }

        let mut h = preferred;
        let mut nfev = 0;
        let mut nrejected = 0;
        loop {
            // absorb rounding so a bound never leaves a sliver step behind
            let clipped = h * (1.0 + 1e-9) >= remaining;
            let h_try = if clipped { remaining } else { h };

            let result = integrate_step(&mut self.solver, rhs, t, y, h_try)?;
            nfev += self.solver.stages();

            if result.success || !adaptive {
                let y_new = self.solver.state().clone();
                if y_new.iter().any(|v| !v.is_finite()) {
                    return Err(self.fail(t, SolverError::NonFiniteStep { dt: h_try }));
                }

                let scale = result.scale.unwrap_or(1.0);
                let proposed = if clipped {
                    // clipped steps do not shrink the preferred step
                    (h_try * scale).max(preferred.min(h))
                } else {
                    h_try * scale
                };
                let h_next = proposed.min(self.max_step);
                if adaptive {
                    self.h = Some(h_next);
                }

                return Ok(StepResult {
                    t: if clipped { t_bound } else { t + h_try },
                    y: y_new,
                    h: h_try,
                    h_next,
                    nfev,
                    nrejected,
                });
            }

            self.solver
                .revert()
                .map_err(|source| self.fail(t, source))?;
            nrejected += 1;
            if nrejected > self.max_rejections {
                return Err(self.fail(t, SolverError::TooManyRejections(nrejected)));
            }

            h = h_try * result.scale.unwrap_or(0.5);
            if h < self.min_step {
                return Err(RuntimeError::StepUnderflow {
                    t,
                    step: h,
                    min_step: self.min_step,
                });
            }
        }
    }

    fn reset(&mut self) {
        self.h = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn options(max_step: f64) -> SolverOptions {
        SolverOptions {
            max_step: Some(max_step),
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_step_lands_on_bound() {
        let mut solver = SolverKind::RK4.build(&options(0.3));
        let y = DVector::from_vec(vec![0.0]);
        let mut rhs = |_t: f64, _y: &DVector<f64>| -> Result<DVector<f64>, RuntimeError> {
            Ok(DVector::from_vec(vec![1.0]))
        };

        let r = solver.step(&mut rhs, 0.0, &y, 1.0).unwrap();
        assert_relative_eq!(r.t, 0.3);
        let r = solver.step(&mut rhs, 0.9, &r.y, 1.0).unwrap();
        assert_relative_eq!(r.t, 1.0);
        assert_relative_eq!(r.h, 0.1, epsilon = 1e-12);
        assert_eq!(r.nfev, 4);
    }

    #[test]
    fn test_adaptive_integration_accuracy() {
        let opts = SolverOptions {
            max_step: Some(1.0),
            rtol: 1e-8,
            atol: 1e-10,
            ..Default::default()
        };
        let mut solver = SolverKind::RKDP54.build(&opts);
        let mut rhs = |_t: f64, y: &DVector<f64>| -> Result<DVector<f64>, RuntimeError> { Ok(-y) };

        let mut t = 0.0;
        let mut y = DVector::from_vec(vec![1.0]);
        let mut steps = 0;
        while t < 3.0 {
            let r = solver.step(&mut rhs, t, &y, 3.0).unwrap();
            t = r.t;
            y = r.y;
            steps += 1;
        }
        assert_relative_eq!(t, 3.0);
        assert_relative_eq!(y[0], (-3.0f64).exp(), epsilon = 1e-7);
        assert!(steps > 3);
    }

    #[test]
    fn test_rejection_shrinks_step() {
        let opts = SolverOptions {
            max_step: Some(10.0),
            rtol: 1e-10,
            atol: 1e-12,
            ..Default::default()
        };
        let mut solver = SolverKind::RKF45.build(&opts);
        let mut rhs = |_t: f64, y: &DVector<f64>| -> Result<DVector<f64>, RuntimeError> {
            Ok(DVector::from_vec(vec![y[1], -50.0 * y[0]]))
        };
        let y = DVector::from_vec(vec![1.0, 0.0]);

        let r = solver.step(&mut rhs, 0.0, &y, 10.0).unwrap();
        assert!(r.nrejected > 0);
        assert!(r.h < 10.0);
    }

    #[test]
    fn test_rhs_error_propagates() {
        let mut solver = SolverKind::Euler.build(&options(0.1));
        let mut rhs = |_t: f64, _y: &DVector<f64>| -> Result<DVector<f64>, RuntimeError> {
            Err(RuntimeError::NotCompiled)
        };
        let err = solver
            .step(&mut rhs, 0.0, &DVector::zeros(1), 1.0)
            .unwrap_err();
        assert_eq!(err, RuntimeError::NotCompiled);
    }

    #[test]
    fn test_non_finite_state_is_failure() {
        let mut solver = SolverKind::Euler.build(&options(0.1));
        let mut rhs = |_t: f64, _y: &DVector<f64>| -> Result<DVector<f64>, RuntimeError> {
            Ok(DVector::from_vec(vec![f64::NAN]))
        };
        let err = solver
            .step(&mut rhs, 0.0, &DVector::zeros(1), 1.0)
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Solver {
                source: SolverError::NonFiniteStep { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let opts: SolverOptions = serde_json::from_str(r#"{"rtol": 1e-6}"#).unwrap();
        assert_eq!(opts.rtol, 1e-6);
        assert_eq!(opts.min_step, MIN_STEP);

        let kind: SolverKind = serde_json::from_str(r#""RK4""#).unwrap();
        assert_eq!(kind, SolverKind::RK4);
    }
}
