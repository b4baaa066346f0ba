//! Base solver traits and the staged explicit Runge-Kutta engine

use std::collections::VecDeque;
use std::marker::PhantomData;

use nalgebra::DVector;

use crate::error::{RuntimeError, SolverError};
use crate::utils::constants::{
    SOL_BETA, SOL_SCALE_MAX, SOL_SCALE_MIN, SOL_TOLERANCE_LTE_ABS, SOL_TOLERANCE_LTE_REL,
    TOLERANCE,
};

/// Right-hand side `dx/dt = f(t, x)`. Errors abort the step.
pub type Rhs<'a> = dyn FnMut(f64, &DVector<f64>) -> Result<DVector<f64>, RuntimeError> + 'a;

/// Result of the final stage of a step
#[derive(Debug, Clone, Copy)]
pub struct SolverStepResult {
    pub success: bool,
    pub error_norm: f64,
    pub scale: Option<f64>,
}

impl Default for SolverStepResult {
    fn default() -> Self {
        Self {
            success: true,
            error_norm: 0.0,
            scale: None,
        }
    }
}

/// Staged numerical integrator.
///
/// A step is `buffer()`, then `stage()` until it returns `Some`, then either
/// accept the new `state()` or `revert()` and retry with a smaller step.
pub trait Solver: Send {
    fn name(&self) -> &'static str;

    fn state(&self) -> &DVector<f64>;

    fn set_state(&mut self, state: DVector<f64>);

    /// Buffer the current state for a potential revert
    fn buffer(&mut self);

    /// Revert to the buffered state
    fn revert(&mut self) -> Result<(), SolverError>;

    /// Evaluate the next stage of a step of size `dt` from time `t`.
    /// Returns `Some` after the final stage.
    fn stage(
        &mut self,
        f: &mut Rhs<'_>,
        t: f64,
        dt: f64,
    ) -> Result<Option<SolverStepResult>, RuntimeError>;

    /// Order of the method
    fn order(&self) -> usize;

    /// Number of stages
    fn stages(&self) -> usize;

    fn is_adaptive(&self) -> bool;
}

/// Coefficients of an explicit Runge-Kutta method.
///
/// `A[i]` gives the weights of the stage `i + 1` input; `B` gives the
/// propagating solution and `TR`, when present, the truncation error
/// estimate of an embedded pair.
pub trait ButcherTableau: Send + 'static {
    const NAME: &'static str;
    const ORDER: usize;
    /// Order used by the step-size controller
    const EMBEDDED_ORDER: usize = Self::ORDER;
    const C: &'static [f64];
    const A: &'static [&'static [f64]];
    const B: &'static [f64];
    const TR: Option<&'static [f64]> = None;
}

/// Explicit Runge-Kutta integrator driven by a Butcher tableau.
#[derive(Debug, Clone)]
pub struct RungeKutta<M: ButcherTableau> {
    state: DVector<f64>,
    history: VecDeque<DVector<f64>>,
    slopes: Vec<DVector<f64>>,
    stage: usize,
    tol_abs: f64,
    tol_rel: f64,
    beta: f64,
    _method: PhantomData<M>,
}

impl<M: ButcherTableau> RungeKutta<M> {
    /// Create a solver with the given initial state and default tolerances
    pub fn new(initial: DVector<f64>) -> Self {
        Self::with_tolerances(initial, SOL_TOLERANCE_LTE_ABS, SOL_TOLERANCE_LTE_REL)
    }

    /// Create a solver with custom tolerances
    pub fn with_tolerances(initial: DVector<f64>, tol_abs: f64, tol_rel: f64) -> Self {
        Self {
            state: initial,
            history: VecDeque::with_capacity(2),
            slopes: Vec::with_capacity(M::C.len()),
            stage: 0,
            tol_abs,
            tol_rel,
            beta: SOL_BETA,
            _method: PhantomData,
        }
    }

    /// Compute error norm and timestep scale factor
    fn error_controller(&self, tr: &[f64], dt: f64) -> (bool, f64, f64) {
        let mut error_slope = DVector::zeros(self.state.len());
        for (coef, slope) in tr.iter().zip(&self.slopes) {
            error_slope += *coef * slope;
        }

        let scale = self.state.map(|x| self.tol_abs + self.tol_rel * x.abs());
        let scaled_error = (dt * &error_slope).component_div(&scale).map(|e| e.abs());
        let error_norm = scaled_error.max().max(TOLERANCE);
        let success = error_norm <= 1.0;

        let order = M::EMBEDDED_ORDER.min(M::ORDER);
        let timestep_scale = (self.beta / error_norm.powf(1.0 / (order as f64 + 1.0)))
            .clamp(SOL_SCALE_MIN, SOL_SCALE_MAX);

        (success, error_norm, timestep_scale)
    }

    fn weighted(&self, x0: &DVector<f64>, weights: &[f64], dt: f64) -> DVector<f64> {
        let mut slope_sum = DVector::zeros(x0.len());
        for (coef, slope) in weights.iter().zip(&self.slopes) {
            if *coef != 0.0 {
                slope_sum += *coef * slope;
            }
        }
        x0 + dt * slope_sum
    }
}

impl<M: ButcherTableau> Solver for RungeKutta<M> {
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn state(&self) -> &DVector<f64> {
        &self.state
    }

    fn set_state(&mut self, state: DVector<f64>) {
        self.state = state;
    }

    fn buffer(&mut self) {
        if self.history.len() >= 2 {
            self.history.pop_back();
        }
        self.history.push_front(self.state.clone());
        self.slopes.clear();
        self.stage = 0;
    }

    fn revert(&mut self) -> Result<(), SolverError> {
        self.state = self.history.pop_front().ok_or(SolverError::EmptyHistory)?;
        self.slopes.clear();
        self.stage = 0;
        Ok(())
    }

    fn stage(
        &mut self,
        f: &mut Rhs<'_>,
        t: f64,
        dt: f64,
    ) -> Result<Option<SolverStepResult>, RuntimeError> {
        let x0 = self
            .history
            .front()
            .cloned()
            .ok_or(RuntimeError::Solver {
                solver: M::NAME,
                t,
                source: SolverError::EmptyHistory,
            })?;

        self.slopes.push(f(t + M::C[self.stage] * dt, &self.state)?);

        if self.stage + 1 < M::C.len() {
            self.state = self.weighted(&x0, M::A[self.stage], dt);
            self.stage += 1;
            return Ok(None);
        }

        self.state = self.weighted(&x0, M::B, dt);
        self.stage = 0;

        let result = match M::TR {
            Some(tr) => {
                let (success, error_norm, scale) = self.error_controller(tr, dt);
                SolverStepResult {
                    success,
                    error_norm,
                    scale: Some(scale),
                }
            }
            None => SolverStepResult::default(),
        };
        Ok(Some(result))
    }

    fn order(&self) -> usize {
        M::ORDER
    }

    fn stages(&self) -> usize {
        M::C.len()
    }

    fn is_adaptive(&self) -> bool {
        M::TR.is_some()
    }
}

/// Drive a staged solver through one full step of size `dt` from `(t, x)`.
pub fn integrate_step<S: Solver + ?Sized>(
    solver: &mut S,
    f: &mut Rhs<'_>,
    t: f64,
    x: &DVector<f64>,
    dt: f64,
) -> Result<SolverStepResult, RuntimeError> {
    solver.set_state(x.clone());
    solver.buffer();
    loop {
        if let Some(result) = solver.stage(f, t, dt)? {
            return Ok(result);
        }
    }
}
