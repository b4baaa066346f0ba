//! Simulation constants and defaults

/// Events closer than this are dispatched together
pub const EVENT_EPSILON: f64 = 1e-6;

/// Step size floor below which a run is considered failed
pub const MIN_STEP: f64 = 1e-12;

/// Fraction of the run length used as default maximum step
pub const MAX_STEP_FRACTION: f64 = 0.01;

/// Default relative tolerance for local truncation error
pub const SOL_TOLERANCE_LTE_REL: f64 = 1e-3;

/// Default absolute tolerance for local truncation error
pub const SOL_TOLERANCE_LTE_ABS: f64 = 1e-6;

/// Safety factor for adaptive error control
pub const SOL_BETA: f64 = 0.9;

/// Minimum scale factor for timestep adjustment
pub const SOL_SCALE_MIN: f64 = 0.1;

/// Maximum scale factor for timestep adjustment
pub const SOL_SCALE_MAX: f64 = 10.0;

/// Consecutive rejected steps before the solver gives up
pub const SOL_REJECTIONS_MAX: usize = 50;

/// Lower bound on the error norm, avoids division by zero
pub const TOLERANCE: f64 = 1e-16;

/// Relative tolerance when checking that clock periods are integer multiples
pub const CLOCK_RATIO_TOLERANCE: f64 = 1e-9;
