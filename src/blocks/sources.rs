//! Signal sources: outputs depend on time only

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockClass};
use crate::block_boilerplate;
use crate::error::BlockError;
use crate::param::Tunable;
use crate::value::Value;

/// Constant value source, scalar or vector
#[derive(Debug, Clone)]
pub struct Constant {
    value: Value,
    tunable: Option<Tunable>,
}

impl Constant {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            tunable: None,
        }
    }

    /// Scalar constant bound to a tunable parameter
    pub fn tunable(value: impl Into<Tunable>) -> Self {
        let value = value.into();
        Self {
            value: Value::Scalar(value.get()),
            tunable: Some(value),
        }
    }

    pub fn value(&self) -> Value {
        match &self.tunable {
            Some(p) => Value::Scalar(p.get()),
            None => self.value.clone(),
        }
    }
}

impl Block for Constant {
    fn type_name(&self) -> &'static str {
        "constant"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Source
    }

    fn nin(&self) -> usize {
        0
    }

    fn nout(&self) -> usize {
        1
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(vec![self.value()])
    }

    block_boilerplate!();
}

/// Simulation time as a signal
#[derive(Debug, Clone, Default)]
pub struct Time;

impl Time {
    pub fn new() -> Self {
        Self
    }
}

impl Block for Time {
    fn type_name(&self) -> &'static str {
        "time"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Source
    }

    fn nin(&self) -> usize {
        0
    }

    fn nout(&self) -> usize {
        1
    }

    fn output(&self, t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(vec![Value::Scalar(t)])
    }

    block_boilerplate!();
}

/// Step signal: `off` for t < T, `on` for t >= T
#[derive(Debug, Clone)]
pub struct Step {
    t0: f64,
    off: f64,
    on: f64,
}

impl Step {
    /// Unit step at time `t0`
    pub fn new(t0: f64) -> Self {
        Self {
            t0,
            off: 0.0,
            on: 1.0,
        }
    }

    pub fn with_levels(t0: f64, off: f64, on: f64) -> Self {
        Self { t0, off, on }
    }
}

impl Block for Step {
    fn type_name(&self) -> &'static str {
        "step"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Source
    }

    fn nin(&self) -> usize {
        0
    }

    fn nout(&self) -> usize {
        1
    }

    fn output(&self, t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let y = if t >= self.t0 { self.on } else { self.off };
        Ok(vec![Value::Scalar(y)])
    }

    block_boilerplate!();
}

/// Ramp signal: 0 before `t0`, then `start + slope * (t - t0)`
#[derive(Debug, Clone)]
pub struct Ramp {
    t0: f64,
    start: f64,
    slope: f64,
}

impl Ramp {
    pub fn new(t0: f64, slope: f64) -> Self {
        Self {
            t0,
            start: 0.0,
            slope,
        }
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }
}

impl Block for Ramp {
    fn type_name(&self) -> &'static str {
        "ramp"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Source
    }

    fn nin(&self) -> usize {
        0
    }

    fn nout(&self) -> usize {
        1
    }

    fn output(&self, t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let y = if t >= self.t0 {
            self.start + self.slope * (t - self.t0)
        } else {
            0.0
        };
        Ok(vec![Value::Scalar(y)])
    }

    block_boilerplate!();
}

/// Periodic waveform shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wave {
    Sine,
    Square,
    Triangle,
}

/// Periodic waveform generator.
///
/// All shapes are defined on [-1, 1], then scaled by `amplitude` and shifted
/// by `offset`. At t=0 the sine and triangle are zero and increasing and the
/// square wave has its first rise. `phase` is in cycles.
#[derive(Debug, Clone)]
pub struct WaveForm {
    wave: Wave,
    freq: f64,
    phase: f64,
    amplitude: f64,
    offset: f64,
    duty: f64,
}

impl WaveForm {
    /// Waveform of frequency `freq` in Hz, varying between -1 and 1
    pub fn new(wave: Wave, freq: f64) -> Self {
        Self {
            wave,
            freq,
            phase: 0.0,
            amplitude: 1.0,
            offset: 0.0,
            duty: 0.5,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f64, offset: f64) -> Self {
        self.amplitude = amplitude;
        self.offset = offset;
        self
    }

    /// Set the extremes directly, overriding amplitude and offset
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.amplitude = (max - min) / 2.0;
        self.offset = (max + min) / 2.0;
        self
    }

    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_duty(mut self, duty: f64) -> Self {
        self.duty = duty;
        self
    }
}

impl Block for WaveForm {
    fn type_name(&self) -> &'static str {
        "waveform"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Source
    }

    fn nin(&self) -> usize {
        0
    }

    fn nout(&self) -> usize {
        1
    }

    fn check(&self) -> Result<(), BlockError> {
        if !self.freq.is_finite() || self.freq <= 0.0 {
            return Err(BlockError::bad_parameter("freq", "must be positive"));
        }
        if self.duty <= 0.0 || self.duty >= 1.0 {
            return Err(BlockError::bad_parameter("duty", "must be in (0, 1)"));
        }
        Ok(())
    }

    fn output(&self, t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let phase = (t * self.freq - self.phase).rem_euclid(1.0);
        let unit = match self.wave {
            Wave::Square => {
                if phase < self.duty {
                    1.0
                } else {
                    -1.0
                }
            }
            Wave::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    1.0 - 4.0 * (phase - 0.25)
                } else {
                    -1.0 + 4.0 * (phase - 0.75)
                }
            }
            Wave::Sine => (2.0 * PI * phase).sin(),
        };
        Ok(vec![Value::Scalar(unit * self.amplitude + self.offset)])
    }

    block_boilerplate!();
}

/// Piecewise-constant signal through (time, value) knots.
///
/// Outputs 0 before the first knot and holds each knot's value from its time
/// until the next knot.
#[derive(Debug, Clone)]
pub struct Piecewise {
    knots: Vec<(f64, f64)>,
}

impl Piecewise {
    pub fn new(knots: Vec<(f64, f64)>) -> Self {
        Self { knots }
    }

    /// Knot times, usable as breakpoints for fixed-step runs
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.knots.iter().map(|(t, _)| *t)
    }
}

impl Block for Piecewise {
    fn type_name(&self) -> &'static str {
        "piecewise"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Source
    }

    fn nin(&self) -> usize {
        0
    }

    fn nout(&self) -> usize {
        1
    }

    fn check(&self) -> Result<(), BlockError> {
        if self.knots.windows(2).any(|w| w[1].0 < w[0].0) {
            return Err(BlockError::bad_parameter(
                "knots",
                "times must be non-decreasing",
            ));
        }
        Ok(())
    }

    fn output(&self, t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let y = self
            .knots
            .iter()
            .take_while(|(tk, _)| *tk <= t)
            .last()
            .map(|(_, v)| *v)
            .unwrap_or(0.0);
        Ok(vec![Value::Scalar(y)])
    }

    block_boilerplate!();
}
