//! Periodic clocks driving discrete blocks

use serde::{Deserialize, Serialize};

use crate::error::BlockError;
use crate::plug::BlockId;

/// Periodic tick source grouping clocked blocks.
///
/// Tick times are `offset + k * period` restricted to `t > 0`, computed from
/// the tick index so long runs do not accumulate drift.
#[derive(Debug, Clone)]
pub struct Clock {
    name: String,
    period: f64,
    offset: f64,
    tick: usize,
    /// Member blocks, in diagram order, rebuilt at compile time
    pub(crate) blocks: Vec<BlockId>,
    /// Concatenated discrete state of the member blocks
    pub(crate) x: Vec<f64>,
    history: ClockTrace,
}

/// Discrete state history of one clock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockTrace {
    pub name: String,
    pub t: Vec<f64>,
    pub x: Vec<Vec<f64>>,
}

impl Clock {
    pub fn new(name: impl Into<String>, period: f64, offset: f64) -> Self {
        let name = name.into();
        Self {
            history: ClockTrace {
                name: name.clone(),
                ..Default::default()
            },
            name,
            period,
            offset,
            tick: 0,
            blocks: Vec::new(),
            x: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.history.name = name.clone();
        self.name = name;
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn frequency(&self) -> f64 {
        1.0 / self.period
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Current discrete state
    pub fn state(&self) -> &[f64] {
        &self.x
    }

    pub fn check(&self) -> Result<(), BlockError> {
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(BlockError::bad_parameter(
                "period",
                format!("{} must be positive", self.period),
            ));
        }
        if !self.offset.is_finite() || self.offset < 0.0 {
            return Err(BlockError::bad_parameter(
                "offset",
                format!("{} must be non-negative", self.offset),
            ));
        }
        Ok(())
    }

    fn tick_time(&self, k: usize) -> f64 {
        self.offset + k as f64 * self.period
    }

    /// Rewind to the first tick after t=0 and clear the history
    pub fn start(&mut self) {
        self.tick = if self.offset > 0.0 { 0 } else { 1 };
        self.history.t.clear();
        self.history.x.clear();
    }

    /// Time of the next pending tick
    pub fn next_time(&self) -> f64 {
        self.tick_time(self.tick)
    }

    /// Move to the following tick, returning its time
    pub fn advance(&mut self) -> f64 {
        self.tick += 1;
        self.next_time()
    }

    /// Record the current discrete state at time `t`
    pub fn save_state(&mut self, t: f64) {
        self.history.t.push(t);
        self.history.x.push(self.x.clone());
    }

    pub fn trace(&self) -> &ClockTrace {
        &self.history
    }
}

/// True when `long / short` is within tolerance of an integer.
pub fn commensurate(short: f64, long: f64, tolerance: f64) -> bool {
    let ratio = long / short;
    (ratio - ratio.round()).abs() <= tolerance * ratio.max(1.0) && ratio.round() >= 1.0
}
