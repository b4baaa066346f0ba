//! Sinks: consume stabilized inputs once per accepted time step

use tracing::info;

use crate::block::{input, Block, BlockClass};
use crate::block_boilerplate;
use crate::error::BlockError;
use crate::sim::RunState;
use crate::value::Value;

/// Accepts and ignores its inputs
#[derive(Debug, Clone)]
pub struct Null {
    nin: usize,
}

impl Null {
    pub fn new(nin: usize) -> Self {
        Self { nin }
    }
}

impl Block for Null {
    fn type_name(&self) -> &'static str {
        "null"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Sink
    }

    fn nin(&self) -> usize {
        self.nin
    }

    fn nout(&self) -> usize {
        0
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(Vec::new())
    }

    block_boilerplate!();
}

/// Logs its input at every accepted step
#[derive(Debug, Clone)]
pub struct Print {
    label: String,
}

impl Print {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Block for Print {
    fn type_name(&self) -> &'static str {
        "print"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Sink
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        0
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(Vec::new())
    }

    fn step(&mut self, t: f64, inputs: &[Value], _run: &mut RunState) -> Result<(), BlockError> {
        info!(target: "flowsim::print", t, "{}{}", self.label, input(inputs, 0)?);
        Ok(())
    }

    block_boilerplate!();
}

/// Requests a graceful stop when its input becomes truthy
#[derive(Debug, Clone, Default)]
pub struct Stop;

impl Stop {
    pub fn new() -> Self {
        Self
    }
}

impl Block for Stop {
    fn type_name(&self) -> &'static str {
        "stop"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Sink
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        0
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(Vec::new())
    }

    fn step(&mut self, _t: f64, inputs: &[Value], run: &mut RunState) -> Result<(), BlockError> {
        if input(inputs, 0)?.is_truthy() {
            run.request_stop();
        }
        Ok(())
    }

    block_boilerplate!();
}

/// Keeps every accepted `(t, inputs)` sample of a run
#[derive(Debug, Clone)]
pub struct Recorder {
    nin: usize,
    t: Vec<f64>,
    samples: Vec<Vec<Value>>,
}

impl Recorder {
    pub fn new(nin: usize) -> Self {
        Self {
            nin,
            t: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.t
    }

    pub fn samples(&self) -> &[Vec<Value>] {
        &self.samples
    }

    /// Recorded history of one input port as scalars
    pub fn channel(&self, port: usize) -> Vec<f64> {
        self.samples
            .iter()
            .filter_map(|s| s.get(port).and_then(Value::as_f64))
            .collect()
    }
}

impl Block for Recorder {
    fn type_name(&self) -> &'static str {
        "recorder"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Sink
    }

    fn nin(&self) -> usize {
        self.nin
    }

    fn nout(&self) -> usize {
        0
    }

    fn start(&mut self) -> Result<(), BlockError> {
        self.t.clear();
        self.samples.clear();
        Ok(())
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(Vec::new())
    }

    fn step(&mut self, t: f64, inputs: &[Value], _run: &mut RunState) -> Result<(), BlockError> {
        self.t.push(t);
        self.samples.push(inputs.to_vec());
        Ok(())
    }

    block_boilerplate!();
}
