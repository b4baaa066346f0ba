//! Clocked blocks: discrete state updated at the ticks of their clock

use crate::block::{vector_input, Block, BlockClass};
use crate::block_boilerplate;
use crate::error::BlockError;
use crate::value::Value;

/// Zero-order hold: samples its input at every tick and holds it.
#[derive(Debug, Clone)]
pub struct Zoh {
    x0: Vec<f64>,
    x: Vec<f64>,
    scalar: bool,
}

impl Zoh {
    pub fn new(x0: f64) -> Self {
        Self {
            x0: vec![x0],
            x: vec![x0],
            scalar: true,
        }
    }

    pub fn vector(x0: Vec<f64>) -> Self {
        Self {
            x: x0.clone(),
            x0,
            scalar: false,
        }
    }
}

impl Block for Zoh {
    fn type_name(&self) -> &'static str {
        "zoh"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Clocked
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        1
    }

    fn ndstates(&self) -> usize {
        self.x0.len()
    }

    fn check(&self) -> Result<(), BlockError> {
        if self.x0.is_empty() {
            return Err(BlockError::bad_parameter("x0", "must not be empty"));
        }
        Ok(())
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(vec![Value::from_slice(&self.x, self.scalar)])
    }

    fn next(&mut self, inputs: &[Value], _period: f64) -> Result<Vec<f64>, BlockError> {
        vector_input(inputs, 0, self.x.len())
    }

    fn state(&self) -> Vec<f64> {
        self.x.clone()
    }

    fn set_state(&mut self, x: &[f64]) {
        self.x.copy_from_slice(x);
    }

    fn initial_state(&self) -> Vec<f64> {
        self.x0.clone()
    }

    block_boilerplate!();
}

/// Discrete-time integrator: `x <- clamp(x + gain * T * u)` at each tick.
#[derive(Debug, Clone)]
pub struct DIntegrator {
    x0: Vec<f64>,
    x: Vec<f64>,
    scalar: bool,
    gain: f64,
    min: Option<Vec<f64>>,
    max: Option<Vec<f64>>,
}

impl DIntegrator {
    pub fn new(x0: f64) -> Self {
        Self {
            x0: vec![x0],
            x: vec![x0],
            scalar: true,
            gain: 1.0,
            min: None,
            max: None,
        }
    }

    pub fn vector(x0: Vec<f64>) -> Self {
        Self {
            x: x0.clone(),
            x0,
            scalar: false,
            gain: 1.0,
            min: None,
            max: None,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_limits(mut self, min: Vec<f64>, max: Vec<f64>) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

impl Block for DIntegrator {
    fn type_name(&self) -> &'static str {
        "dintegrator"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Clocked
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        1
    }

    fn ndstates(&self) -> usize {
        self.x0.len()
    }

    fn check(&self) -> Result<(), BlockError> {
        let n = self.x0.len();
        if n == 0 {
            return Err(BlockError::bad_parameter("x0", "must not be empty"));
        }
        for (name, limit) in [("min", &self.min), ("max", &self.max)] {
            if limit.as_ref().is_some_and(|l| l.len() != n) {
                return Err(BlockError::bad_parameter(
                    name,
                    format!("must have {} elements", n),
                ));
            }
        }
        Ok(())
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(vec![Value::from_slice(&self.x, self.scalar)])
    }

    fn next(&mut self, inputs: &[Value], period: f64) -> Result<Vec<f64>, BlockError> {
        let u = vector_input(inputs, 0, self.x.len())?;
        let mut x: Vec<f64> = self
            .x
            .iter()
            .zip(&u)
            .map(|(x, u)| x + self.gain * period * u)
            .collect();
        if let Some(min) = &self.min {
            x.iter_mut().zip(min).for_each(|(x, lo)| *x = x.max(*lo));
        }
        if let Some(max) = &self.max {
            x.iter_mut().zip(max).for_each(|(x, hi)| *x = x.min(*hi));
        }
        Ok(x)
    }

    fn state(&self) -> Vec<f64> {
        self.x.clone()
    }

    fn set_state(&mut self, x: &[f64]) {
        self.x.copy_from_slice(x);
    }

    fn initial_state(&self) -> Vec<f64> {
        self.x0.clone()
    }

    block_boilerplate!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zoh_samples_input() {
        let mut zoh = Zoh::new(5.0);
        assert_eq!(zoh.output(0.0, &[]).unwrap(), vec![Value::Scalar(5.0)]);

        let x = zoh.next(&[Value::Scalar(2.0)], 0.5).unwrap();
        assert_eq!(x, vec![2.0]);
        zoh.set_state(&x);
        assert_eq!(zoh.output(0.0, &[]).unwrap(), vec![Value::Scalar(2.0)]);
    }

    #[test]
    fn test_dintegrator_next() {
        let mut di = DIntegrator::new(5.0);
        let x = di.next(&[Value::Scalar(2.0)], 0.5).unwrap();
        assert_relative_eq!(x[0], 6.0);

        let mut di = DIntegrator::vector(vec![5.0, 6.0])
            .with_limits(vec![-5.0, -10.0], vec![5.0, 10.0]);
        assert!(di.check().is_ok());
        let x = di.next(&[Value::from(vec![4.0, -100.0])], 0.5).unwrap();
        assert_eq!(x, vec![5.0, -10.0]);
    }
}
