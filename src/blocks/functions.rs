//! Stateless function blocks: output is a pure function of the inputs

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::block::{input, scalar_input, Block, BlockClass};
use crate::block_boilerplate;
use crate::error::BlockError;
use crate::param::Tunable;
use crate::value::Value;

#[derive(Debug, Clone)]
enum GainKind {
    Scalar(Tunable),
    Matrix(DMatrix<f64>),
}

/// Gain: y = K u, with scalar or matrix K
#[derive(Debug, Clone)]
pub struct Gain {
    k: GainKind,
}

impl Gain {
    /// Scalar gain, fixed or bound to a [`crate::param::Param`]
    pub fn new(k: impl Into<Tunable>) -> Self {
        Self {
            k: GainKind::Scalar(k.into()),
        }
    }

    /// Matrix gain applied on the left of a vector input
    pub fn matrix(k: DMatrix<f64>) -> Self {
        Self {
            k: GainKind::Matrix(k),
        }
    }

    pub fn set_gain(&mut self, k: impl Into<Tunable>) {
        self.k = GainKind::Scalar(k.into());
    }
}

impl Block for Gain {
    fn type_name(&self) -> &'static str {
        "gain"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Function
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        1
    }

    fn output(&self, _t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let u = input(inputs, 0)?;
        let y = match &self.k {
            GainKind::Scalar(k) => {
                let k = k.get();
                u.map(|x| k * x)
            }
            GainKind::Matrix(k) => {
                let u = u.to_vector();
                if u.len() != k.ncols() {
                    return Err(BlockError::InputWidth {
                        port: 0,
                        expected: k.ncols(),
                        got: u.len(),
                    });
                }
                Value::Vector(k * u)
            }
        };
        Ok(vec![y])
    }

    block_boilerplate!();
}

/// Signed sum of inputs, one input per sign character in `signs`
#[derive(Debug, Clone)]
pub struct Sum {
    signs: String,
}

impl Sum {
    /// `signs` is a string such as `"+-+"`
    pub fn new(signs: &str) -> Self {
        Self {
            signs: signs.to_string(),
        }
    }

    fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.signs
            .chars()
            .map(|c| if c == '-' { -1.0 } else { 1.0 })
    }
}

impl Block for Sum {
    fn type_name(&self) -> &'static str {
        "sum"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Function
    }

    fn nin(&self) -> usize {
        self.signs.chars().count()
    }

    fn nout(&self) -> usize {
        1
    }

    fn check(&self) -> Result<(), BlockError> {
        if self.signs.is_empty() || self.signs.chars().any(|c| c != '+' && c != '-') {
            return Err(BlockError::bad_parameter(
                "signs",
                format!("`{}` must be a non-empty string of + and -", self.signs),
            ));
        }
        Ok(())
    }

    fn output(&self, _t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let mut acc = Value::Scalar(0.0);
        for (port, w) in self.weights().enumerate() {
            let u = input(inputs, port)?;
            acc = acc
                .zip_with(u, |a, b| a + w * b)
                .ok_or(BlockError::InputWidth {
                    port,
                    expected: acc.width(),
                    got: u.width(),
                })?;
        }
        Ok(vec![acc])
    }

    block_boilerplate!();
}

/// Element-wise product and quotient of inputs, one input per `*` or `/`
#[derive(Debug, Clone)]
pub struct Prod {
    ops: String,
}

impl Prod {
    pub fn new(ops: &str) -> Self {
        Self {
            ops: ops.to_string(),
        }
    }
}

impl Block for Prod {
    fn type_name(&self) -> &'static str {
        "prod"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Function
    }

    fn nin(&self) -> usize {
        self.ops.chars().count()
    }

    fn nout(&self) -> usize {
        1
    }

    fn check(&self) -> Result<(), BlockError> {
        if self.ops.is_empty() || self.ops.chars().any(|c| c != '*' && c != '/') {
            return Err(BlockError::bad_parameter(
                "ops",
                format!("`{}` must be a non-empty string of * and /", self.ops),
            ));
        }
        Ok(())
    }

    fn output(&self, _t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let mut acc = Value::Scalar(1.0);
        for (port, op) in self.ops.chars().enumerate() {
            let u = input(inputs, port)?;
            let next = if op == '/' {
                acc.zip_with(u, |a, b| a / b)
            } else {
                acc.zip_with(u, |a, b| a * b)
            };
            acc = next.ok_or(BlockError::InputWidth {
                port,
                expected: acc.width(),
                got: u.width(),
            })?;
        }
        Ok(vec![acc])
    }

    block_boilerplate!();
}

/// Saturation to `[min, max]`
#[derive(Debug, Clone)]
pub struct Clip {
    min: f64,
    max: f64,
}

impl Clip {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Block for Clip {
    fn type_name(&self) -> &'static str {
        "clip"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Function
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        1
    }

    fn check(&self) -> Result<(), BlockError> {
        if self.min > self.max {
            return Err(BlockError::bad_parameter("min", "must not exceed max"));
        }
        Ok(())
    }

    fn output(&self, _t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let (lo, hi) = (self.min, self.max);
        Ok(vec![input(inputs, 0)?.map(|x| x.clamp(lo, hi))])
    }

    block_boilerplate!();
}

/// User function signature for [`Function`] blocks
pub type UserFn = dyn Fn(&[Value]) -> Result<Vec<Value>, BlockError> + Send + Sync;

/// Arbitrary stateless function of `nin` inputs to `nout` outputs
#[derive(Clone)]
pub struct Function {
    f: Arc<UserFn>,
    nin: usize,
    nout: usize,
}

impl Function {
    pub fn new<F>(nin: usize, nout: usize, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, BlockError> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            nin,
            nout,
        }
    }

    /// Single-input, single-output scalar function
    pub fn scalar<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::new(1, 1, move |u| Ok(vec![Value::Scalar(f(scalar_input(u, 0)?))]))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("nin", &self.nin)
            .field("nout", &self.nout)
            .finish_non_exhaustive()
    }
}

impl Block for Function {
    fn type_name(&self) -> &'static str {
        "function"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Function
    }

    fn nin(&self) -> usize {
        self.nin
    }

    fn nout(&self) -> usize {
        self.nout
    }

    // a zero-input function never becomes ready, so it would never fire
    fn check(&self) -> Result<(), BlockError> {
        if self.nin == 0 {
            return Err(BlockError::bad_parameter("nin", "must be at least 1"));
        }
        Ok(())
    }

    fn output(&self, _t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let out = (self.f)(inputs)?;
        if out.len() != self.nout {
            return Err(BlockError::Failed(format!(
                "function returned {} outputs, expected {}",
                out.len(),
                self.nout
            )));
        }
        Ok(out)
    }

    block_boilerplate!();
}

/// Concatenate `n` inputs into one vector
#[derive(Debug, Clone)]
pub struct Mux {
    n: usize,
}

impl Mux {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Block for Mux {
    fn type_name(&self) -> &'static str {
        "mux"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Function
    }

    fn nin(&self) -> usize {
        self.n
    }

    fn nout(&self) -> usize {
        1
    }

    fn output(&self, _t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let mut out = Vec::new();
        for port in 0..self.n {
            out.extend(input(inputs, port)?.to_vec());
        }
        Ok(vec![Value::Vector(DVector::from_vec(out))])
    }

    block_boilerplate!();
}

/// Split a vector of width `n` into `n` scalar outputs
#[derive(Debug, Clone)]
pub struct Demux {
    n: usize,
}

impl Demux {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Block for Demux {
    fn type_name(&self) -> &'static str {
        "demux"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Function
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        self.n
    }

    fn output(&self, _t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let u = input(inputs, 0)?.to_vec();
        if u.len() != self.n {
            return Err(BlockError::InputWidth {
                port: 0,
                expected: self.n,
                got: u.len(),
            });
        }
        Ok(u.into_iter().map(Value::Scalar).collect())
    }

    block_boilerplate!();
}
