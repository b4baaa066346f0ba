//! Transfer blocks: continuous state advanced by the ODE solver
//!
//! Outputs depend on the state only, never on the current inputs, so a
//! transfer block breaks every algebraic path through it.

use nalgebra::{DMatrix, DVector};

use crate::block::{vector_input, Block, BlockClass};
use crate::block_boilerplate;
use crate::error::BlockError;
use crate::value::Value;

/// Integrator: dx/dt = u, with optional per-element limits.
///
/// At a limit the derivative is zeroed when it would push the state further
/// out of range.
#[derive(Debug, Clone)]
pub struct Integrator {
    x0: Vec<f64>,
    x: Vec<f64>,
    scalar: bool,
    min: Option<Vec<f64>>,
    max: Option<Vec<f64>>,
}

impl Integrator {
    /// Scalar integrator with initial value `x0`
    pub fn new(x0: f64) -> Self {
        Self {
            x0: vec![x0],
            x: vec![x0],
            scalar: true,
            min: None,
            max: None,
        }
    }

    /// Vector integrator
    pub fn vector(x0: Vec<f64>) -> Self {
        Self {
            x: x0.clone(),
            x0,
            scalar: false,
            min: None,
            max: None,
        }
    }

    pub fn with_limits(mut self, min: Vec<f64>, max: Vec<f64>) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

impl Block for Integrator {
    fn type_name(&self) -> &'static str {
        "integrator"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Transfer
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        1
    }

    fn nstates(&self) -> usize {
        self.x0.len()
    }

    fn check(&self) -> Result<(), BlockError> {
        let n = self.x0.len();
        if n == 0 {
            return Err(BlockError::bad_parameter("x0", "must not be empty"));
        }
        for (name, limit) in [("min", &self.min), ("max", &self.max)] {
            if let Some(limit) = limit {
                if limit.len() != n {
                    return Err(BlockError::bad_parameter(
                        name,
                        format!("has {} elements, state has {}", limit.len(), n),
                    ));
                }
            }
        }
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            if min.iter().zip(max).any(|(lo, hi)| lo > hi) {
                return Err(BlockError::bad_parameter("min", "exceeds max"));
            }
        }
        Ok(())
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        Ok(vec![Value::from_slice(&self.x, self.scalar)])
    }

    fn deriv(&self, _t: f64, inputs: &[Value]) -> Result<Vec<f64>, BlockError> {
        let mut xd = vector_input(inputs, 0, self.x.len())?;
        for (i, d) in xd.iter_mut().enumerate() {
            let at_max = self.max.as_ref().is_some_and(|m| self.x[i] >= m[i]);
            let at_min = self.min.as_ref().is_some_and(|m| self.x[i] <= m[i]);
            if (at_max && *d > 0.0) || (at_min && *d < 0.0) {
                *d = 0.0;
            }
        }
        Ok(xd)
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

/// Linear time-invariant system in state-space form:
/// dx/dt = A x + B u, y = C x
#[derive(Debug, Clone)]
pub struct LtiSs {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c: DMatrix<f64>,
    x0: DVector<f64>,
    x: DVector<f64>,
}

impl LtiSs {
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>, c: DMatrix<f64>) -> Self {
        let n = a.nrows();
        Self {
            a,
            b,
            c,
            x0: DVector::zeros(n),
            x: DVector::zeros(n),
        }
    }

    pub fn with_initial(mut self, x0: Vec<f64>) -> Self {
        self.x0 = DVector::from_vec(x0);
        self.x = self.x0.clone();
        self
    }
}

impl Block for LtiSs {
    fn type_name(&self) -> &'static str {
        "lti_ss"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Transfer
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        1
    }

    fn nstates(&self) -> usize {
        self.a.nrows()
    }

    fn check(&self) -> Result<(), BlockError> {
        let n = self.a.nrows();
        if self.a.ncols() != n {
            return Err(BlockError::bad_parameter("A", "must be square"));
        }
        if self.b.nrows() != n {
            return Err(BlockError::bad_parameter(
                "B",
                format!("must have {} rows", n),
            ));
        }
        if self.c.ncols() != n {
            return Err(BlockError::bad_parameter(
                "C",
                format!("must have {} columns", n),
            ));
        }
        if self.x0.len() != n {
            return Err(BlockError::bad_parameter(
                "x0",
                format!("has {} elements, state has {}", self.x0.len(), n),
            ));
        }
        Ok(())
    }

    fn output(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        let y = &self.c * &self.x;
        Ok(vec![Value::from_slice(y.as_slice(), true)])
    }

    fn deriv(&self, _t: f64, inputs: &[Value]) -> Result<Vec<f64>, BlockError> {
        let u = DVector::from_vec(vector_input(inputs, 0, self.b.ncols())?);
        let xd = &self.a * &self.x + &self.b * u;
        Ok(xd.as_slice().to_vec())
    }

    fn state(&self) -> Vec<f64> {
        self.x.as_slice().to_vec()
    }

    fn set_state(&mut self, x: &[f64]) {
        self.x.copy_from_slice(x);
    }

    fn initial_state(&self) -> Vec<f64> {
        self.x0.as_slice().to_vec()
    }

    block_boilerplate!();
}

/// Strictly proper SISO transfer function `num(s) / den(s)`, coefficients
/// in descending powers of s. Realized in controllable canonical form.
#[derive(Debug, Clone)]
pub struct LtiSiso {
    ss: LtiSs,
    invalid: Option<String>,
}

impl LtiSiso {
    pub fn new(num: &[f64], den: &[f64]) -> Self {
        match Self::realize(num, den) {
            Ok(ss) => Self { ss, invalid: None },
            Err(reason) => {
                let empty = DMatrix::zeros(0, 0);
                Self {
                    ss: LtiSs::new(empty.clone(), DMatrix::zeros(0, 1), DMatrix::zeros(1, 0)),
                    invalid: Some(reason),
                }
            }
        }
    }

    pub fn with_initial(mut self, x0: Vec<f64>) -> Self {
        self.ss = self.ss.with_initial(x0);
        self
    }

    fn realize(num: &[f64], den: &[f64]) -> Result<LtiSs, String> {
        // strip leading zeros
        let den: Vec<f64> = den.iter().copied().skip_while(|c| *c == 0.0).collect();
        let num: Vec<f64> = num.iter().copied().skip_while(|c| *c == 0.0).collect();
        if den.len() < 2 {
            return Err("denominator must have degree of at least 1".into());
        }
        let n = den.len() - 1;
        if num.len() > n {
            return Err(format!(
                "numerator degree {} must be less than denominator degree {}",
                num.len().saturating_sub(1),
                n
            ));
        }
        let lead = den[0];

        let mut a = DMatrix::zeros(n, n);
        for j in 0..n {
            a[(0, j)] = -den[j + 1] / lead;
        }
        for i in 1..n {
            a[(i, i - 1)] = 1.0;
        }
        let mut b = DMatrix::zeros(n, 1);
        b[(0, 0)] = 1.0;
        let mut c = DMatrix::zeros(1, n);
        let pad = n - num.len();
        for (k, coef) in num.iter().enumerate() {
            c[(0, pad + k)] = coef / lead;
        }
        Ok(LtiSs::new(a, b, c))
    }
}

impl Block for LtiSiso {
    fn type_name(&self) -> &'static str {
        "lti_siso"
    }

    fn class(&self) -> BlockClass {
        BlockClass::Transfer
    }

    fn nin(&self) -> usize {
        1
    }

    fn nout(&self) -> usize {
        1
    }

    fn nstates(&self) -> usize {
        self.ss.nstates()
    }

    fn check(&self) -> Result<(), BlockError> {
        if let Some(reason) = &self.invalid {
            return Err(BlockError::bad_parameter("num/den", reason.clone()));
        }
        self.ss.check()
    }

    fn output(&self, t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
        self.ss.output(t, inputs)
    }

    fn deriv(&self, t: f64, inputs: &[Value]) -> Result<Vec<f64>, BlockError> {
        self.ss.deriv(t, inputs)
    }

    fn state(&self) -> Vec<f64> {
        self.ss.state()
    }

    fn set_state(&mut self, x: &[f64]) {
        self.ss.set_state(x)
    }

    fn initial_state(&self) -> Vec<f64> {
        self.ss.initial_state()
    }

    block_boilerplate!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_integrator_limits() {
        let mut int = Integrator::new(0.0).with_limits(vec![-1.0], vec![1.0]);
        assert!(int.check().is_ok());
        assert_eq!(int.deriv(0.0, &[Value::Scalar(2.0)]).unwrap(), vec![2.0]);

        int.set_state(&[1.0]);
        assert_eq!(int.deriv(0.0, &[Value::Scalar(2.0)]).unwrap(), vec![0.0]);
        assert_eq!(int.deriv(0.0, &[Value::Scalar(-2.0)]).unwrap(), vec![-2.0]);
        assert_eq!(int.output(0.0, &[]).unwrap(), vec![Value::Scalar(1.0)]);
    }

    #[test]
    fn test_integrator_check() {
        let bad = Integrator::vector(vec![0.0, 0.0]).with_limits(vec![0.0], vec![1.0, 1.0]);
        assert!(bad.check().is_err());
        assert!(Integrator::vector(vec![]).check().is_err());

        let v = Integrator::vector(vec![1.0, 2.0]);
        assert_eq!(v.nstates(), 2);
        assert_eq!(v.output(0.0, &[]).unwrap(), vec![Value::from(vec![1.0, 2.0])]);
        assert!(v.deriv(0.0, &[Value::Scalar(1.0)]).is_err());
    }

    #[test]
    fn test_siso_canonical_form() {
        // 2 / (s^2 + 3s + 2)
        let mut tf = LtiSiso::new(&[2.0], &[1.0, 3.0, 2.0]);
        assert!(tf.check().is_ok());
        assert_eq!(tf.nstates(), 2);

        tf.set_state(&[1.0, 0.5]);
        let xd = tf.deriv(0.0, &[Value::Scalar(1.0)]).unwrap();
        assert_relative_eq!(xd[0], -3.0 * 1.0 - 2.0 * 0.5 + 1.0);
        assert_relative_eq!(xd[1], 1.0);
        let y = tf.output(0.0, &[]).unwrap()[0].as_f64().unwrap();
        assert_relative_eq!(y, 1.0);
    }

    #[test]
    fn test_siso_rejects_improper() {
        assert!(LtiSiso::new(&[1.0, 0.0], &[1.0, 1.0]).check().is_err());
        assert!(LtiSiso::new(&[1.0], &[2.0]).check().is_err());
        assert!(LtiSiso::new(&[0.5], &[2.0, 1.0]).check().is_ok());
    }

    #[test]
    fn test_ss_dimension_check() {
        let ss = LtiSs::new(
            DMatrix::identity(2, 2),
            DMatrix::zeros(3, 1),
            DMatrix::zeros(1, 2),
        );
        assert!(ss.check().is_err());
    }
}
