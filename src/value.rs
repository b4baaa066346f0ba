//! Signal values carried on wires

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Value propagated along a wire.
///
/// Wire widths are checked on port counts at connect time; the width of a
/// vector value is checked by the consuming block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Scalar(f64),
    Vector(DVector<f64>),
}

impl Value {
    pub fn zeros(n: usize) -> Self {
        Value::Vector(DVector::zeros(n))
    }

    /// Number of elements carried
    pub fn width(&self) -> usize {
        match self {
            Value::Bool(_) | Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
        }
    }

    /// Scalar view; single-element vectors and booleans convert.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Vector(v) if v.len() == 1 => Some(v[0]),
            Value::Vector(_) => None,
        }
    }

    pub fn to_vector(&self) -> DVector<f64> {
        match self {
            Value::Scalar(x) => DVector::from_element(1, *x),
            Value::Bool(b) => DVector::from_element(1, if *b { 1.0 } else { 0.0 }),
            Value::Vector(v) => v.clone(),
        }
    }

    /// Elements as a flat list
    pub fn to_vec(&self) -> Vec<f64> {
        self.to_vector().iter().copied().collect()
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Value::Bool(_) => true,
            Value::Scalar(x) => x.is_finite(),
            Value::Vector(v) => v.iter().all(|x| x.is_finite()),
        }
    }

    /// True for `true` and for any non-zero element
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Scalar(x) => *x != 0.0,
            Value::Vector(v) => v.iter().any(|x| *x != 0.0),
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Bool(_) => Value::Scalar(f(self.as_f64().unwrap_or(0.0))),
            Value::Scalar(x) => Value::Scalar(f(*x)),
            Value::Vector(v) => Value::Vector(v.map(f)),
        }
    }

    /// Element-wise combination with scalar broadcasting. A one-element
    /// vector broadcasts like a scalar. `None` when both sides are longer
    /// vectors of different length.
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
        match (self, other) {
            (Value::Vector(a), Value::Vector(b)) if a.len() == b.len() => {
                Some(Value::Vector(a.zip_map(b, f)))
            }
            (Value::Vector(a), Value::Vector(b)) if b.len() == 1 => {
                let b = b[0];
                Some(Value::Vector(a.map(|x| f(x, b))))
            }
            (Value::Vector(a), Value::Vector(b)) if a.len() == 1 => {
                let a = a[0];
                Some(Value::Vector(b.map(|x| f(a, x))))
            }
            (Value::Vector(_), Value::Vector(_)) => None,
            (Value::Vector(a), b) => {
                let b = b.as_f64()?;
                Some(Value::Vector(a.map(|x| f(x, b))))
            }
            (a, Value::Vector(b)) => {
                let a = a.as_f64()?;
                Some(Value::Vector(b.map(|x| f(a, x))))
            }
            (a, b) => Some(Value::Scalar(f(a.as_f64()?, b.as_f64()?))),
        }
    }

    /// Build from a state slice, scalar when it has one element and
    /// `scalar` is set.
    pub fn from_slice(x: &[f64], scalar: bool) -> Value {
        if scalar && x.len() == 1 {
            Value::Scalar(x[0])
        } else {
            Value::Vector(DVector::from_column_slice(x))
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(0.0)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DVector<f64>> for Value {
    fn from(v: DVector<f64>) -> Self {
        Value::Vector(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(DVector::from_vec(v))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Scalar(x) => write!(f, "{x}"),
            Value::Vector(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}
