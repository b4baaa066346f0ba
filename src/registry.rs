//! Block construction by type name
//!
//! [`BlockRegistry::builtin`] maps upper-case type names to constructors
//! taking a JSON parameter map. The registry is an ordinary value passed to
//! [`BlockDiagram::add_from`](crate::diagram::BlockDiagram::add_from), so
//! callers may extend it with their own block types.

use std::collections::{BTreeMap, HashMap};

use nalgebra::DMatrix;
use serde_json::Value as Json;

use crate::block::Block;
use crate::blocks::{
    Clip, Constant, DIntegrator, Demux, Gain, InPort, Integrator, LtiSiso, LtiSs, Mux, Null,
    OutPort, Piecewise, Print, Prod, Ramp, Recorder, Step, Stop, Sum, Time, Wave, WaveForm, Zoh,
};
use crate::error::BlockError;
use crate::value::Value;

/// Parameters of a block, keyed by parameter name
pub type BlockParams = HashMap<String, Json>;

/// Builds a block from its parameters
pub type Constructor = fn(&BlockParams) -> Result<Box<dyn Block>, BlockError>;

/// Name to constructor map
#[derive(Clone, Default)]
pub struct BlockRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of every built-in block that can be described by data.
    /// `FUNCTION` and `SUBSYSTEM` take code or a diagram and are built
    /// directly instead.
    pub fn builtin() -> Self {
        let mut r = Self::new();
        r.register("CONSTANT", |p| {
            let value = match p.get("value") {
                Some(Json::Array(_)) => Value::from(vec_param(p, "value")?),
                _ => Value::Scalar(num(p, "value", 0.0)?),
            };
            Ok(Box::new(Constant::new(value)))
        });
        r.register("TIME", |_| Ok(Box::new(Time::new())));
        r.register("STEP", |p| {
            Ok(Box::new(Step::with_levels(
                num(p, "T", 1.0)?,
                num(p, "off", 0.0)?,
                num(p, "on", 1.0)?,
            )))
        });
        r.register("RAMP", |p| {
            Ok(Box::new(
                Ramp::new(num(p, "T", 1.0)?, num(p, "slope", 1.0)?)
                    .with_start(num(p, "start", 0.0)?),
            ))
        });
        r.register("WAVEFORM", |p| {
            let wave: Wave = match p.get("wave") {
                Some(w) => serde_json::from_value(w.clone())
                    .map_err(|e| BlockError::bad_parameter("wave", e.to_string()))?,
                None => Wave::Square,
            };
            let mut block = WaveForm::new(wave, num(p, "freq", 1.0)?)
                .with_amplitude(num(p, "amplitude", 1.0)?, num(p, "offset", 0.0)?)
                .with_phase(num(p, "phase", 0.0)?)
                .with_duty(num(p, "duty", 0.5)?);
            if p.contains_key("min") || p.contains_key("max") {
                block = block.with_limits(num(p, "min", -1.0)?, num(p, "max", 1.0)?);
            }
            Ok(Box::new(block))
        });
        r.register("PIECEWISE", |p| {
            let times = vec_param(p, "times")?;
            let values = vec_param(p, "values")?;
            if times.len() != values.len() {
                return Err(BlockError::bad_parameter(
                    "values",
                    format!("has {} entries, times has {}", values.len(), times.len()),
                ));
            }
            Ok(Box::new(Piecewise::new(times.into_iter().zip(values).collect())))
        });

        r.register("GAIN", |p| match p.get("K") {
            Some(Json::Array(_)) => Ok(Box::new(Gain::matrix(matrix_param(p, "K")?))),
            _ => Ok(Box::new(Gain::new(num(p, "K", 1.0)?))),
        });
        r.register("SUM", |p| Ok(Box::new(Sum::new(&text(p, "signs", "++")?))));
        r.register("PROD", |p| Ok(Box::new(Prod::new(&text(p, "ops", "**")?))));
        r.register("CLIP", |p| {
            Ok(Box::new(Clip::new(
                num(p, "min", f64::NEG_INFINITY)?,
                num(p, "max", f64::INFINITY)?,
            )))
        });
        r.register("MUX", |p| Ok(Box::new(Mux::new(count(p, "n", 2)?))));
        r.register("DEMUX", |p| Ok(Box::new(Demux::new(count(p, "n", 2)?))));

        r.register("INTEGRATOR", |p| {
            let mut block = match p.get("x0") {
                Some(Json::Array(_)) => Integrator::vector(vec_param(p, "x0")?),
                _ => Integrator::new(num(p, "x0", 0.0)?),
            };
            if p.contains_key("min") || p.contains_key("max") {
                block = block.with_limits(vec_param(p, "min")?, vec_param(p, "max")?);
            }
            Ok(Box::new(block))
        });
        r.register("LTI_SS", |p| {
            let mut block = LtiSs::new(
                matrix_param(p, "A")?,
                matrix_param(p, "B")?,
                matrix_param(p, "C")?,
            );
            if p.contains_key("x0") {
                block = block.with_initial(vec_param(p, "x0")?);
            }
            Ok(Box::new(block))
        });
        r.register("LTI_SISO", |p| {
            let mut block = LtiSiso::new(&vec_param(p, "num")?, &vec_param(p, "den")?);
            if p.contains_key("x0") {
                block = block.with_initial(vec_param(p, "x0")?);
            }
            Ok(Box::new(block))
        });

        r.register("ZOH", |p| match p.get("x0") {
            Some(Json::Array(_)) => Ok(Box::new(Zoh::vector(vec_param(p, "x0")?))),
            _ => Ok(Box::new(Zoh::new(num(p, "x0", 0.0)?))),
        });
        r.register("DINTEGRATOR", |p| {
            let mut block = match p.get("x0") {
                Some(Json::Array(_)) => DIntegrator::vector(vec_param(p, "x0")?),
                _ => DIntegrator::new(num(p, "x0", 0.0)?),
            }
            .with_gain(num(p, "gain", 1.0)?);
            if p.contains_key("min") || p.contains_key("max") {
                block = block.with_limits(vec_param(p, "min")?, vec_param(p, "max")?);
            }
            Ok(Box::new(block))
        });

        r.register("NULL", |p| Ok(Box::new(Null::new(count(p, "nin", 1)?))));
        r.register("PRINT", |p| Ok(Box::new(Print::new(text(p, "label", "")?))));
        r.register("STOP", |_| Ok(Box::new(Stop::new())));
        r.register("RECORDER", |p| {
            Ok(Box::new(Recorder::new(count(p, "nin", 1)?)))
        });
        r.register("INPORT", |p| Ok(Box::new(InPort::new(count(p, "n", 1)?))));
        r.register("OUTPORT", |p| Ok(Box::new(OutPort::new(count(p, "n", 1)?))));
        r
    }

    /// Add or replace a constructor
    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct a block. Unknown names are [`BlockError::UnknownType`].
    pub fn create(&self, name: &str, params: &BlockParams) -> Result<Box<dyn Block>, BlockError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| BlockError::UnknownType(name.to_string()))?;
        constructor(params)
    }
}

fn num(p: &BlockParams, key: &str, default: f64) -> Result<f64, BlockError> {
    match p.get(key) {
        None | Some(Json::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| BlockError::bad_parameter(key, format!("expected a number, got {}", v))),
    }
}

fn count(p: &BlockParams, key: &str, default: usize) -> Result<usize, BlockError> {
    match p.get(key) {
        None | Some(Json::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| BlockError::bad_parameter(key, format!("expected a count, got {}", v))),
    }
}

fn text(p: &BlockParams, key: &str, default: &str) -> Result<String, BlockError> {
    match p.get(key) {
        None | Some(Json::Null) => Ok(default.to_string()),
        Some(v) => v
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BlockError::bad_parameter(key, format!("expected a string, got {}", v))),
    }
}

/// A number or an array of numbers, as a vector
fn vec_param(p: &BlockParams, key: &str) -> Result<Vec<f64>, BlockError> {
    let bad = || BlockError::bad_parameter(key, "expected a number or an array of numbers");
    match p.get(key) {
        Some(Json::Array(items)) => items.iter().map(|v| v.as_f64().ok_or_else(bad)).collect(),
        Some(v) => Ok(vec![v.as_f64().ok_or_else(bad)?]),
        None => Err(BlockError::bad_parameter(key, "is required")),
    }
}

/// An array of equal-length rows
fn matrix_param(p: &BlockParams, key: &str) -> Result<DMatrix<f64>, BlockError> {
    let bad = |reason: &str| BlockError::bad_parameter(key, reason.to_string());
    let rows = match p.get(key) {
        Some(Json::Array(rows)) => rows,
        Some(_) => return Err(bad("expected an array of rows")),
        None => return Err(bad("is required")),
    };
    let rows: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| match row {
            Json::Array(items) => items
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| bad("entries must be numbers")))
                .collect(),
            v => v
                .as_f64()
                .map(|x| vec![x])
                .ok_or_else(|| bad("entries must be numbers")),
        })
        .collect::<Result<_, _>>()?;
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(bad("rows must have equal length"));
    }
    Ok(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Json) -> BlockParams {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_builtin_constructs_blocks() {
        let r = BlockRegistry::builtin();
        let gain = r.create("GAIN", &params(json!({"K": 2.5}))).unwrap();
        assert_eq!(gain.type_name(), "gain");
        assert_eq!(gain.output(0.0, &[Value::Scalar(2.0)]).unwrap(), vec![Value::Scalar(5.0)]);

        let sum = r.create("SUM", &params(json!({"signs": "+-+"}))).unwrap();
        assert_eq!(sum.nin(), 3);

        let ss = r
            .create(
                "LTI_SS",
                &params(json!({"A": [[0, 1], [-1, 0]], "B": [[0], [1]], "C": [[1, 0]]})),
            )
            .unwrap();
        assert_eq!(ss.nstates(), 2);
        assert!(r.names().any(|n| n == "DINTEGRATOR"));
    }

    #[test]
    fn test_unknown_type_and_bad_params() {
        let r = BlockRegistry::builtin();
        assert_eq!(
            r.create("NOPE", &BlockParams::new()).unwrap_err(),
            BlockError::UnknownType("NOPE".into())
        );
        assert!(matches!(
            r.create("GAIN", &params(json!({"K": "big"}))).unwrap_err(),
            BlockError::BadParameter { .. }
        ));
        assert!(r
            .create("LTI_SS", &params(json!({"A": [[0, 1], [1]]})))
            .is_err());
    }

    #[test]
    fn test_custom_registration() {
        let mut r = BlockRegistry::new();
        r.register("ONE", |_| Ok(Box::new(Constant::new(1.0))));
        assert!(r.contains("ONE"));
        assert!(!r.contains("GAIN"));
    }
}
