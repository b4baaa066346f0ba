//! Block contract
//!
//! Every node of a diagram implements [`Block`]. The diagram arena owns the
//! per-block input cache, wiring and bookkeeping; a block only sees its
//! inputs as a slice and owns its parameters plus, for transfer and clocked
//! blocks, its own slice of simulation state.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Debug, Clone)]
//! pub struct Double;
//!
//! impl Block for Double {
//!     fn type_name(&self) -> &'static str { "double" }
//!     fn class(&self) -> BlockClass { BlockClass::Function }
//!     fn nin(&self) -> usize { 1 }
//!     fn nout(&self) -> usize { 1 }
//!
//!     fn output(&self, _t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError> {
//!         Ok(vec![inputs[0].map(|x| 2.0 * x)])
//!     }
//!
//!     block_boilerplate!();
//! }
//! ```

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagram::BlockDiagram;
use crate::error::BlockError;
use crate::sim::RunState;
use crate::value::Value;

/// Variant tag of a block, used by the compiler and schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockClass {
    /// Output depends on time only
    Source,
    /// Consumes inputs, no outputs
    Sink,
    /// Stateless, output is a pure function of the inputs
    Function,
    /// Owns continuous state advanced by the ODE solver
    Transfer,
    /// Owns discrete state updated at clock ticks
    Clocked,
    /// Nested diagram, flattened away at compile time
    Subsystem,
    InPort,
    OutPort,
}

impl BlockClass {
    /// Output is independent of the inputs within one evaluation
    pub fn is_root(self) -> bool {
        matches!(
            self,
            BlockClass::Source | BlockClass::Transfer | BlockClass::Clocked
        )
    }

    /// Fires as soon as all of its inputs are known
    pub fn is_combinational(self) -> bool {
        matches!(self, BlockClass::Function | BlockClass::Subsystem)
    }
}

impl fmt::Display for BlockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockClass::Source => "source",
            BlockClass::Sink => "sink",
            BlockClass::Function => "function",
            BlockClass::Transfer => "transfer",
            BlockClass::Clocked => "clocked",
            BlockClass::Subsystem => "subsystem",
            BlockClass::InPort => "inport",
            BlockClass::OutPort => "outport",
        };
        f.write_str(s)
    }
}

/// Capability interface implemented by every block variant.
pub trait Block: Send {
    /// Short type name, used for default block names
    fn type_name(&self) -> &'static str;

    fn class(&self) -> BlockClass;

    /// Number of input ports
    fn nin(&self) -> usize;

    /// Number of output ports
    fn nout(&self) -> usize;

    /// Continuous state width (transfer blocks)
    fn nstates(&self) -> usize {
        0
    }

    /// Discrete state width (clocked blocks)
    fn ndstates(&self) -> usize {
        0
    }

    /// Validate parameters before a run
    fn check(&self) -> Result<(), BlockError> {
        Ok(())
    }

    /// Called once before a run starts
    fn start(&mut self) -> Result<(), BlockError> {
        Ok(())
    }

    /// Called once after a run ends, whether or not it succeeded
    fn done(&mut self) {}

    /// Compute the `nout` outputs.
    ///
    /// Source, transfer and clocked blocks receive an empty slice: their
    /// output depends on time or internal state only. Function, subsystem
    /// and sink blocks receive all `nin` inputs.
    fn output(&self, t: f64, inputs: &[Value]) -> Result<Vec<Value>, BlockError>;

    /// State derivative (transfer blocks), `nstates` long
    fn deriv(&self, _t: f64, _inputs: &[Value]) -> Result<Vec<f64>, BlockError> {
        Ok(Vec::new())
    }

    /// Current continuous or discrete state
    fn state(&self) -> Vec<f64> {
        Vec::new()
    }

    /// Overwrite the continuous or discrete state
    fn set_state(&mut self, _x: &[f64]) {}

    /// State at the start of a run
    fn initial_state(&self) -> Vec<f64> {
        Vec::new()
    }

    /// Next discrete state at a clock tick (clocked blocks). `period` is the
    /// period of the owning clock.
    fn next(&mut self, _inputs: &[Value], _period: f64) -> Result<Vec<f64>, BlockError> {
        Ok(self.state())
    }

    /// Act on stabilized inputs once per accepted time step (sinks)
    fn step(&mut self, _t: f64, _inputs: &[Value], _run: &mut RunState) -> Result<(), BlockError> {
        Ok(())
    }

    /// Nested diagram of a subsystem block
    fn subsystem(&self) -> Option<&BlockDiagram> {
        None
    }

    fn box_clone(&self) -> Box<dyn Block>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn Block> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl fmt::Debug for dyn Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.type_name())
            .field("class", &self.class())
            .field("nin", &self.nin())
            .field("nout", &self.nout())
            .finish()
    }
}

/// Implements the `box_clone`/`as_any`/`as_any_mut` trio for a `Clone` block.
#[macro_export]
macro_rules! block_boilerplate {
    () => {
        fn box_clone(&self) -> Box<dyn $crate::block::Block> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

/// Input `port`, or an error naming the port
pub fn input(inputs: &[Value], port: usize) -> Result<&Value, BlockError> {
    inputs.get(port).ok_or(BlockError::InputWidth {
        port,
        expected: port + 1,
        got: inputs.len(),
    })
}

/// Input `port` as a scalar
pub fn scalar_input(inputs: &[Value], port: usize) -> Result<f64, BlockError> {
    input(inputs, port)?.as_f64().ok_or(BlockError::InputType {
        port,
        expected: "a scalar",
    })
}

/// Input `port` as a vector of exactly `n` elements; scalars broadcast when
/// `n` is 1.
pub fn vector_input(inputs: &[Value], port: usize, n: usize) -> Result<Vec<f64>, BlockError> {
    let v = input(inputs, port)?.to_vec();
    if v.len() != n {
        return Err(BlockError::InputWidth {
            port,
            expected: n,
            got: v.len(),
        });
    }
    Ok(v)
}
