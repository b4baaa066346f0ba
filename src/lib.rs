//! flowsim - block-diagram simulation of hybrid dynamical systems
//!
//! A model is a [`BlockDiagram`]: blocks connected by wires, optionally
//! driven by periodic clocks and nested through subsystems. Compiling the
//! diagram flattens subsystems, checks wiring and clock rates, rejects
//! algebraic loops and lays out the continuous state vector. A compiled
//! diagram can then be
//!
//! - evaluated directly as `dx/dt = f(x, t)` with [`BlockDiagram::evaluate`],
//! - integrated offline with [`BlockDiagram::run_batch`], or
//! - executed against the wall clock with [`BlockDiagram::run_realtime`].
//!
//! # Example
//!
//! ```rust,ignore
//! use flowsim::prelude::*;
//!
//! let mut bd = BlockDiagram::new();
//! let step = bd.add(Step::new(1.0));
//! let x = bd.add(Integrator::new(0.0));
//! let out = bd.add(Null::new(1));
//! bd.connect(step, x)?;
//! bd.connect(x, out)?;
//! bd.compile()?;
//!
//! let trace = bd.run_batch(5.0, Some(0.01), &SimOptions::default(), &[x.into()])?;
//! println!("x(5) = {:?}", trace.state("integrator.0x0").and_then(|x| x.last().copied()));
//! ```

pub mod block;
pub mod blocks;
pub mod diagram;
pub mod error;
pub mod events;
pub mod param;
pub mod plug;
pub mod registry;
pub mod sim;
pub mod solvers;
pub mod utils;
pub mod value;

pub use block::{Block, BlockClass};
pub use diagram::BlockDiagram;
pub use error::{BlockError, CompileError, RunFailure, RuntimeError, SolverError};
pub use plug::{BlockId, ClockId, Plug, WireId};
pub use registry::{BlockParams, BlockRegistry};
pub use sim::{RealTimeOptions, RunState, SimOptions, Trace, Watch};
pub use value::Value;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::block::{Block, BlockClass};
    pub use crate::blocks::*;
    pub use crate::diagram::BlockDiagram;
    pub use crate::error::{BlockError, CompileError, RunFailure, RuntimeError};
    pub use crate::param::{Param, Tunable};
    pub use crate::plug::{BlockId, ClockId, Plug};
    pub use crate::registry::{BlockParams, BlockRegistry};
    pub use crate::sim::{RealTimeOptions, RunState, SimOptions, Trace, Watch};
    pub use crate::solvers::{SolverKind, SolverOptions};
    pub use crate::value::Value;
}
