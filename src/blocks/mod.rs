//! Block library

mod connections;
mod discrete;
mod functions;
mod sinks;
mod sources;
mod transfers;

pub use connections::{InPort, OutPort, Subsystem};
pub use discrete::{DIntegrator, Zoh};
pub use functions::{Clip, Demux, Function, Gain, Mux, Prod, Sum, UserFn};
pub use sinks::{Null, Print, Recorder, Stop};
pub use sources::{Constant, Piecewise, Ramp, Step, Time, Wave, WaveForm};
pub use transfers::{Integrator, LtiSiso, LtiSs};
