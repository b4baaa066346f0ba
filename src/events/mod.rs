//! Discrete-time events: periodic clocks and the queue that merges them

mod clock;
mod queue;

pub use clock::{commensurate, Clock, ClockTrace};
pub use queue::{EventQueue, EventSource};
