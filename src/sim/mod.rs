//! Simulation runs: batch integration and real-time execution

mod batch;
mod realtime;
mod trace;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use batch::BatchScheduler;
pub use realtime::{RealTimeOptions, RealTimeScheduler, RealTimeStats};
pub use trace::{RunStats, Trace};

use crate::diagram::BlockDiagram;
use crate::error::{RunFailure, RuntimeError};
use crate::plug::{BlockId, Endpoint, Plug};
use crate::solvers::{SolverKind, SolverOptions};

/// Mutable state of the active run, shared with sinks at every step.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Time of the current step
    pub t: f64,
    /// Diagram evaluations so far
    pub count: usize,
    stop: bool,
    pub(crate) stopped_by: Option<String>,
}

impl RunState {
    /// Ask the scheduler to end the run at the next safe boundary
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    /// Request a stop on behalf of a named block
    pub fn stop(&mut self, by: impl Into<String>) {
        self.stop = true;
        self.stopped_by.get_or_insert_with(|| by.into());
    }

    pub fn stop_requested(&self) -> bool {
        self.stop
    }

    pub fn stopped_by(&self) -> Option<&str> {
        self.stopped_by.as_deref()
    }
}

/// Batch run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    pub solver: SolverKind,
    #[serde(flatten)]
    pub solver_options: SolverOptions,
    /// Fail the run on any non-finite propagated value
    pub check_finite: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            solver: SolverKind::default(),
            solver_options: SolverOptions::default(),
            check_finite: false,
        }
    }
}

impl SimOptions {
    pub fn with_solver(solver: SolverKind) -> Self {
        Self {
            solver,
            ..Default::default()
        }
    }
}

/// A signal to record during a run: an output plug, or a block name with an
/// optional port as in `"gain.0[1]"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Watch {
    Plug(Plug),
    Name(String),
}

impl From<Plug> for Watch {
    fn from(plug: Plug) -> Self {
        Watch::Plug(plug)
    }
}

impl From<BlockId> for Watch {
    fn from(id: BlockId) -> Self {
        Watch::Plug(id.into())
    }
}

impl From<&str> for Watch {
    fn from(name: &str) -> Self {
        Watch::Name(name.to_string())
    }
}

impl From<String> for Watch {
    fn from(name: String) -> Self {
        Watch::Name(name)
    }
}

impl fmt::Display for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watch::Plug(plug) => write!(f, "{}", plug),
            Watch::Name(name) => f.write_str(name),
        }
    }
}

/// Split `"name[port]"` into its parts; a bare name means port 0
fn parse_signal(signal: &str) -> Option<(&str, usize)> {
    match signal.strip_suffix(']') {
        Some(head) => {
            let (name, port) = head.rsplit_once('[')?;
            Some((name, port.trim().parse().ok()?))
        }
        None => Some((signal, 0)),
    }
}

impl Watch {
    /// Resolve to labelled output endpoints of a compiled diagram
    pub(crate) fn resolve(
        &self,
        bd: &BlockDiagram,
    ) -> Result<Vec<(String, Endpoint)>, RuntimeError> {
        let unknown = || RuntimeError::UnknownSignal {
            name: self.to_string(),
        };
        let (block, ports) = match self {
            Watch::Plug(plug) => (plug.block, plug.portlist()),
            Watch::Name(signal) => {
                let (name, port) = parse_signal(signal).ok_or_else(unknown)?;
                (bd.block_by_name(name).ok_or_else(unknown)?, vec![port])
            }
        };
        let name = bd.name(block).ok_or_else(unknown)?;
        let nout = bd.block(block).map_or(0, |b| b.nout());
        ports
            .into_iter()
            .map(|port| {
                if port >= nout {
                    return Err(unknown());
                }
                Ok((format!("{}[{}]", name, port), Endpoint { block, port }))
            })
            .collect()
    }
}

pub(crate) fn resolve_watches(
    bd: &BlockDiagram,
    watch: &[Watch],
) -> Result<Vec<(String, Endpoint)>, RuntimeError> {
    let mut out = Vec::new();
    for w in watch {
        out.extend(w.resolve(bd)?);
    }
    Ok(out)
}

impl BlockDiagram {
    /// Integrate the diagram from 0 to `t_end`, see [`BatchScheduler`]
    pub fn run_batch(
        &mut self,
        t_end: f64,
        dt: Option<f64>,
        options: &SimOptions,
        watch: &[Watch],
    ) -> Result<Trace, RunFailure> {
        BatchScheduler::new(options.clone()).run(self, t_end, dt, watch)
    }

    /// Execute the diagram against the wall clock, see [`RealTimeScheduler`]
    pub fn run_realtime(
        &mut self,
        options: &RealTimeOptions,
        watch: &[Watch],
    ) -> Result<Trace, RunFailure> {
        RealTimeScheduler::new(options.clone()).run(self, watch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Constant, Demux, Null};

    #[test]
    fn test_parse_signal() {
        assert_eq!(parse_signal("gain.0"), Some(("gain.0", 0)));
        assert_eq!(parse_signal("ss/demux.0[2]"), Some(("ss/demux.0", 2)));
        assert_eq!(parse_signal("x[a]"), None);
    }

    #[test]
    fn test_watch_resolution() {
        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(vec![1.0, 2.0]));
        let d = bd.add(Demux::new(2));
        let n = bd.add(Null::new(2));
        bd.connect(c, d).unwrap();
        bd.connect(d.ports(0..2), n).unwrap();
        bd.compile().unwrap();

        let r = Watch::from("demux.0[1]").resolve(&bd).unwrap();
        assert_eq!(r, vec![("demux.0[1]".to_string(), Endpoint { block: d, port: 1 })]);

        let r = Watch::from(d.ports(0..2)).resolve(&bd).unwrap();
        assert_eq!(r.len(), 2);

        assert_eq!(
            Watch::from("nope").resolve(&bd),
            Err(RuntimeError::UnknownSignal {
                name: "nope".into()
            })
        );
        assert!(Watch::from("demux.0[2]").resolve(&bd).is_err());
        assert!(Watch::from(n).resolve(&bd).is_err());
    }

    #[test]
    fn test_run_state_stop() {
        let mut run = RunState::default();
        assert!(!run.stop_requested());
        run.stop("stop.0");
        run.stop("other");
        assert!(run.stop_requested());
        assert_eq!(run.stopped_by(), Some("stop.0"));
    }

    #[test]
    fn test_options_from_json() {
        let opts: SimOptions =
            serde_json::from_str(r#"{"solver": "RK4", "max_step": 0.01, "check_finite": true}"#)
                .unwrap();
        assert_eq!(opts.solver, SolverKind::RK4);
        assert_eq!(opts.solver_options.max_step, Some(0.01));
        assert!(opts.check_finite);
    }
}
