//! Results of a simulation run

use std::collections::BTreeMap;

use serde::Serialize;

use super::RealTimeStats;
use crate::diagram::BlockDiagram;
use crate::events::ClockTrace;
use crate::plug::Endpoint;
use crate::value::Value;

/// Solver effort over a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunStats {
    /// Accepted solver steps
    pub nsteps: usize,
    /// Right-hand side evaluations
    pub nfev: usize,
    pub nrejected: usize,
    /// Event times dispatched from the queue
    pub nevents: usize,
}

/// Time, state and signal histories of one run.
///
/// Rows of `x` line up with `t`, and so does every signal history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Trace {
    pub t: Vec<f64>,
    pub x: Vec<Vec<f64>>,
    pub xnames: Vec<String>,
    pub clocks: Vec<ClockTrace>,
    /// Watched output ports, keyed `"block[port]"`
    pub signals: BTreeMap<String, Vec<Value>>,
    pub stopped_by: Option<String>,
    pub stopped_at: Option<f64>,
    pub stats: RunStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealTimeStats>,
}

impl Trace {
    pub(crate) fn new(bd: &BlockDiagram, watches: &[(String, Endpoint)]) -> Self {
        Self {
            xnames: bd.statenames().to_vec(),
            signals: watches
                .iter()
                .map(|(name, _)| (name.clone(), Vec::new()))
                .collect(),
            ..Default::default()
        }
    }

    /// Append one sample. A watched port with no value yet records NaN.
    pub(crate) fn record(
        &mut self,
        bd: &BlockDiagram,
        t: f64,
        x: &[f64],
        watches: &[(String, Endpoint)],
    ) {
        self.t.push(t);
        self.x.push(x.to_vec());
        for (name, end) in watches {
            let value = bd
                .output(end.block, end.port)
                .cloned()
                .unwrap_or(Value::Scalar(f64::NAN));
            if let Some(history) = self.signals.get_mut(name) {
                history.push(value);
            }
        }
    }

    /// Copy the per-clock discrete histories out of the diagram
    pub(crate) fn collect_clocks(&mut self, bd: &BlockDiagram) {
        self.clocks = bd.clocks().iter().map(|c| c.trace().clone()).collect();
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// History of a watched signal
    pub fn signal(&self, name: &str) -> Option<&[Value]> {
        self.signals.get(name).map(Vec::as_slice)
    }

    /// History of a scalar watched signal
    pub fn signal_f64(&self, name: &str) -> Option<Vec<f64>> {
        self.signal(name)?.iter().map(Value::as_f64).collect()
    }

    /// History of one continuous state, by state name
    pub fn state(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.xnames.iter().position(|n| n == name)?;
        self.x.iter().map(|row| row.get(i).copied()).collect()
    }

    /// Discrete history of a clock, by clock name
    pub fn clock(&self, name: &str) -> Option<&ClockTrace> {
        self.clocks.iter().find(|c| c.name == name)
    }

    /// Last sample time, if any
    pub fn last_time(&self) -> Option<f64> {
        self.t.last().copied()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
