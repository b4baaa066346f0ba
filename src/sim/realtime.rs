//! Real-time scheduler: clocked execution against wall-clock deadlines

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{resolve_watches, RunState, Trace, Watch};
use crate::block::BlockClass;
use crate::diagram::BlockDiagram;
use crate::error::{RunFailure, RuntimeError};
use crate::events::{EventQueue, EventSource};
use crate::plug::{BlockId, ClockId, Endpoint};
use crate::utils::constants::EVENT_EPSILON;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealTimeOptions {
    /// Stop after this many seconds; `None` runs until a block stops it
    pub max_time: Option<f64>,
    /// Record watched signals at every tick
    pub collect: bool,
}

impl Default for RealTimeOptions {
    fn default() -> Self {
        Self {
            max_time: None,
            collect: true,
        }
    }
}

impl RealTimeOptions {
    pub fn until(max_time: f64) -> Self {
        Self {
            max_time: Some(max_time),
            ..Default::default()
        }
    }
}

/// Timing of a real-time run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RealTimeStats {
    /// Ticks executed, per clock
    pub ticks: Vec<usize>,
    /// Deadlines already passed when they came up
    pub overruns: usize,
    /// Longest tick execution, seconds
    pub max_exec: f64,
    /// Mean tick execution, seconds
    pub mean_exec: f64,
    /// Block names executed per clock, in firing order
    pub plans: Vec<Vec<String>>,
}

/// Executes a purely discrete diagram at fixed rates.
///
/// Every clock gets a static execution plan. Ticks are dispatched at
/// absolute deadlines `offset + k * period` after the start of the run,
/// so a slow tick never shifts the ones after it.
#[derive(Debug, Clone, Default)]
pub struct RealTimeScheduler {
    options: RealTimeOptions,
}

impl RealTimeScheduler {
    pub fn new(options: RealTimeOptions) -> Self {
        Self { options }
    }

    pub fn run(&self, bd: &mut BlockDiagram, watch: &[Watch]) -> Result<Trace, RunFailure> {
        let (plans, watches) = match self.prepare(bd, watch) {
            Ok(prepared) => prepared,
            Err(err) => return Err(RunFailure::new(err, Trace::default())),
        };

        let mut trace = Trace::new(bd, &watches);
        let mut stats = RealTimeStats {
            ticks: vec![0; plans.len()],
            plans: plans
                .iter()
                .map(|plan| {
                    plan.iter()
                        .map(|id| bd.name(*id).unwrap_or_default().to_string())
                        .collect()
                })
                .collect(),
            ..Default::default()
        };
        for (i, plan) in stats.plans.iter().enumerate() {
            info!("clock {} plan: [{}]", i, plan.join(", "));
        }

        let result = bd
            .start()
            .and_then(|_| self.dispatch(bd, &plans, &watches, &mut trace, &mut stats));
        bd.done();
        trace.collect_clocks(bd);
        info!(
            "real-time run ended: ticks {:?}, {} overruns, max exec {:.6}s, mean exec {:.6}s",
            stats.ticks, stats.overruns, stats.max_exec, stats.mean_exec
        );
        trace.realtime = Some(stats);

        match result {
            Ok(()) => Ok(trace),
            Err(err) => Err(RunFailure::new(err, trace)),
        }
    }

    fn prepare(
        &self,
        bd: &BlockDiagram,
        watch: &[Watch],
    ) -> Result<(Vec<Vec<BlockId>>, Vec<(String, Endpoint)>), RuntimeError> {
        if !bd.is_compiled() {
            return Err(RuntimeError::NotCompiled);
        }
        if let Some(max_time) = self.options.max_time {
            if !max_time.is_finite() || max_time <= 0.0 {
                return Err(RuntimeError::InvalidOption(format!(
                    "max_time {} must be positive",
                    max_time
                )));
            }
        }
        if let Some(id) = bd
            .blocks()
            .find(|id| bd.block(*id).is_some_and(|b| b.class() == BlockClass::Transfer))
        {
            return Err(RuntimeError::ContinuousInRealTime {
                block: bd.name(id).unwrap_or_default().to_string(),
            });
        }

        let plans: Vec<Vec<BlockId>> = (0..bd.clocks().len())
            .map(|i| bd.clock_plan(ClockId(i)))
            .collect();
        let unscheduled: Vec<String> = bd
            .blocks()
            .filter(|id| !plans.iter().any(|plan| plan.contains(id)))
            .filter_map(|id| bd.name(id).map(str::to_string))
            .collect();
        if !unscheduled.is_empty() {
            return Err(RuntimeError::Unscheduled {
                blocks: unscheduled,
            });
        }

        Ok((plans, resolve_watches(bd, watch)?))
    }

    fn dispatch(
        &self,
        bd: &mut BlockDiagram,
        plans: &[Vec<BlockId>],
        watches: &[(String, Endpoint)],
        trace: &mut Trace,
        stats: &mut RealTimeStats,
    ) -> Result<(), RuntimeError> {
        let mut queue = EventQueue::new();
        for (i, clock) in bd.clocks().iter().enumerate() {
            queue.push(clock.next_time(), EventSource::Clock(ClockId(i)));
        }

        let mut run = RunState::default();
        let mut executed = 0usize;
        let mut total = Duration::ZERO;
        let origin = Instant::now();

        while let Some((t, sources)) = queue.pop(EVENT_EPSILON) {
            if self
                .options
                .max_time
                .is_some_and(|max_time| t > max_time + EVENT_EPSILON)
            {
                break;
            }

            let deadline = origin + Duration::from_secs_f64(t);
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                stats.overruns += 1;
                warn!(
                    "overrun at t={}: {:.6}s late",
                    t,
                    (now - deadline).as_secs_f64()
                );
            }

            let began = Instant::now();
            for source in &sources {
                let EventSource::Clock(cid) = *source else {
                    continue;
                };
                bd.tick_clock(cid, t)?;
                if let Some(plan) = plans.get(cid.0) {
                    bd.run_plan(plan, t, &mut run)?;
                }
                if let Some(ticks) = stats.ticks.get_mut(cid.0) {
                    *ticks += 1;
                }
                if let Some(next) = bd.advance_clock(cid) {
                    queue.push(next, *source);
                }
            }
            let elapsed = began.elapsed();
            executed += 1;
            total += elapsed;
            stats.max_exec = stats.max_exec.max(elapsed.as_secs_f64());
            stats.mean_exec = total.as_secs_f64() / executed as f64;
            debug!("tick at t={} took {:?}", t, elapsed);

            run.t = t;
            run.count += 1;
            if self.options.collect {
                trace.record(bd, t, &[], watches);
            }

            if run.stop_requested() {
                let by = run.stopped_by().unwrap_or("unknown").to_string();
                info!("stop requested by {} at t={}", by, t);
                trace.stopped_by = Some(by);
                trace.stopped_at = Some(t);
                break;
            }
        }
        Ok(())
    }
}
