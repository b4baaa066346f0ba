//! Batch scheduler: ODE integration between clock events

use nalgebra::DVector;
use tracing::{debug, info};

use super::{resolve_watches, RunState, SimOptions, Trace, Watch};
use crate::diagram::BlockDiagram;
use crate::error::{RunFailure, RuntimeError};
use crate::events::{EventQueue, EventSource};
use crate::plug::{ClockId, Endpoint};
use crate::solvers::OdeSolver;
use crate::utils::constants::{EVENT_EPSILON, MAX_STEP_FRACTION};

/// Offline simulation driven by an adaptive or fixed-step ODE solver.
///
/// The continuous states are integrated over each interval between clock
/// events. After every accepted step the diagram is evaluated at the new
/// state, sinks are stepped and the sample is recorded. At an event time
/// every due clock records its discrete state and updates it.
#[derive(Debug, Clone, Default)]
pub struct BatchScheduler {
    options: SimOptions,
}

struct BatchRun<'a> {
    bd: &'a mut BlockDiagram,
    solver: Box<dyn OdeSolver>,
    dt: Option<f64>,
    min_step: f64,
    watches: Vec<(String, Endpoint)>,
    run: RunState,
    trace: Trace,
    x: Vec<f64>,
    t: f64,
}

impl BatchScheduler {
    pub fn new(options: SimOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    /// Simulate from 0 to `t_end`.
    ///
    /// `dt` caps the solver step and, for diagrams without continuous
    /// states, sets a fixed sampling interval. A block stop request ends
    /// the run early with `Ok`; any runtime failure returns the trace
    /// accumulated so far inside the [`RunFailure`].
    pub fn run(
        &self,
        bd: &mut BlockDiagram,
        t_end: f64,
        dt: Option<f64>,
        watch: &[Watch],
    ) -> Result<Trace, RunFailure> {
        let watches = match self.prepare(bd, t_end, dt, watch) {
            Ok(watches) => watches,
            Err(err) => return Err(RunFailure::new(err, Trace::default())),
        };

        let mut solver_options = self.options.solver_options.clone();
        let max_step = solver_options
            .max_step
            .or(dt)
            .unwrap_or(t_end * MAX_STEP_FRACTION);
        solver_options.max_step = Some(max_step);
        let mut solver = self.options.solver.build(&solver_options);
        solver.reset();

        bd.set_check_finite(self.options.check_finite);
        let trace = Trace::new(bd, &watches);
        let mut state = BatchRun {
            x: bd.getstate0(),
            bd,
            solver,
            dt,
            min_step: solver_options.min_step,
            watches,
            run: RunState::default(),
            trace,
            t: 0.0,
        };

        info!(
            "batch run to t={} with {} ({} states, {} clocks)",
            t_end,
            state.solver.name(),
            state.x.len(),
            state.bd.clocks().len()
        );
        let result = state.bd.start().and_then(|_| state.simulate(t_end));
        state.bd.done();
        state.trace.collect_clocks(state.bd);

        match result {
            Ok(()) => {
                info!(
                    "batch run finished at t={}: {} samples, {} steps, {} evaluations",
                    state.t,
                    state.trace.len(),
                    state.trace.stats.nsteps,
                    state.run.count
                );
                Ok(state.trace)
            }
            Err(err) => Err(RunFailure::new(err, state.trace)),
        }
    }

    fn prepare(
        &self,
        bd: &BlockDiagram,
        t_end: f64,
        dt: Option<f64>,
        watch: &[Watch],
    ) -> Result<Vec<(String, Endpoint)>, RuntimeError> {
        if !bd.is_compiled() {
            return Err(RuntimeError::NotCompiled);
        }
        if !t_end.is_finite() || t_end <= 0.0 {
            return Err(RuntimeError::InvalidOption(format!(
                "end time {} must be positive",
                t_end
            )));
        }
        if let Some(dt) = dt {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(RuntimeError::InvalidOption(format!(
                    "dt {} must be positive",
                    dt
                )));
            }
        }
        resolve_watches(bd, watch)
    }
}

impl BatchRun<'_> {
    fn simulate(&mut self, t_end: f64) -> Result<(), RuntimeError> {
        let mut queue = EventQueue::new();
        for (i, clock) in self.bd.clocks().iter().enumerate() {
            queue.push(clock.next_time(), EventSource::Clock(ClockId(i)));
        }
        queue.push(t_end, EventSource::End);

        let x0 = self.x.clone();
        if self.sample(0.0, &x0)? {
            return Ok(());
        }

        while let Some((t_event, sources)) = queue.pop(EVENT_EPSILON) {
            let t_event = t_event.min(t_end);
            debug!("event at t={} from {:?}", t_event, sources);
            self.trace.stats.nevents += 1;

            if self.advance_to(t_event)? {
                return Ok(());
            }

            let mut ticked = false;
            for source in &sources {
                if let EventSource::Clock(cid) = source {
                    self.bd.tick_clock(*cid, t_event)?;
                    if let Some(next) = self.bd.advance_clock(*cid) {
                        queue.push(next, *source);
                    }
                    ticked = true;
                }
            }
            if ticked {
                // outputs must reflect the new discrete state
                let x = self.x.clone();
                self.bd.evaluate_at(&x, t_event)?;
                self.run.count += 1;
            }

            if sources.contains(&EventSource::End) || t_event >= t_end {
                break;
            }
        }
        Ok(())
    }

    /// Integrate or sample up to `t_next`. Returns true on a stop request.
    fn advance_to(&mut self, t_next: f64) -> Result<bool, RuntimeError> {
        if !self.x.is_empty() {
            return self.integrate(t_next);
        }
        if let Some(dt) = self.dt {
            let mut k = (self.t / dt).floor() + 1.0;
            while k * dt < t_next - EVENT_EPSILON {
                if self.sample(k * dt, &[])? {
                    return Ok(true);
                }
                k += 1.0;
            }
        }
        if t_next > self.t {
            return self.sample(t_next, &[]);
        }
        Ok(false)
    }

    fn integrate(&mut self, t_next: f64) -> Result<bool, RuntimeError> {
        while self.t < t_next {
            let y = DVector::from_vec(self.x.clone());
            let result = {
                let bd = &mut *self.bd;
                let count = &mut self.run.count;
                let mut rhs = |t: f64, y: &DVector<f64>| -> Result<DVector<f64>, RuntimeError> {
                    *count += 1;
                    bd.evaluate_at(y.as_slice(), t).map(DVector::from_vec)
                };
                self.solver.step(&mut rhs, self.t, &y, t_next)?
            };

            let stats = &mut self.trace.stats;
            stats.nsteps += 1;
            stats.nfev += result.nfev;
            stats.nrejected += result.nrejected;

            let x: Vec<f64> = result.y.iter().copied().collect();
            if self.sample(result.t, &x)? {
                return Ok(true);
            }
            if result.t < t_next && result.h_next < self.min_step {
                return Err(RuntimeError::StepUnderflow {
                    t: result.t,
                    step: result.h_next,
                    min_step: self.min_step,
                });
            }
        }
        Ok(false)
    }

    /// Evaluate at an accepted point, step the sinks and record.
    /// Returns true when a block asked to stop.
    fn sample(&mut self, t: f64, x: &[f64]) -> Result<bool, RuntimeError> {
        self.bd.evaluate_at(x, t)?;
        self.run.count += 1;
        self.run.t = t;
        self.t = t;
        self.x = x.to_vec();

        self.bd.step(t, &mut self.run)?;
        self.trace.record(self.bd, t, x, &self.watches);

        if self.run.stop_requested() {
            let by = self.run.stopped_by().unwrap_or("unknown").to_string();
            info!("stop requested by {} at t={}", by, t);
            self.trace.stopped_by = Some(by);
            self.trace.stopped_at = Some(t);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::blocks::{Constant, Integrator, Null, Recorder, Ramp, Stop, Time};
    use crate::solvers::SolverKind;

    #[test]
    fn test_not_compiled() {
        let mut bd = BlockDiagram::new();
        bd.add(Constant::new(1.0));
        let err = bd
            .run_batch(1.0, None, &SimOptions::default(), &[])
            .unwrap_err();
        assert_eq!(err.error, RuntimeError::NotCompiled);
        assert!(err.partial.is_empty());
    }

    #[test]
    fn test_constant_rate_integration() {
        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(2.0));
        let x = bd.add(Integrator::new(1.0));
        bd.connect(c, x).unwrap();
        bd.compile().unwrap();

        let opts = SimOptions::with_solver(SolverKind::RK4);
        let trace = bd.run_batch(2.0, Some(0.1), &opts, &[]).unwrap();

        assert_eq!(trace.t[0], 0.0);
        assert_relative_eq!(trace.last_time().unwrap(), 2.0);
        assert_eq!(trace.len(), 21);
        let x = trace.state("integrator.0x0").unwrap();
        assert_relative_eq!(x[x.len() - 1], 5.0, epsilon = 1e-9);
        assert_eq!(trace.stats.nsteps, 20);
    }

    #[test]
    fn test_stateless_fixed_sampling() {
        let mut bd = BlockDiagram::new();
        let t = bd.add(Time::new());
        let r = bd.add(Recorder::new(1));
        bd.connect(t, r).unwrap();
        bd.compile().unwrap();

        let trace = bd
            .run_batch(1.0, Some(0.25), &SimOptions::default(), &[t.into()])
            .unwrap();
        assert_eq!(trace.t, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(
            trace.signal_f64("time.0[0]").unwrap(),
            vec![0.0, 0.25, 0.5, 0.75, 1.0]
        );
        let rec = bd.block_as::<Recorder>(r).unwrap();
        assert_eq!(rec.times(), trace.t.as_slice());
    }

    #[test]
    fn test_stop_block_ends_run() {
        let mut bd = BlockDiagram::new();
        let ramp = bd.add(Ramp::new(0.0, 1.0));
        let c = bd.add(Constant::new(0.0));
        let x = bd.add(Integrator::new(0.0));
        let s = bd.add(crate::blocks::Sum::new("+-"));
        let stop = bd.add(Stop::new());
        bd.connect(c, x).unwrap();
        bd.connect(ramp, s.port(0)).unwrap();
        let half = bd.add(Constant::new(0.5));
        bd.connect(half, s.port(1)).unwrap();
        // stops once the ramp passes 0.5
        let clip = bd.add(crate::blocks::Clip::new(0.0, 1.0));
        bd.connect(s, clip).unwrap();
        bd.connect(clip, stop).unwrap();
        let n = bd.add(Null::new(1));
        bd.connect(x, n).unwrap();
        bd.compile().unwrap();

        let trace = bd
            .run_batch(5.0, Some(0.1), &SimOptions::default(), &[])
            .unwrap();
        assert_eq!(trace.stopped_by.as_deref(), Some("stop.0"));
        let at = trace.stopped_at.unwrap();
        assert!(at > 0.5 && at < 0.7, "stopped at {}", at);
        assert_eq!(trace.last_time(), Some(at));
    }

    #[test]
    fn test_unknown_watch_fails_before_run() {
        let mut bd = BlockDiagram::new();
        let c = bd.add(Constant::new(1.0));
        let n = bd.add(Null::new(1));
        bd.connect(c, n).unwrap();
        bd.compile().unwrap();

        let err = bd
            .run_batch(1.0, None, &SimOptions::default(), &["missing[0]".into()])
            .unwrap_err();
        assert!(matches!(err.error, RuntimeError::UnknownSignal { .. }));
    }

    #[test]
    fn test_invalid_end_time() {
        let mut bd = BlockDiagram::new();
        bd.compile().unwrap();
        let err = bd
            .run_batch(-1.0, None, &SimOptions::default(), &[])
            .unwrap_err();
        assert!(matches!(err.error, RuntimeError::InvalidOption(_)));
    }
}
