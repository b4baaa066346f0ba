//! Integration tests for batch and real-time runs

use approx::{assert_abs_diff_eq, assert_relative_eq};
use flowsim::events::{EventQueue, EventSource};
use flowsim::prelude::*;
use flowsim::utils::constants::EVENT_EPSILON;

#[test]
fn test_step_into_integrator() {
    let mut bd = BlockDiagram::new();
    let step = bd.add(Step::new(1.0));
    let x = bd.add(Integrator::new(0.0));
    let n = bd.add(Null::new(1));
    bd.connect(step, x).unwrap();
    bd.connect(x, n).unwrap();
    bd.compile().unwrap();

    let trace = bd
        .run_batch(5.0, Some(0.01), &SimOptions::default(), &["integrator.0".into()])
        .unwrap();

    assert_relative_eq!(trace.last_time().unwrap(), 5.0);
    let xs = trace.state("integrator.0x0").unwrap();
    let ys = trace.signal_f64("integrator.0[0]").unwrap();
    assert_eq!(xs.len(), trace.len());
    for ((t, x), y) in trace.t.iter().zip(&xs).zip(&ys) {
        if *t < 0.99 {
            assert_abs_diff_eq!(*x, 0.0, epsilon = 1e-12);
        } else {
            assert_abs_diff_eq!(*x, (t - 1.0).max(0.0), epsilon = 1e-3);
        }
        assert_eq!(x, y);
    }
    assert_abs_diff_eq!(xs[xs.len() - 1], 4.0, epsilon = 1e-3);
}

#[test]
fn test_clock_merge_5_and_10() {
    let mut queue = EventQueue::new();
    let mut bd = BlockDiagram::new();
    let fast = bd.clock(5.0, 0.0);
    let slow = bd.clock(10.0, 0.0);
    for k in 1..=4 {
        queue.push(5.0 * k as f64, EventSource::Clock(fast));
    }
    for k in 1..=4 {
        queue.push(10.0 * k as f64, EventSource::Clock(slow));
    }
    let mut merged = Vec::new();
    while let Some((t, sources)) = queue.pop(EVENT_EPSILON) {
        if t > 20.0 {
            break;
        }
        merged.push((t, sources));
    }
    assert_eq!(
        merged,
        vec![
            (5.0, vec![EventSource::Clock(fast)]),
            (10.0, vec![EventSource::Clock(fast), EventSource::Clock(slow)]),
            (15.0, vec![EventSource::Clock(fast)]),
            (20.0, vec![EventSource::Clock(fast), EventSource::Clock(slow)]),
        ]
    );

    // the same two rates driving a diagram
    let c = bd.add(Constant::new(1.0));
    let a = bd.add_clocked(fast, Zoh::new(0.0));
    let b = bd.add_clocked(slow, Zoh::new(0.0));
    let n = bd.add(Null::new(2));
    bd.connect_many(c, [a, b]).unwrap();
    bd.connect(a, n.port(0)).unwrap();
    bd.connect(b, n.port(1)).unwrap();
    bd.compile().unwrap();

    let trace = bd.run_batch(40.0, None, &SimOptions::default(), &[]).unwrap();
    assert_eq!(
        trace.clock("clock.0").unwrap().t,
        vec![5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0]
    );
    assert_eq!(trace.clock("clock.1").unwrap().t, vec![10.0, 20.0, 30.0, 40.0]);
    assert_eq!(trace.t, vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0]);
    assert_eq!(trace.stats.nevents, 8);
}

#[test]
fn test_incommensurate_clocks_fail_compile() {
    let mut bd = BlockDiagram::new();
    let fast = bd.clock(0.3, 0.0);
    let slow = bd.clock(0.7, 0.0);
    let c = bd.add(Constant::new(1.0));
    let a = bd.add_clocked(fast, Zoh::new(0.0));
    let b = bd.add_clocked(slow, Zoh::new(0.0));
    let n = bd.add(Null::new(2));
    bd.connect_many(c, [a, b]).unwrap();
    bd.connect(a, n.port(0)).unwrap();
    bd.connect(b, n.port(1)).unwrap();

    let err = bd.compile().unwrap_err();
    assert!(err
        .iter()
        .any(|e| matches!(e, CompileError::IncommensurateClocks { .. })));
}

#[test]
fn test_sampled_feedback_loop() {
    // x' = u, u = ZOH(-x) sampled every 0.1s
    let mut bd = BlockDiagram::new();
    let clk = bd.clock(0.1, 0.0);
    let x = bd.add(Integrator::new(1.0));
    let g = bd.add(Gain::new(-1.0));
    let hold = bd.add_clocked(clk, Zoh::new(-1.0));
    bd.connect(x, g).unwrap();
    bd.connect(g, hold).unwrap();
    bd.connect(hold, x).unwrap();
    bd.compile().unwrap();

    let opts = SimOptions::with_solver(SolverKind::RK4);
    let trace = bd
        .run_batch(1.0, Some(0.05), &opts, &[hold.into()])
        .unwrap();

    // exact discrete solution: x[k+1] = 0.9 x[k]
    let xs = trace.state("integrator.0x0").unwrap();
    assert_relative_eq!(xs[xs.len() - 1], 0.9f64.powi(10), epsilon = 1e-9);
    let held = trace.signal_f64("zoh.0[0]").unwrap();
    assert!(held.iter().all(|u| *u <= 0.0));
}

#[test]
fn test_stop_request_returns_partial_trace() {
    let mut bd = BlockDiagram::new();
    let one = bd.add(Constant::new(1.0));
    let x = bd.add(Integrator::new(0.0));
    let over = bd.add(Function::scalar(|x| if x > 0.45 { 1.0 } else { 0.0 }));
    let stop = bd.add_named("limit", Stop::new());
    bd.connect(one, x).unwrap();
    bd.connect(x, over).unwrap();
    bd.connect(over, stop).unwrap();
    bd.compile().unwrap();

    let trace = bd
        .run_batch(10.0, Some(0.1), &SimOptions::with_solver(SolverKind::RK4), &[])
        .unwrap();
    assert_eq!(trace.stopped_by.as_deref(), Some("limit"));
    let at = trace.stopped_at.unwrap();
    assert_relative_eq!(at, 0.5, epsilon = 1e-9);
    assert_eq!(trace.last_time(), Some(at));
}

#[test]
fn test_block_failure_keeps_partial_trace() {
    let mut bd = BlockDiagram::new();
    let t = bd.add(Time::new());
    let f = bd.add_named(
        "guard",
        Function::new(1, 1, |u| match u[0].as_f64() {
            Some(x) if x > 0.55 => Err(BlockError::Failed("out of range".into())),
            _ => Ok(vec![u[0].clone()]),
        }),
    );
    let n = bd.add(Null::new(1));
    bd.connect(t, f).unwrap();
    bd.connect(f, n).unwrap();
    bd.compile().unwrap();

    let err = bd
        .run_batch(1.0, Some(0.1), &SimOptions::default(), &[])
        .unwrap_err();
    assert!(matches!(
        &err.error,
        RuntimeError::Block { block, .. } if block == "guard"
    ));
    assert_eq!(err.partial.len(), 6);
}

#[test]
fn test_check_finite_reports_wire() {
    let mut bd = BlockDiagram::new();
    let t = bd.add(Time::new());
    let f = bd.add(Function::scalar(|x| if x > 0.25 { f64::NAN } else { x }));
    let n = bd.add(Null::new(1));
    bd.connect(t, f).unwrap();
    bd.connect(f, n).unwrap();
    bd.compile().unwrap();

    let opts = SimOptions {
        check_finite: true,
        ..Default::default()
    };
    let err = bd.run_batch(1.0, Some(0.1), &opts, &[]).unwrap_err();
    assert!(matches!(
        &err.error,
        RuntimeError::NonFinite { block, port: 0, .. } if block == "function.0"
    ));

    // without the check the NaN flows through and is recorded
    let trace = bd
        .run_batch(1.0, Some(0.1), &SimOptions::default(), &[f.into()])
        .unwrap();
    let y = trace.signal_f64("function.0[0]").unwrap();
    assert!(y[y.len() - 1].is_nan());
}

#[test]
fn test_realtime_two_rates() {
    let mut bd = BlockDiagram::new();
    let fast = bd.clock(0.01, 0.0);
    let slow = bd.clock(0.02, 0.0);
    let one = bd.add(Constant::new(1.0));
    let count = bd.add_clocked(fast, DIntegrator::new(0.0));
    let hold = bd.add_clocked(slow, Zoh::new(0.0));
    let rec = bd.add(Recorder::new(1));
    bd.connect(one, count).unwrap();
    bd.connect(count, hold).unwrap();
    bd.connect(hold, rec).unwrap();
    bd.compile().unwrap();

    let trace = bd
        .run_realtime(&RealTimeOptions::until(0.04), &["dintegrator.0".into()])
        .unwrap();
    let stats = trace.realtime.as_ref().unwrap();
    assert_eq!(stats.ticks, vec![4, 2]);
    assert!(stats.max_exec >= stats.mean_exec);

    // ticks at 0.02 and 0.04 merge into one event each
    assert_eq!(trace.len(), 4);
    let counts = trace.signal_f64("dintegrator.0[0]").unwrap();
    assert_relative_eq!(counts[3], 0.04, epsilon = 1e-12);
    assert_eq!(bd.block_as::<Recorder>(rec).unwrap().times().len(), 2);
}

#[test]
fn test_trace_serializes_to_json() {
    let mut bd = BlockDiagram::new();
    let c = bd.add(Constant::new(2.0));
    let x = bd.add(Integrator::new(0.0));
    let n = bd.add(Null::new(1));
    bd.connect(c, x).unwrap();
    bd.connect(x, n).unwrap();
    bd.compile().unwrap();

    let trace = bd
        .run_batch(1.0, Some(0.5), &SimOptions::with_solver(SolverKind::Euler), &[x.into()])
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&trace.to_json().unwrap()).unwrap();
    assert_eq!(json["xnames"][0], "integrator.0x0");
    assert_eq!(json["t"].as_array().unwrap().len(), 3);
    assert_eq!(json["signals"]["integrator.0[0]"][2], 2.0);
}

#[test]
fn test_realtime_rerun_repeats() {
    let mut bd = BlockDiagram::new();
    let clk = bd.clock(0.01, 0.0);
    let t = bd.add(Time::new());
    let acc = bd.add_clocked(clk, DIntegrator::new(0.0));
    let n = bd.add(Null::new(1));
    bd.connect(t, acc).unwrap();
    bd.connect(acc, n).unwrap();
    bd.compile().unwrap();

    let opts = RealTimeOptions::until(0.03);
    let watch: [Watch; 1] = ["dintegrator.0".into()];
    let first = bd.run_realtime(&opts, &watch).unwrap();
    let second = bd.run_realtime(&opts, &watch).unwrap();

    let a = first.signal_f64("dintegrator.0[0]").unwrap();
    let b = second.signal_f64("dintegrator.0[0]").unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
    assert_eq!(a[0], 0.0);
}

#[test]
fn test_batch_rerun_repeats() {
    let mut bd = BlockDiagram::new();
    let clk = bd.clock(0.1, 0.0);
    let step = bd.add(Step::new(0.25));
    let x = bd.add(Integrator::new(0.0));
    let hold = bd.add_clocked(clk, Zoh::new(0.0));
    let n = bd.add(Null::new(1));
    bd.connect(step, x).unwrap();
    bd.connect(x, hold).unwrap();
    bd.connect(hold, n).unwrap();
    bd.compile().unwrap();

    let opts = SimOptions::default();
    let watch: [Watch; 1] = [hold.into()];
    let first = bd.run_batch(1.0, Some(0.05), &opts, &watch).unwrap();
    let second = bd.run_batch(1.0, Some(0.05), &opts, &watch).unwrap();

    assert_eq!(first.t, second.t);
    assert_eq!(first.state("integrator.0x0"), second.state("integrator.0x0"));
    assert_eq!(first.signal_f64("zoh.0[0]"), second.signal_f64("zoh.0[0]"));
    assert_abs_diff_eq!(
        first.state("integrator.0x0").unwrap()[first.len() - 1],
        0.75,
        epsilon = 1e-3
    );
}
