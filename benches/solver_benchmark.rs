//! Solver and diagram benchmarks
//!
//! Measures raw solver stepping on an ODE closure and full batch runs of a
//! small closed-loop diagram.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowsim::error::RuntimeError;
use flowsim::prelude::*;
use nalgebra::DVector;

/// Simple exponential decay: dx/dt = -k*x
fn exponential_decay(_t: f64, x: &DVector<f64>, k: f64) -> Result<DVector<f64>, RuntimeError> {
    Ok(-k * x)
}

/// One adaptive step per solver over growing state sizes
fn bench_solver_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver step");
    let options = SolverOptions {
        max_step: Some(0.01),
        ..Default::default()
    };

    for kind in [SolverKind::RK4, SolverKind::RKBS32, SolverKind::RKDP54] {
        for size in [1, 10, 100] {
            let y0 = DVector::from_element(size, 1.0);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", kind), size),
                &size,
                |b, _| {
                    let mut solver = kind.build(&options);
                    b.iter(|| {
                        let mut rhs = |t: f64, y: &DVector<f64>| exponential_decay(t, y, 0.5);
                        solver.reset();
                        black_box(solver.step(&mut rhs, 0.0, &y0, 1.0))
                    });
                },
            );
        }
    }

    group.finish();
}

/// Integrate a harmonic oscillator over 10 seconds
fn bench_solver_integration(c: &mut Criterion) {
    let options = SolverOptions {
        max_step: Some(0.1),
        ..Default::default()
    };
    let y0 = DVector::from_vec(vec![1.0, 0.0]);

    c.bench_function("RKDP54 oscillator 10s", |b| {
        b.iter(|| {
            let mut solver = SolverKind::RKDP54.build(&options);
            let mut rhs = |_t: f64, y: &DVector<f64>| -> Result<DVector<f64>, RuntimeError> {
                Ok(DVector::from_vec(vec![y[1], -y[0]]))
            };
            let (mut t, mut y) = (0.0, y0.clone());
            while t < 10.0 {
                match solver.step(&mut rhs, t, &y, 10.0) {
                    Ok(step) => {
                        t = step.t;
                        y = step.y;
                    }
                    Err(_) => break,
                }
            }
            black_box(y)
        });
    });
}

fn closed_loop() -> BlockDiagram {
    let mut bd = BlockDiagram::new();
    let clk = bd.clock(0.01, 0.0);
    let r = bd.add(Step::new(0.1));
    let e = bd.add(Sum::new("+-"));
    let k = bd.add(Gain::new(5.0));
    let hold = bd.add_clocked(clk, Zoh::new(0.0));
    let plant = bd.add(LtiSiso::new(&[1.0], &[1.0, 2.0, 1.0]));
    let n = bd.add(Null::new(1));
    bd.connect(r, e.port(0)).ok();
    bd.connect(plant, e.port(1)).ok();
    bd.connect(e, k).ok();
    bd.connect(k, hold).ok();
    bd.connect(hold, plant).ok();
    bd.connect(plant, n).ok();
    bd
}

/// Full batch run: compile once, simulate repeatedly
fn bench_batch_run(c: &mut Criterion) {
    let mut bd = closed_loop();
    if bd.compile().is_err() {
        return;
    }
    let options = SimOptions::default();

    c.bench_function("batch closed loop 5s", |b| {
        b.iter(|| black_box(bd.run_batch(5.0, Some(0.01), &options, &[]).map(|t| t.len())));
    });
}

/// Diagram evaluation alone, the inner loop of every solver stage
fn bench_evaluate(c: &mut Criterion) {
    let mut bd = closed_loop();
    if bd.compile().is_err() {
        return;
    }
    let x = bd.getstate0();

    c.bench_function("evaluate closed loop", |b| {
        b.iter(|| black_box(bd.evaluate(black_box(&x), 0.5).map(|dx| dx.len())));
    });
}

criterion_group!(
    benches,
    bench_solver_step,
    bench_solver_integration,
    bench_batch_run,
    bench_evaluate
);
criterion_main!(benches);
