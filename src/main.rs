use flowsim::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Sampled proportional control of a first-order plant:
///
/// ```text
/// step -> sum(+-) -> gain -> zoh (10 Hz) -> plant 1/(s+1) -+-> null
///            ^                                              |
///            +----------------------------------------------+
/// ```
fn build() -> Result<(BlockDiagram, BlockId, BlockId), CompileError> {
    let mut bd = BlockDiagram::named("sampled-p-control");
    let kp = bd.param("kp", 4.0);

    let clk = bd.clock_hz(10.0, 0.0);
    let setpoint = bd.add_named("setpoint", Step::new(0.5));
    let error = bd.add_named("error", Sum::new("+-"));
    let gain = bd.add_named("kp", Gain::new(&kp));
    let hold = bd.add_clocked(clk, Zoh::new(0.0));
    let plant = bd.add_named("plant", LtiSiso::new(&[1.0], &[1.0, 1.0]));
    let out = bd.add(Null::new(1));

    bd.connect(setpoint, error.port(0))?;
    bd.connect(plant, error.port(1))?;
    bd.connect(error, gain)?;
    bd.connect(gain, hold)?;
    bd.connect(hold, plant)?;
    bd.connect(plant, out)?;

    bd.compile()?;
    Ok((bd, plant, hold))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (mut bd, plant, hold) = build()?;
    bd.report();

    let options = SimOptions::with_solver(SolverKind::RKDP54);
    let trace = bd.run_batch(5.0, Some(0.05), &options, &[plant.into(), hold.into()])?;

    let y = trace.signal_f64("plant[0]").unwrap_or_default();
    let u = trace.signal_f64("zoh.0[0]").unwrap_or_default();
    info!(
        "{} samples, {} steps ({} rejected), {} rhs evaluations, {} events",
        trace.len(),
        trace.stats.nsteps,
        trace.stats.nrejected,
        trace.stats.nfev,
        trace.stats.nevents
    );
    if let (Some(y), Some(u)) = (y.last(), u.last()) {
        // P control leaves a steady-state error of 1/(1+kp)
        info!("final output {:.4} (ideal 0.4), held command {:.4}", y, u);
    }
    if let Some(clock) = trace.clock("clock.0") {
        info!("clock.0 ticked {} times", clock.t.len());
    }
    Ok(())
}
