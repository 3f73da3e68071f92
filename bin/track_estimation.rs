use clap::Parser;
use manifold_ddp::{
    ManifoldDdpError, init_logger, init_logger_with_level,
    track::{TrackConfig, TrackHarness},
};
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "track_estimation")]
#[command(about = "Drive a car around a circular track and estimate its path, disturbance and landmarks online")]
struct Args {
    /// Number of control periods to simulate
    #[arg(short, long, default_value = "200")]
    ticks: usize,

    /// Trailing estimation window in steps (0 re-solves the full history)
    #[arg(short, long, default_value = "40")]
    window: usize,

    /// PDdp iterations per tick
    #[arg(long, default_value = "10")]
    estimation_iterations: usize,

    /// Time after which the estimator starts
    #[arg(long, default_value = "1.0")]
    solve_start: f64,

    /// True body-frame disturbance (dx, dy)
    #[arg(long, num_args = 2, allow_negative_numbers = true, default_values_t = [0.2, 0.1])]
    disturbance: Vec<f64>,

    /// Number of landmarks scattered around the track
    #[arg(long, default_value = "24")]
    landmarks: usize,

    /// Landmark measurement noise (standard deviation)
    #[arg(long, default_value = "0.05")]
    measurement_noise: f64,

    /// Drive with a receding-horizon DDP controller instead of the reference control
    #[arg(long)]
    controller: bool,

    /// Random seed for the world and the noise
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Log the error every N ticks
    #[arg(long, default_value = "20")]
    report_every: usize,

    /// Enable verbose output (iteration tables)
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> TrackConfig {
    let defaults = TrackConfig::default();
    let mut config = TrackConfig::new()
        .with_window((args.window > 0).then_some(args.window))
        .with_estimation_iterations(args.estimation_iterations)
        .with_solve_start(args.solve_start)
        .with_disturbance([args.disturbance[0], args.disturbance[1]])
        .with_landmarks(
            args.landmarks,
            defaults.landmark_spread,
            defaults.sensor_range,
        )
        .with_noise(
            defaults.process_noise,
            defaults.odometry_noise,
            args.measurement_noise,
        )
        .with_seed(args.seed);
    if args.controller {
        config = config.with_controller(defaults.control_steps, defaults.control_iterations);
    }
    config
}

fn run(args: &Args) -> Result<(), ManifoldDdpError> {
    let mut harness = TrackHarness::new(build_config(args))?;
    let every = args.report_every.max(1);

    info!(
        "{:>8} | {:>10} | {:>10} | {:>9} | {:>16}",
        "time", "est_error", "odo_error", "landmarks", "disturbance"
    );
    info!("{}", "-".repeat(66));

    for tick in 1..=args.ticks {
        let report = harness.tick()?;
        if tick % every == 0 || tick == args.ticks {
            info!(
                "{:>8.2} | {:>10.4} | {:>10.4} | {:>9} | ({:>6.3}, {:>6.3})",
                report.time,
                report.estimate_error,
                report.odometry_error,
                report.landmark_count,
                report.disturbance[0],
                report.disturbance[1]
            );
        }
    }

    let history = harness.history();
    info!(
        "Estimated disturbance ({:.4}, {:.4}), true ({:.4}, {:.4})",
        history.disturbance().x,
        history.disturbance().y,
        args.disturbance[0],
        args.disturbance[1]
    );
    info!(
        "{} of {} landmarks mapped over {} steps",
        history.landmark_count(),
        args.landmarks,
        history.horizon()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        init_logger_with_level(Level::DEBUG);
    } else {
        init_logger();
    }

    info!("MANIFOLD-DDP TRACK ESTIMATION\n");

    if let Err(e) = run(&args) {
        error!("Track estimation failed: {}", e.chain_compact());
        return Err(e.into());
    }
    Ok(())
}
