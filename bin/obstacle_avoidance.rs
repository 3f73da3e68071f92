use clap::Parser;
use manifold_ddp::{
    constraints::{ControlBounds, DiskConstraint},
    core::{Constraint, Trajectory, uniform_times},
    costs::LqCost,
    init_logger, init_logger_with_level,
    manifold::Euclidean,
    optimizer::{DdpConfig, GDocp, GDocpConfig},
    systems::Particle2d,
};
use nalgebra::{DMatrix, DVector};
use tracing::{Level, info, warn};

#[derive(Parser)]
#[command(name = "obstacle_avoidance")]
#[command(about = "Steer a planar point mass around a disk obstacle with penalty-constrained DDP")]
struct Args {
    /// Start position (x, y)
    #[arg(long, num_args = 2, allow_negative_numbers = true, default_values_t = [-5.0, -5.0])]
    start: Vec<f64>,

    /// Obstacle center (x, y)
    #[arg(long, num_args = 2, allow_negative_numbers = true, default_values_t = [-2.5, -2.5])]
    center: Vec<f64>,

    /// Obstacle radius
    #[arg(short, long, default_value = "2.0")]
    radius: f64,

    /// Final time of the horizon
    #[arg(long, default_value = "10.0")]
    horizon: f64,

    /// Number of control steps
    #[arg(short, long, default_value = "32")]
    steps: usize,

    /// Maximum constraint violation accepted as converged
    #[arg(short, long, default_value = "0.01")]
    tolerance: f64,

    /// Maximum number of penalty weight increases
    #[arg(long, default_value = "10")]
    max_outer_iterations: usize,

    /// Optional symmetric acceleration limit
    #[arg(long)]
    max_acceleration: Option<f64>,

    /// Enable verbose output (iteration tables)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        init_logger_with_level(Level::DEBUG);
    } else {
        init_logger();
    }

    info!("MANIFOLD-DDP OBSTACLE AVOIDANCE\n");

    let system = Particle2d::new();
    let goal = DVector::zeros(Particle2d::STATE_DIM);
    let cost = LqCost::new(
        Euclidean::new(Particle2d::STATE_DIM),
        DMatrix::from_diagonal(&DVector::from_vec(vec![0.0, 0.0, 0.1, 0.1])),
        DMatrix::identity(2, 2) * 0.1,
        DMatrix::identity(Particle2d::STATE_DIM, Particle2d::STATE_DIM) * 100.0,
        goal,
    )?;

    let obstacle = DiskConstraint::new(0, [args.center[0], args.center[1]], args.radius)?;
    let mut constraints: Vec<Box<dyn Constraint<Euclidean>>> = vec![Box::new(obstacle.clone())];
    if let Some(limit) = args.max_acceleration {
        constraints.push(Box::new(ControlBounds::symmetric(DVector::from_element(
            2, limit,
        ))?));
    }

    let x0 = DVector::from_vec(vec![args.start[0], args.start[1], 0.1, 0.0]);
    let trajectory = Trajectory::new(
        uniform_times(0.0, args.horizon, args.steps),
        vec![x0; args.steps + 1],
        vec![DVector::zeros(2); args.steps],
    )?;

    let config = GDocpConfig::new()
        .with_tolerance(args.tolerance)
        .with_max_outer_iterations(args.max_outer_iterations)
        .with_ddp(DdpConfig::new().with_max_iterations(100));

    info!(
        "Start ({:.2}, {:.2}), obstacle at ({:.2}, {:.2}) with radius {:.2}, {} steps over {:.1}s",
        args.start[0],
        args.start[1],
        args.center[0],
        args.center[1],
        args.radius,
        args.steps,
        args.horizon
    );

    let mut solver = GDocp::new(
        system,
        cost,
        constraints,
        trajectory,
        DVector::zeros(0),
        config,
    )?;
    let summary = solver.solve()?;
    info!("{}", summary);

    let trajectory = solver.trajectory();
    let clearance = trajectory
        .xs
        .iter()
        .map(|x| obstacle.distance(x) - obstacle.radius())
        .fold(f64::INFINITY, f64::min);
    let terminal = trajectory.xs.last().map(Particle2d::position);

    if let Some(position) = terminal {
        info!(
            "Terminal position ({:.4}, {:.4}), minimum clearance {:.4}",
            position.x, position.y, clearance
        );
    }
    if !summary.converged() {
        warn!(
            "Constraint tolerance {:.2e} not reached, best violation {:.3e}",
            args.tolerance, summary.final_violation
        );
    }

    Ok(())
}
