//! Integration tests for manifold-ddp
//!
//! End-to-end scenarios that exercise the optimizers through the public API.
//!
//! # Test Coverage
//!
//! - **Ddp**: exact LQR step against a Riccati recursion, double integrator reach
//! - **GDocp**: disk obstacle avoidance with a monotone violation history
//! - **PDdp**: gyro bias on SO(3), car disturbance and landmarks on SE(2)
//! - **Track harness**: window splicing and estimation accuracy
//! - **Manifolds**: retract/difference round trips
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test integration_tests
//! ```

use manifold_ddp::{
    ManifoldDdpError,
    constraints::DiskConstraint,
    core::{Constraint, System, Trajectory, rollout, uniform_times},
    costs::{LandmarkObservation, LqCost, TrackCost, TrackWeights},
    manifold::{Euclidean, LieGroup, LieGroupManifold, Manifold, SE2, SO3},
    optimizer::{Ddp, DdpConfig, GDocp, GDocpConfig, IterationOutcome, PDdp, SolverStatus},
    systems::{Attitude3d, KinematicCar, LinearSystem, Particle2d},
    track::{TrackConfig, TrackHarness},
};
use nalgebra::{DMatrix, DVector, Vector2, Vector3};

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Diagonal quadratic cost driving a planar point mass to rest at the origin.
fn double_integrator_cost() -> Result<LqCost<Euclidean>, Box<dyn std::error::Error>> {
    Ok(LqCost::new(
        Euclidean::new(Particle2d::STATE_DIM),
        DMatrix::identity(4, 4) * 0.01,
        DMatrix::identity(2, 2) * 0.1,
        DMatrix::identity(4, 4) * 1000.0,
        DVector::zeros(4),
    )?)
}

/// Start (-5, -5) with a small initial velocity, 32 steps over 10 s.
fn double_integrator_trajectory() -> Result<Trajectory<DVector<f64>>, Box<dyn std::error::Error>> {
    let steps = 32;
    let x0 = DVector::from_vec(vec![-5.0, -5.0, 0.1, 0.0]);
    Ok(Trajectory::new(
        uniform_times(0.0, 10.0, steps),
        vec![x0; steps + 1],
        vec![DVector::zeros(2); steps],
    )?)
}

#[test]
fn test_lqr_step_matches_riccati_solution() -> TestResult {
    let h = 0.1;
    let steps = 20;
    let a = DMatrix::from_row_slice(3, 3, &[1.0, h, 0.0, 0.0, 1.0, h, 0.0, 0.0, 0.9]);
    let b = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, h, 0.0, 0.0, h]);
    let q = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 0.5, 0.2]));
    let r = DMatrix::from_diagonal(&DVector::from_vec(vec![0.3, 0.7]));
    let qf = DMatrix::identity(3, 3) * 5.0;

    let system = LinearSystem::new(a.clone(), b.clone())?;
    let cost = LqCost::new(
        Euclidean::new(3),
        q.clone(),
        r.clone(),
        qf.clone(),
        DVector::zeros(3),
    )?;
    let x0 = DVector::from_vec(vec![1.0, -2.0, 0.5]);
    let trajectory = Trajectory::new(
        uniform_times(0.0, steps as f64 * h, steps),
        vec![x0.clone(); steps + 1],
        vec![DVector::zeros(2); steps],
    )?;

    // Stage cost is (h/2)(xᵀQx + uᵀRu), terminal cost ½ xᵀQf x
    let mut p = qf;
    let mut gains = vec![DMatrix::zeros(2, 3); steps];
    for k in (0..steps).rev() {
        let bt_p = b.transpose() * &p;
        let lhs = &r * h + &bt_p * &b;
        let gain = lhs
            .cholesky()
            .ok_or("Riccati control Hessian not positive definite")?
            .solve(&(&bt_p * &a));
        let at_p = a.transpose() * &p;
        p = &q * h + &at_p * &a - &at_p * &b * &gain;
        gains[k] = gain;
    }
    let mut expected_xs = vec![x0];
    let mut expected_us = Vec::with_capacity(steps);
    for gain in &gains {
        let x = expected_xs.last().ok_or("empty rollout")?.clone();
        let u = -(gain * &x);
        expected_xs.push(&a * &x + &b * &u);
        expected_us.push(u);
    }

    let mut ddp = Ddp::new(system, cost, trajectory, DVector::zeros(0), DdpConfig::new())?;
    let report = ddp.iterate();
    assert_eq!(report.outcome, IterationOutcome::Accepted);
    assert_eq!(report.step_size, 1.0);

    let result = ddp.trajectory();
    for (u, expected) in result.us.iter().zip(&expected_us) {
        assert!((u - expected).norm() < 1e-8, "control {} vs {}", u, expected);
    }
    for (x, expected) in result.xs.iter().zip(&expected_xs) {
        assert!((x - expected).norm() < 1e-8);
    }

    // Nothing left to improve
    assert_eq!(ddp.iterate().outcome, IterationOutcome::Converged);
    Ok(())
}

#[test]
fn test_double_integrator_reaches_origin_in_one_iteration() -> TestResult {
    let mut ddp = Ddp::new(
        Particle2d::new(),
        double_integrator_cost()?,
        double_integrator_trajectory()?,
        DVector::zeros(0),
        DdpConfig::new(),
    )?;
    let summary = ddp.solve();

    assert_eq!(summary.status, SolverStatus::Converged);
    assert_eq!(summary.successful_steps, 1);
    assert_eq!(summary.iterations, 1);
    assert!(summary.final_cost < summary.initial_cost);

    let terminal = ddp.trajectory().xs.last().ok_or("empty trajectory")?;
    let error = Particle2d::position(terminal).norm();
    assert!(error < 1e-2, "terminal position error {}", error);
    Ok(())
}

#[test]
fn test_disk_constraint_converges_with_decreasing_violation() -> TestResult {
    let radius = 2.0;
    let tolerance = 1e-2;
    let obstacle = DiskConstraint::new(0, [-2.5, -2.5], radius)?;
    let constraints: Vec<Box<dyn Constraint<Euclidean>>> = vec![Box::new(obstacle.clone())];
    let config = GDocpConfig::new()
        .with_tolerance(tolerance)
        .with_max_outer_iterations(10);

    let mut solver = GDocp::new(
        Particle2d::new(),
        double_integrator_cost()?,
        constraints,
        double_integrator_trajectory()?,
        DVector::zeros(0),
        config,
    )?;
    let summary = solver.solve()?;

    assert_eq!(summary.status, SolverStatus::Converged);
    assert!(summary.final_violation <= tolerance);

    // The straight path to the goal crosses the disk, so the first weight is not enough
    let history = summary.violation_history();
    assert!(history.len() > 1 && history.len() <= 10);
    assert!(history[0] > tolerance);
    for pair in history.windows(2) {
        assert!(pair[1] < pair[0], "violation history {:?}", history);
    }

    let min_distance = solver
        .trajectory()
        .xs
        .iter()
        .map(|x| obstacle.distance(x))
        .fold(f64::INFINITY, f64::min);
    assert!(min_distance >= radius - tolerance, "min distance {}", min_distance);
    Ok(())
}

#[test]
fn test_window_splice_matches_direct_sub_horizon_solve() -> TestResult {
    // Record a noisy history without running the estimator
    let config = TrackConfig::new()
        .with_solve_start(1e6)
        .with_noise([0.05, 0.02], [0.02, 0.01], 0.05)
        .with_seed(7);
    let mut harness = TrackHarness::new(config)?;
    harness.run(30)?;
    let history = harness.history().clone();

    let window = 12;
    let start = history.window_start(Some(window));
    assert_eq!(start, 18);
    let weights = TrackWeights::default();
    let solver_config = DdpConfig::new().with_max_iterations(20).with_mu(1e-6);
    let mut active = vec![0, 1];
    for landmark in history.observed_landmarks(start) {
        active.extend([2 + 2 * landmark, 3 + 2 * landmark]);
    }
    assert!(active.len() > 2);

    // Direct: only the last M steps of every buffer, offset 0
    let direct = {
        let odometry = &history.odometry()[start..];
        let observations = &history.observations()[start..];
        let cost = TrackCost::new(odometry, observations, weights)?;
        let mut pddp = PDdp::new(
            KinematicCar::with_disturbance(),
            cost,
            history.window(start)?,
            history.parameters().clone(),
            solver_config.clone(),
        )?;
        pddp.set_active_parameters(active.clone())?;
        pddp.solve();
        pddp.into_parts()
    };

    // Spliced: full buffers read through an offset, result written back
    let mut spliced_history = history.clone();
    let (window_trajectory, p) = {
        let cost = TrackCost::new(history.odometry(), history.observations(), weights)?
            .with_offset(start);
        let mut pddp = PDdp::new(
            KinematicCar::with_disturbance(),
            cost,
            history.window(start)?,
            history.parameters().clone(),
            solver_config,
        )?;
        pddp.set_active_parameters(active)?;
        pddp.solve();
        pddp.into_parts()
    };
    spliced_history.splice(start, window_trajectory, p)?;

    let manifold = LieGroupManifold::<SE2>::new();
    for (x, expected) in spliced_history.xs()[start..].iter().zip(&direct.0.xs) {
        assert!(manifold.difference(expected, x).norm() < 1e-12);
    }
    for (u, expected) in spliced_history.us()[start..].iter().zip(&direct.0.us) {
        assert!((u - expected).norm() < 1e-12);
    }
    assert!((spliced_history.parameters() - &direct.1).norm() < 1e-12);

    // Prefix untouched
    for (x, original) in spliced_history.xs()[..=start].iter().zip(history.xs()) {
        assert!(x.is_approx(original, 1e-15));
    }
    assert!(spliced_history.is_consistent());
    Ok(())
}

#[test]
fn test_pddp_recovers_gyro_bias() -> TestResult {
    let system = Attitude3d::new();
    let steps = 40;
    let ts = uniform_times(0.0, 4.0, steps);
    let true_rate = DVector::from_vec(vec![0.3, -0.2, 0.5]);
    let bias = DVector::from_vec(vec![0.02, -0.01, 0.03]);
    let measured_rate = &true_rate + &bias;

    let x0 = SO3::from_euler_angles(0.1, -0.2, 0.3);
    let truth = rollout(
        &system,
        &ts,
        &x0,
        &vec![true_rate.clone(); steps],
        &DVector::zeros(3),
    );
    let goal = truth.last().ok_or("empty rollout")?.clone();

    // Attitude references act as measurements; the rate measurement is the control prior
    let cost = LqCost::new(
        LieGroupManifold::<SO3>::new(),
        DMatrix::identity(3, 3) * 100.0,
        DMatrix::identity(3, 3),
        DMatrix::identity(3, 3) * 100.0,
        goal,
    )?
    .with_state_references(truth.clone())
    .with_control_reference(measured_rate.clone())?;

    let trajectory = Trajectory::new(ts, vec![x0; steps + 1], vec![measured_rate; steps])?;
    let config = DdpConfig::new().with_max_iterations(100);
    let mut pddp = PDdp::new(system, cost, trajectory, DVector::zeros(3), config)?;
    let summary = pddp.solve();

    assert_eq!(summary.status, SolverStatus::Converged);
    let error = (pddp.parameters() - &bias).norm();
    assert!(error < 1e-3, "bias error {}", error);

    let manifold = LieGroupManifold::<SO3>::new();
    for (x, expected) in pddp.trajectory().xs.iter().zip(&truth) {
        assert!(manifold.difference(expected, x).norm() < 1e-3);
    }
    Ok(())
}

#[test]
fn test_pddp_recovers_car_disturbance_and_landmarks() -> TestResult {
    let system = KinematicCar::with_disturbance();
    let steps = 30;
    let ts = uniform_times(0.0, 3.0, steps);
    let command = DVector::from_vec(vec![2.0, 0.3]);
    let disturbance = [0.2, -0.1];
    let landmarks = [
        Vector2::new(3.0, 4.0),
        Vector2::new(5.0, -2.0),
        Vector2::new(-1.0, 3.0),
    ];

    let mut true_p = DVector::zeros(2 + 2 * landmarks.len());
    true_p[0] = disturbance[0];
    true_p[1] = disturbance[1];
    for (i, landmark) in landmarks.iter().enumerate() {
        true_p[2 + 2 * i] = landmark.x;
        true_p[3 + 2 * i] = landmark.y;
    }

    let x0 = SE2::from_xy_angle(0.0, 0.0, 0.2);
    let controls = vec![command.clone(); steps];
    let truth = rollout(&system, &ts, &x0, &controls, &true_p);
    let observations: Vec<Vec<LandmarkObservation>> = truth
        .iter()
        .map(|pose| {
            landmarks
                .iter()
                .enumerate()
                .map(|(i, l)| LandmarkObservation {
                    landmark: i,
                    measurement: pose.inverse_transform_point(l),
                })
                .collect()
        })
        .collect();

    let weights = TrackWeights {
        disturbance_prior: 0.0,
        ..TrackWeights::default()
    };
    let cost = TrackCost::new(&controls, &observations, weights)?;

    // Zero disturbance and displaced landmarks as the starting guess
    let mut p = true_p.clone();
    p[0] = 0.0;
    p[1] = 0.0;
    for i in 0..landmarks.len() {
        p[2 + 2 * i] += 0.3;
        p[3 + 2 * i] -= 0.2;
    }

    let trajectory = Trajectory::new(ts, vec![x0; steps + 1], controls.clone())?;
    let config = DdpConfig::new().with_max_iterations(100);
    let mut pddp = PDdp::new(&system, cost, trajectory, p, config)?;
    let summary = pddp.solve();

    assert_eq!(summary.status, SolverStatus::Converged);
    assert!(summary.final_cost < 1e-8, "final cost {}", summary.final_cost);
    let error = (pddp.parameters() - &true_p).norm();
    assert!(error < 1e-3, "parameter error {}", error);

    let manifold = system.manifold();
    for (x, expected) in pddp.trajectory().xs.iter().zip(&truth) {
        assert!(manifold.difference(expected, x).norm() < 1e-3);
    }
    Ok(())
}

#[test]
fn test_track_estimate_beats_dead_reckoning() -> TestResult {
    let config = TrackConfig::new()
        .with_noise([0.0, 0.0], [0.0, 0.0], 0.0)
        .with_disturbance([0.2, 0.1])
        .with_window(Some(20))
        .with_estimation_iterations(10);
    let mut harness = TrackHarness::new(config)?;
    let reports = harness.run(40)?;

    assert!(harness.history().is_consistent());
    assert!(reports.iter().filter(|r| r.estimation.is_some()).count() >= 29);
    let last = reports.last().ok_or("no ticks")?;
    assert!(last.odometry_error > 0.1);
    assert!(
        last.estimate_error < last.odometry_error,
        "estimate {} vs odometry {}",
        last.estimate_error,
        last.odometry_error
    );
    Ok(())
}

#[test]
fn test_manifold_round_trip() {
    let euclidean = Euclidean::new(3);
    let x = DVector::from_vec(vec![1.0, -2.0, 0.5]);
    let y = DVector::from_vec(vec![0.3, 4.0, -1.5]);
    let delta = euclidean.difference(&x, &y);
    assert!((euclidean.retract(&x, &delta) - &y).norm() < 1e-12);
    assert!(euclidean.difference(&x, &x).norm() < 1e-12);

    let rotations = LieGroupManifold::<SO3>::new();
    let r1 = SO3::from_euler_angles(0.4, -0.3, 1.2);
    let r2 = SO3::from_euler_angles(-1.0, 0.2, 2.5);
    let delta = rotations.difference(&r1, &r2);
    assert!(rotations.retract(&r1, &delta).is_approx(&r2, 1e-10));
    assert!(rotations.difference(&r1, &r1).norm() < 1e-12);

    // Rotation vectors act as expected on a point
    let yaw = DVector::from_vec(vec![0.0, 0.0, std::f64::consts::FRAC_PI_2]);
    let quarter_turn = rotations.retract(&SO3::identity(), &yaw);
    let rotated = quarter_turn.act(&Vector3::new(1.0, 0.0, 0.0));
    assert!((rotated - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
}

#[test]
fn test_invalid_track_config_reports_error_chain() {
    let config = TrackConfig::new().with_time_step(-0.1);
    let error = match TrackHarness::new(config) {
        Ok(_) => panic!("negative time step accepted"),
        Err(e) => ManifoldDdpError::from(e),
    };
    assert!(matches!(error, ManifoldDdpError::Track(_)));
    assert!(error.chain_compact().contains("time_step"));
}
