use nalgebra::{DMatrix, DVector};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use tracing::{debug, info};

use crate::{
    core::{System, Trajectory, uniform_times},
    costs::{LandmarkObservation, LqCost, TrackCost},
    manifold::{LieGroupManifold, SE2},
    observers::TrajectorySnapshot,
    optimizer::{Ddp, IterationOutcome, PDdp, SolverStatus},
    systems::KinematicCar,
    track::{
        TrackConfig, TrackError, TrackHistory, TrackResult, World,
        history::DISTURBANCE_DIM,
    },
};

/// Outcome of the estimation step of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationReport {
    pub status: SolverStatus,
    /// PDdp iterations run this tick
    pub iterations: usize,
    /// First history index of the optimized window
    pub window_start: usize,
    /// Controls in the optimized window
    pub window_len: usize,
    pub active_parameters: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
}

/// Per-tick summary.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub time: f64,
    /// `None` before the estimator starts
    pub estimation: Option<EstimationReport>,
    /// Position error of the latest estimated pose against the truth
    pub estimate_error: f64,
    /// Position error of pure dead reckoning against the truth
    pub odometry_error: f64,
    pub landmark_count: usize,
    pub disturbance: [f64; 2],
}

/// Receding-horizon simulation and estimation loop.
///
/// # Example
///
/// ```
/// use manifold_ddp::track::{TrackConfig, TrackHarness};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TrackConfig::new().with_window(Some(20)).with_estimation_iterations(3);
/// let mut harness = TrackHarness::new(config)?;
/// let reports = harness.run(15)?;
/// assert_eq!(reports.len(), 15);
/// assert!(harness.history().is_consistent());
/// # Ok(())
/// # }
/// ```
pub struct TrackHarness {
    config: TrackConfig,
    world: World,
    /// Car reading the disturbance from `p[0..2]`
    system: KinematicCar,
    history: TrackHistory,
    true_parameters: DVector<f64>,
    rng: StdRng,
    process_noise: [Normal<f64>; 2],
    odometry_noise: [Normal<f64>; 2],
    /// Controller plan, shifted by one step every tick
    plan: Vec<DVector<f64>>,
    time: f64,
}

fn noise_pair(std_devs: [f64; 2], name: &str) -> TrackResult<[Normal<f64>; 2]> {
    let make = |std_dev: f64| {
        Normal::new(0.0, std_dev).map_err(|e| {
            TrackError::InvalidConfig(format!("invalid {} noise {}", name, std_dev))
                .log_with_source(e)
        })
    };
    Ok([make(std_devs[0])?, make(std_devs[1])?])
}

impl TrackHarness {
    /// Build the world, place the car on the reference track and record the
    /// landmarks visible from the start pose.
    pub fn new(config: TrackConfig) -> TrackResult<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let world = World::new(&config, &mut rng)?;
        let process_noise = noise_pair(config.process_noise, "process")?;
        let odometry_noise = noise_pair(config.odometry_noise, "odometry")?;

        let x0 = world.reference_pose(0.0);
        let history = TrackHistory::new(0.0, x0);
        let plan = vec![world.reference_control(); config.control_steps];
        let true_parameters = DVector::from_vec(config.disturbance.to_vec());

        let mut harness = Self {
            config,
            world,
            system: KinematicCar::with_disturbance(),
            history,
            true_parameters,
            rng,
            process_noise,
            odometry_noise,
            plan,
            time: 0.0,
        };
        harness.record_observations();

        if tracing::enabled!(tracing::Level::DEBUG) {
            harness.config.print_configuration();
        }
        Ok(harness)
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn history(&self) -> &TrackHistory {
        &self.history
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Owned copy of the estimated `(ts, xs, us, p)` for viewers.
    pub fn snapshot(&self) -> TrajectorySnapshot<SE2> {
        TrajectorySnapshot {
            ts: self.history.ts().to_vec(),
            xs: self.history.xs().to_vec(),
            us: self.history.us().to_vec(),
            p: self.history.parameters().clone(),
        }
    }

    /// Run `ticks` control periods.
    pub fn run(&mut self, ticks: usize) -> TrackResult<Vec<TickReport>> {
        let reports = (0..ticks)
            .map(|_| self.tick())
            .collect::<TrackResult<Vec<_>>>()?;
        if let Some(last) = reports.last() {
            info!(
                "Track finished at t = {:.2}: estimate error {:.3}, odometry error {:.3}, {} landmarks",
                last.time, last.estimate_error, last.odometry_error, last.landmark_count
            );
        }
        Ok(reports)
    }

    /// One control period: command, simulate, measure, re-estimate, splice.
    pub fn tick(&mut self) -> TrackResult<TickReport> {
        let h = self.config.time_step;
        let t = self.time;
        let command = self.command()?;

        let actuation = &command
            + DVector::from_vec(vec![
                self.process_noise[0].sample(&mut self.rng),
                self.process_noise[1].sample(&mut self.rng),
            ]);
        let measured = &command
            + DVector::from_vec(vec![
                self.odometry_noise[0].sample(&mut self.rng),
                self.odometry_noise[1].sample(&mut self.rng),
            ]);

        let last = self.history.len() - 1;
        let truth = self.system.step(
            t,
            &self.history.true_xs()[last],
            &actuation,
            h,
            &self.true_parameters,
            None,
        );
        let estimate = self.system.step(
            t,
            &self.history.xs()[last],
            &measured,
            h,
            self.history.parameters(),
            None,
        );
        let dead_reckoning = self.system.step(
            t,
            &self.history.odometry_xs()[last],
            &measured,
            h,
            &DVector::zeros(DISTURBANCE_DIM),
            None,
        );

        self.time = t + h;
        self.history
            .push(self.time, truth, estimate, dead_reckoning, measured);
        self.record_observations();

        let estimation = if self.time > self.config.solve_start {
            Some(self.estimate()?)
        } else {
            None
        };

        let n = self.history.len() - 1;
        let truth = self.history.true_xs()[n].translation();
        let report = TickReport {
            time: self.time,
            estimation,
            estimate_error: (self.history.xs()[n].translation() - truth).norm(),
            odometry_error: (self.history.odometry_xs()[n].translation() - truth).norm(),
            landmark_count: self.history.landmark_count(),
            disturbance: [self.history.parameters()[0], self.history.parameters()[1]],
        };
        debug!(
            "t = {:.2}: estimate error {:.4}, odometry error {:.4}, {} landmarks",
            report.time, report.estimate_error, report.odometry_error, report.landmark_count
        );
        Ok(report)
    }

    /// Observe from the latest true pose; unseen landmarks are initialized
    /// through the latest estimated pose.
    fn record_observations(&mut self) {
        let last = self.history.len() - 1;
        let truth = self.history.true_xs()[last].clone();
        let estimate = self.history.xs()[last].clone();

        let observations = self
            .world
            .observe(&truth, &mut self.rng)
            .into_iter()
            .map(|(world_id, measurement)| {
                let landmark = match self.history.estimate_index(world_id) {
                    Some(index) => index,
                    None => self
                        .history
                        .add_landmark(world_id, estimate.transform_point(&measurement)),
                };
                LandmarkObservation {
                    landmark,
                    measurement,
                }
            })
            .collect();
        self.history.observe(observations);
    }

    /// Next command: the reference control, or the first control of a DDP plan
    /// tracking the reference `control_steps` ahead.
    fn command(&mut self) -> TrackResult<DVector<f64>> {
        if !self.config.controller {
            return Ok(self.world.reference_control());
        }

        let h = self.config.time_step;
        let steps = self.config.control_steps;
        let t = self.time;
        let references: Vec<SE2> = (0..steps)
            .map(|k| self.world.reference_pose(t + k as f64 * h))
            .collect();
        let goal = self.world.reference_pose(t + steps as f64 * h);

        let cost = LqCost::new(
            LieGroupManifold::<SE2>::new(),
            DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0, 0.5])),
            DMatrix::identity(2, 2) * 0.05,
            DMatrix::identity(3, 3) * 10.0,
            goal,
        )?
        .with_state_references(references)
        .with_control_reference(self.world.reference_control())?;

        let x0 = self.history.xs()[self.history.len() - 1].clone();
        let trajectory = Trajectory::new(
            uniform_times(t, t + steps as f64 * h, steps),
            vec![x0; steps + 1],
            self.plan.clone(),
        )?;
        let disturbance = DVector::from_vec(vec![
            self.history.parameters()[0],
            self.history.parameters()[1],
        ]);

        let mut ddp = Ddp::new(
            &self.system,
            cost,
            trajectory,
            disturbance,
            self.config.control.clone(),
        )?;
        for _ in 0..self.config.control_iterations {
            let report = ddp.iterate();
            if matches!(
                report.outcome,
                IterationOutcome::Converged | IterationOutcome::Diverged
            ) {
                break;
            }
        }

        // Warm start for the next tick: drop the applied control, repeat the last one
        let mut plan = ddp.into_trajectory().us;
        let command = plan.remove(0);
        if let Some(tail) = plan.last().cloned() {
            plan.push(tail);
        } else {
            plan.push(command.clone());
        }
        self.plan = plan;
        Ok(command)
    }

    /// Re-estimate poses, controls, disturbance and the landmarks seen in the
    /// active window, then splice the result back into the history.
    fn estimate(&mut self) -> TrackResult<EstimationReport> {
        let start = self.history.window_start(self.config.window);
        let window = self.history.window(start)?;
        let window_len = window.horizon();

        let mut active: Vec<usize> = (0..DISTURBANCE_DIM).collect();
        for landmark in self.history.observed_landmarks(start) {
            let slot = DISTURBANCE_DIM + 2 * landmark;
            active.extend([slot, slot + 1]);
        }

        let (trajectory, p, report) = {
            let cost = TrackCost::new(
                self.history.odometry(),
                self.history.observations(),
                self.config.weights,
            )?
            .with_offset(start)
            .with_disturbance_dim(DISTURBANCE_DIM);

            let mut pddp = PDdp::new(
                &self.system,
                cost,
                window,
                self.history.parameters().clone(),
                self.config.estimation.clone(),
            )?;
            pddp.set_active_parameters(active)?;

            let initial_cost = pddp.current_cost();
            let mut status = SolverStatus::MaxIterationsReached;
            let mut iterations = 0;
            for _ in 0..self.config.estimation_iterations {
                let report = pddp.iterate();
                match report.outcome {
                    IterationOutcome::Converged => {
                        status = SolverStatus::Converged;
                        break;
                    }
                    IterationOutcome::Diverged => {
                        iterations += 1;
                        status = SolverStatus::Diverged;
                        break;
                    }
                    _ => iterations += 1,
                }
            }

            let report = EstimationReport {
                status,
                iterations,
                window_start: start,
                window_len,
                active_parameters: pddp.active_parameters().len(),
                initial_cost,
                final_cost: pddp.current_cost(),
            };
            let (trajectory, p) = pddp.into_parts();
            (trajectory, p, report)
        };

        self.history.splice(start, trajectory, p)?;
        Ok(report)
    }
}
