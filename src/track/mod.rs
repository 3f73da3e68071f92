//! Receding-horizon pose/landmark tracking.
//!
//! A simulated car drives around a circular reference track under an unknown
//! body-frame velocity disturbance. Every control tick the harness
//!
//! 1. picks a command (reference control, or a short-horizon DDP plan warm-started
//!    from the shifted previous plan),
//! 2. advances the true car with process noise,
//! 3. records odometry and landmark observations, adding landmarks on first sighting,
//! 4. re-estimates poses, disturbance and landmarks with [`PDdp`](crate::optimizer::PDdp)
//!    over the full history or a trailing window,
//! 5. splices the optimized window back into the history.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::{
    core::CoreError,
    costs::TrackWeights,
    optimizer::{DdpConfig, OptimizerError},
};

pub mod harness;
pub mod history;
pub mod world;

pub use harness::{EstimationReport, TickReport, TrackHarness};
pub use history::TrackHistory;
pub use world::World;

/// Track harness error types
#[derive(Debug, Clone, Error)]
pub enum TrackError {
    /// Invalid harness configuration
    #[error("Invalid track configuration: {0}")]
    InvalidConfig(String),

    /// A window handed back for splicing does not fit the history
    #[error("Window splice mismatch: {0}")]
    SpliceMismatch(String),

    /// Trajectory or cost construction failed
    #[error("Invalid estimation problem")]
    Core(#[from] CoreError),

    /// Estimator or controller failed to start
    #[error("Solver setup failed")]
    Optimizer(#[from] OptimizerError),
}

impl TrackError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    ///
    /// # Arguments
    /// * `source_error` - The original error (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for track harness operations
pub type TrackResult<T> = Result<T, TrackError>;

/// Configuration of the simulated world, the estimator and the controller.
///
/// Noise values are standard deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Control period `h` in seconds
    pub time_step: f64,
    /// Radius of the circular reference track
    pub radius: f64,
    /// Reference forward speed
    pub speed: f64,
    pub landmark_count: usize,
    /// Landmarks are scattered within `radius ± landmark_spread`
    pub landmark_spread: f64,
    /// Landmarks closer than this to the true car are observed
    pub sensor_range: f64,
    /// True body-frame velocity disturbance `(d_x, d_y)`
    pub disturbance: [f64; 2],
    /// Actuation noise on `(v, ω)`
    pub process_noise: [f64; 2],
    /// Odometry noise on `(v, ω)`
    pub odometry_noise: [f64; 2],
    /// Landmark measurement noise per axis
    pub measurement_noise: f64,
    /// Trailing window length `M`; `None` re-solves the full history
    pub window: Option<usize>,
    /// Estimation starts once the time exceeds this value (`Ts`)
    pub solve_start: f64,
    /// PDdp iterations per tick
    pub estimation_iterations: usize,
    pub weights: TrackWeights,
    pub estimation: DdpConfig,
    /// Drive with a receding-horizon DDP instead of the reference control
    pub controller: bool,
    /// Controller horizon in steps of `time_step`
    pub control_steps: usize,
    /// Controller DDP iterations per tick
    pub control_iterations: usize,
    pub control: DdpConfig,
    pub seed: u64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            time_step: 0.1,
            radius: 10.0,
            speed: 2.0,
            landmark_count: 24,
            landmark_spread: 2.0,
            sensor_range: 6.0,
            disturbance: [0.2, 0.1],
            process_noise: [0.05, 0.02],
            odometry_noise: [0.0, 0.0],
            measurement_noise: 0.05,
            window: None,
            solve_start: 1.0,
            estimation_iterations: 10,
            weights: TrackWeights::default(),
            estimation: DdpConfig::default().with_mu(1e-6),
            controller: false,
            control_steps: 20,
            control_iterations: 3,
            control: DdpConfig::default().with_mu(1e-2),
            seed: 1,
        }
    }
}

impl TrackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_track(mut self, radius: f64, speed: f64) -> Self {
        self.radius = radius;
        self.speed = speed;
        self
    }

    pub fn with_landmarks(mut self, count: usize, spread: f64, sensor_range: f64) -> Self {
        self.landmark_count = count;
        self.landmark_spread = spread;
        self.sensor_range = sensor_range;
        self
    }

    pub fn with_disturbance(mut self, disturbance: [f64; 2]) -> Self {
        self.disturbance = disturbance;
        self
    }

    /// Set actuation, odometry and measurement noise in one go.
    pub fn with_noise(mut self, process: [f64; 2], odometry: [f64; 2], measurement: f64) -> Self {
        self.process_noise = process;
        self.odometry_noise = odometry;
        self.measurement_noise = measurement;
        self
    }

    pub fn with_window(mut self, window: Option<usize>) -> Self {
        self.window = window;
        self
    }

    pub fn with_solve_start(mut self, solve_start: f64) -> Self {
        self.solve_start = solve_start;
        self
    }

    pub fn with_estimation_iterations(mut self, iterations: usize) -> Self {
        self.estimation_iterations = iterations;
        self
    }

    pub fn with_weights(mut self, weights: TrackWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_controller(mut self, steps: usize, iterations: usize) -> Self {
        self.controller = true;
        self.control_steps = steps;
        self.control_iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> TrackResult<()> {
        let positive = [
            ("time_step", self.time_step),
            ("radius", self.radius),
            ("speed", self.speed),
            ("sensor_range", self.sensor_range),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| !(*v > 0.0 && v.is_finite())) {
            return Err(TrackError::InvalidConfig(format!(
                "{} must be positive and finite, got {}",
                name, value
            ))
            .log());
        }

        let non_negative = [
            self.landmark_spread,
            self.process_noise[0],
            self.process_noise[1],
            self.odometry_noise[0],
            self.odometry_noise[1],
            self.measurement_noise,
        ];
        if non_negative.iter().any(|v| !(*v >= 0.0 && v.is_finite())) {
            return Err(TrackError::InvalidConfig(
                "noise levels and landmark spread must be non-negative and finite".into(),
            )
            .log());
        }
        if self.disturbance.iter().any(|d| !d.is_finite()) {
            return Err(TrackError::InvalidConfig("disturbance is not finite".into()).log());
        }
        if self.window == Some(0) {
            return Err(
                TrackError::InvalidConfig("window must contain at least one step".into()).log(),
            );
        }
        if self.estimation_iterations == 0 {
            return Err(TrackError::InvalidConfig(
                "estimation_iterations must be at least 1".into(),
            )
            .log());
        }
        if self.controller && (self.control_steps == 0 || self.control_iterations == 0) {
            return Err(TrackError::InvalidConfig(
                "controller needs at least one step and one iteration".into(),
            )
            .log());
        }
        self.estimation.validate()?;
        self.control.validate()?;
        Ok(())
    }

    pub fn print_configuration(&self) {
        debug!(
            "Track configuration:\n  Time step:        {}\n  Track:            r = {}, v = {}\n  Landmarks:        {} (spread {}, range {})\n  Disturbance:      [{}, {}]\n  Window:           {:?}\n  Solve start:      {}\n  Estimation iters: {}\n  Controller:       {} ({} steps, {} iters)\n  Seed:             {}",
            self.time_step,
            self.radius,
            self.speed,
            self.landmark_count,
            self.landmark_spread,
            self.sensor_range,
            self.disturbance[0],
            self.disturbance[1],
            self.window,
            self.solve_start,
            self.estimation_iterations,
            self.controller,
            self.control_steps,
            self.control_iterations,
            self.seed
        );
    }
}
