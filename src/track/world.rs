use nalgebra::{DVector, Vector2};
use rand::{Rng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use std::f64::consts::{FRAC_PI_2, TAU};

use crate::{
    manifold::SE2,
    track::{TrackConfig, TrackError, TrackResult},
};

/// Ground-truth landmarks and the circular reference track.
///
/// The track is centered at the origin. The reference pose at time `t` sits at
/// angle `ωt` on the circle, heading tangentially, with `ω = speed / radius`.
#[derive(Debug, Clone)]
pub struct World {
    landmarks: Vec<Vector2<f64>>,
    radius: f64,
    speed: f64,
    sensor_range: f64,
    measurement_noise: Normal<f64>,
}

impl World {
    /// Scatter `landmark_count` landmarks around the track.
    ///
    /// Landmarks are spread evenly in angle with a random jitter, on radii
    /// drawn uniformly from `radius ± landmark_spread`.
    pub fn new(config: &TrackConfig, rng: &mut StdRng) -> TrackResult<Self> {
        let measurement_noise = Normal::new(0.0, config.measurement_noise).map_err(|e| {
            TrackError::InvalidConfig("invalid measurement noise".into()).log_with_source(e)
        })?;

        let count = config.landmark_count;
        let sector = TAU / count.max(1) as f64;
        let landmarks = (0..count)
            .map(|i| {
                let angle = sector * (i as f64 + rng.random_range(0.0..1.0));
                let ring = if config.landmark_spread > 0.0 {
                    config.radius
                        + rng.random_range(-config.landmark_spread..=config.landmark_spread)
                } else {
                    config.radius
                };
                Vector2::new(ring * angle.cos(), ring * angle.sin())
            })
            .collect();

        Ok(Self {
            landmarks,
            radius: config.radius,
            speed: config.speed,
            sensor_range: config.sensor_range,
            measurement_noise,
        })
    }

    pub fn landmarks(&self) -> &[Vector2<f64>] {
        &self.landmarks
    }

    /// Reference angular rate `speed / radius`.
    pub fn yaw_rate(&self) -> f64 {
        self.speed / self.radius
    }

    pub fn reference_pose(&self, t: f64) -> SE2 {
        let angle = self.yaw_rate() * t;
        SE2::from_xy_angle(
            self.radius * angle.cos(),
            self.radius * angle.sin(),
            angle + FRAC_PI_2,
        )
    }

    /// Control `(v, ω)` that keeps a disturbance-free car on the track.
    pub fn reference_control(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.speed, self.yaw_rate()])
    }

    /// Noisy vehicle-frame positions of every landmark within sensor range of `pose`.
    ///
    /// Returns `(world landmark index, measurement)` pairs in index order.
    pub fn observe(&self, pose: &SE2, rng: &mut StdRng) -> Vec<(usize, Vector2<f64>)> {
        self.landmarks
            .iter()
            .enumerate()
            .filter(|(_, l)| (*l - pose.translation()).norm() <= self.sensor_range)
            .map(|(i, l)| {
                let noise = Vector2::new(
                    self.measurement_noise.sample(rng),
                    self.measurement_noise.sample(rng),
                );
                (i, pose.inverse_transform_point(l) + noise)
            })
            .collect()
    }
}
