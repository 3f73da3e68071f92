//! Pose/landmark estimation cost.
//!
//! The estimated controls are the vehicle's body velocities. The parameter
//! vector carries a leading disturbance block followed by one planar slot per
//! landmark:
//!
//! ```text
//! p = [d_x, d_y, l₀ₓ, l₀ᵧ, l₁ₓ, l₁ᵧ, ...]
//! ```
//!
//! # Residuals
//!
//! ```text
//! odometry      e_u = u - ũ                     1/2 e_uᵀ W_u e_u
//! observation   r   = Rᵀ (l - t) - z            1/2 rᵀ W_z r
//! disturbance   e_d = d - d̄ (terminal only)     1/2 e_dᵀ W_d e_d
//! ```
//!
//! With a right perturbation `(ρ, θ)` of the pose, `∂r/∂ρ = -I`,
//! `∂r/∂θ = (q_y, -q_x)` for `q = Rᵀ(l - t)`, and `∂r/∂l = Rᵀ`.

use nalgebra::{DVector, Matrix2x3, Vector2};
use serde::{Deserialize, Serialize};

use crate::{
    core::{CoreError, CoreResult, Cost, CostExpansion},
    manifold::{LieGroupManifold, SE2},
};

/// Range-bearing style measurement of a landmark in the vehicle frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkObservation {
    /// Landmark index in the estimate (slot `landmark` of `p` after the disturbance block)
    pub landmark: usize,
    pub measurement: Vector2<f64>,
}

/// Diagonal information weights of the track residuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackWeights {
    /// Odometry weight per control channel `(v, ω)`
    pub odometry: [f64; 2],
    /// Isotropic landmark observation weight
    pub observation: f64,
    /// Isotropic weight of the zero-mean disturbance prior
    pub disturbance_prior: f64,
}

impl Default for TrackWeights {
    fn default() -> Self {
        Self {
            odometry: [100.0, 100.0],
            observation: 25.0,
            disturbance_prior: 1.0,
        }
    }
}

/// Odometry plus landmark observation cost over a window of a recorded history.
///
/// Step `k` of the optimized horizon reads the measurements recorded at
/// history index `offset + k`, so the same buffers serve both full-history and
/// sliding-window solves.
#[derive(Debug, Clone)]
pub struct TrackCost<'a> {
    odometry: &'a [DVector<f64>],
    observations: &'a [Vec<LandmarkObservation>],
    weights: TrackWeights,
    offset: usize,
    disturbance_dim: usize,
}

impl<'a> TrackCost<'a> {
    /// # Arguments
    /// * `odometry` - Measured controls, one per history step
    /// * `observations` - Landmark observations, one list per history state
    pub fn new(
        odometry: &'a [DVector<f64>],
        observations: &'a [Vec<LandmarkObservation>],
        weights: TrackWeights,
    ) -> CoreResult<Self> {
        if observations.len() != odometry.len() + 1 {
            return Err(CoreError::SizeMismatch(format!(
                "{} observation lists for {} odometry steps",
                observations.len(),
                odometry.len()
            ))
            .log());
        }
        let finite = weights.odometry.iter().all(|w| w.is_finite() && *w >= 0.0)
            && weights.observation.is_finite()
            && weights.observation >= 0.0
            && weights.disturbance_prior.is_finite()
            && weights.disturbance_prior >= 0.0;
        if !finite {
            return Err(CoreError::InvalidInput(format!("invalid track weights {:?}", weights)).log());
        }
        Ok(Self {
            odometry,
            observations,
            weights,
            offset: 0,
            disturbance_dim: 2,
        })
    }

    /// Start the optimized horizon at history index `offset`.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Number of leading disturbance entries of `p` (2 by default, 0 to disable).
    pub fn with_disturbance_dim(mut self, dim: usize) -> Self {
        self.disturbance_dim = dim;
        self
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Index of the first coordinate of `landmark` in `p`.
    pub fn landmark_slot(&self, landmark: usize) -> usize {
        self.disturbance_dim + 2 * landmark
    }

    fn observation_term(
        &self,
        index: usize,
        x: &SE2,
        p: &DVector<f64>,
        mut expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        let Some(observations) = self.observations.get(index) else {
            return 0.0;
        };
        let w = self.weights.observation;
        let rt = x.rotation_matrix().transpose();
        let t = x.translation();
        let mut value = 0.0;

        for observation in observations {
            let slot = self.landmark_slot(observation.landmark);
            if slot + 2 > p.len() {
                continue;
            }
            let landmark = Vector2::new(p[slot], p[slot + 1]);
            let q = rt * (landmark - t);
            let r = q - observation.measurement;
            value += 0.5 * w * r.norm_squared();

            if let Some(expansion) = expansion.as_deref_mut() {
                let jx = Matrix2x3::new(-1.0, 0.0, q.y, 0.0, -1.0, -q.x);
                let gx = jx.transpose() * r * w;
                let hxx = jx.transpose() * jx * w;
                let gl = rt.transpose() * r * w;
                let hlx = rt.transpose() * jx * w;

                for i in 0..3 {
                    expansion.lx[i] += gx[i];
                    for j in 0..3 {
                        expansion.lxx[(i, j)] += hxx[(i, j)];
                    }
                }
                for i in 0..2 {
                    expansion.lp[slot + i] += gl[i];
                    // RᵀR = I
                    expansion.lpp[(slot + i, slot + i)] += w;
                    for j in 0..3 {
                        expansion.lpx[(slot + i, j)] += hlx[(i, j)];
                    }
                }
            }
        }
        value
    }
}

impl Cost<LieGroupManifold<SE2>> for TrackCost<'_> {
    fn stage(
        &self,
        k: usize,
        _t: f64,
        x: &SE2,
        u: &DVector<f64>,
        _h: f64,
        p: &DVector<f64>,
        mut expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        let index = self.offset + k;
        let mut value = self.observation_term(index, x, p, expansion.as_deref_mut());

        if let Some(measured) = self.odometry.get(index) {
            for i in 0..u.len().min(2) {
                let w = self.weights.odometry[i];
                let e = u[i] - measured[i];
                value += 0.5 * w * e * e;
                if let Some(expansion) = expansion.as_deref_mut() {
                    expansion.lu[i] += w * e;
                    expansion.luu[(i, i)] += w;
                }
            }
        }
        value
    }

    fn terminal(
        &self,
        k: usize,
        _t: f64,
        x: &SE2,
        p: &DVector<f64>,
        mut expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        let mut value = self.observation_term(self.offset + k, x, p, expansion.as_deref_mut());

        let w = self.weights.disturbance_prior;
        for i in 0..self.disturbance_dim.min(p.len()) {
            value += 0.5 * w * p[i] * p[i];
            if let Some(expansion) = expansion.as_deref_mut() {
                expansion.lp[i] += w * p[i];
                expansion.lpp[(i, i)] += w;
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::cost::test_utils::max_stage_gradient_error,
        manifold::LieGroup,
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn measurements() -> (Vec<DVector<f64>>, Vec<Vec<LandmarkObservation>>) {
        let odometry = vec![
            DVector::from_vec(vec![1.0, 0.1]),
            DVector::from_vec(vec![0.9, -0.2]),
        ];
        let observations = vec![
            vec![],
            vec![
                LandmarkObservation {
                    landmark: 0,
                    measurement: Vector2::new(2.0, 1.0),
                },
                LandmarkObservation {
                    landmark: 1,
                    measurement: Vector2::new(-1.0, 3.0),
                },
            ],
            vec![LandmarkObservation {
                landmark: 1,
                measurement: Vector2::new(0.5, 0.5),
            }],
        ];
        (odometry, observations)
    }

    #[test]
    fn test_track_cost_requires_one_observation_list_per_state() {
        let (odometry, observations) = measurements();
        let result = TrackCost::new(&odometry, &observations[..2], TrackWeights::default());
        assert!(matches!(result, Err(CoreError::SizeMismatch(_))));
    }

    #[test]
    fn test_track_cost_zero_at_consistent_estimate() -> TestResult {
        let (odometry, _) = measurements();
        let x = SE2::from_xy_angle(1.0, 2.0, 0.4);
        let landmark = Vector2::new(4.0, -1.0);
        let observations = vec![
            vec![],
            vec![LandmarkObservation {
                landmark: 0,
                measurement: x.inverse_transform_point(&landmark),
            }],
            vec![],
        ];
        let cost = TrackCost::new(&odometry, &observations, TrackWeights::default())?;
        let p = DVector::from_vec(vec![0.0, 0.0, landmark.x, landmark.y]);
        let value = cost.stage(1, 0.0, &x, &odometry[1], 0.1, &p, None);
        assert!(value.abs() < 1e-20);
        Ok(())
    }

    #[test]
    fn test_track_cost_offset_reads_later_measurements() -> TestResult {
        let (odometry, observations) = measurements();
        let weights = TrackWeights::default();
        let full = TrackCost::new(&odometry, &observations, weights)?;
        let window = TrackCost::new(&odometry, &observations, weights)?.with_offset(1);

        let x = SE2::from_xy_angle(0.3, -0.2, 1.0);
        let u = DVector::from_vec(vec![0.7, 0.0]);
        let p = DVector::from_vec(vec![0.1, 0.0, 1.0, 2.0, -3.0, 0.5]);
        let expected = full.stage(1, 0.0, &x, &u, 0.1, &p, None);
        assert_eq!(window.stage(0, 0.0, &x, &u, 0.1, &p, None), expected);
        Ok(())
    }

    #[test]
    fn test_track_cost_gradients() -> TestResult {
        let (odometry, observations) = measurements();
        let cost = TrackCost::new(&odometry, &observations, TrackWeights::default())?;
        let manifold = LieGroupManifold::<SE2>::new();
        let x = SE2::from_xy_angle(0.5, -1.5, 2.3);
        let u = DVector::from_vec(vec![0.8, 0.3]);
        let p = DVector::from_vec(vec![0.05, -0.02, 3.0, 1.0, -2.0, 4.0]);
        let error = max_stage_gradient_error(&manifold, &cost, 1, 0.0, &x, &u, 0.1, &p);
        assert!(error < 1e-5, "gradient error {}", error);
        Ok(())
    }

    #[test]
    fn test_track_cost_terminal_prior() -> TestResult {
        let (odometry, observations) = measurements();
        let weights = TrackWeights {
            disturbance_prior: 4.0,
            ..TrackWeights::default()
        };
        let cost = TrackCost::new(&odometry, &observations, weights)?;
        let p = DVector::from_vec(vec![0.5, -0.5]);
        let mut expansion = CostExpansion::terminal(3, 2);
        // No observations at the first state, so only the prior remains
        let value = cost.terminal(0, 0.0, &SE2::identity(), &p, Some(&mut expansion));
        assert!((value - 1.0).abs() < 1e-12);
        assert!((expansion.lp[0] - 2.0).abs() < 1e-12);
        assert!((expansion.lpp[(1, 1)] - 4.0).abs() < 1e-12);
        Ok(())
    }
}
