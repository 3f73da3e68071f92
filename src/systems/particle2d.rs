use nalgebra::{DVector, Vector2};

use crate::{
    core::{StepJacobians, System},
    manifold::Euclidean,
};

/// Planar point mass (double integrator).
///
/// State `(px, py, vx, vy)`, control = acceleration, exact zero-order hold:
///
/// ```text
/// p' = p + h v + h²/2 u
/// v' = v + h u
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Particle2d {
    manifold: Euclidean,
}

impl Default for Particle2d {
    fn default() -> Self {
        Self::new()
    }
}

impl Particle2d {
    pub const STATE_DIM: usize = 4;

    pub fn new() -> Self {
        Self {
            manifold: Euclidean::new(Self::STATE_DIM),
        }
    }

    /// Position block of a state.
    pub fn position(x: &DVector<f64>) -> Vector2<f64> {
        Vector2::new(x[0], x[1])
    }

    /// Velocity block of a state.
    pub fn velocity(x: &DVector<f64>) -> Vector2<f64> {
        Vector2::new(x[2], x[3])
    }
}

impl System for Particle2d {
    type Manifold = Euclidean;

    fn manifold(&self) -> &Euclidean {
        &self.manifold
    }

    fn control_dim(&self) -> usize {
        2
    }

    fn step(
        &self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        h: f64,
        _p: &DVector<f64>,
        jacobians: Option<&mut StepJacobians>,
    ) -> DVector<f64> {
        let half_h_sq = 0.5 * h * h;
        if let Some(jac) = jacobians {
            jac.a.fill_with_identity();
            jac.a[(0, 2)] = h;
            jac.a[(1, 3)] = h;
            jac.b.fill(0.0);
            jac.b[(0, 0)] = half_h_sq;
            jac.b[(1, 1)] = half_h_sq;
            jac.b[(2, 0)] = h;
            jac.b[(3, 1)] = h;
        }
        DVector::from_vec(vec![
            x[0] + h * x[2] + half_h_sq * u[0],
            x[1] + h * x[3] + half_h_sq * u[1],
            x[2] + h * u[0],
            x[3] + h * u[1],
        ])
    }
}
