use nalgebra::{DVector, Vector3};

use crate::{
    core::{StepJacobians, System},
    manifold::{LieGroup, LieGroupManifold, SO3, SO3Tangent, Tangent},
};

/// Strapdown attitude propagation on SO(3) with a constant gyro bias.
///
/// Control = measured body angular rate `ω`, parameters = gyro bias `b`:
///
/// ```text
/// ξ  = h (ω - b)
/// R' = R · Exp(ξ)
/// A  = Exp(ξ)ᵀ,   B = Jr(ξ) h,   C = -Jr(ξ) h
/// ```
#[derive(Debug, Clone, Default)]
pub struct Attitude3d {
    manifold: LieGroupManifold<SO3>,
}

impl Attitude3d {
    pub fn new() -> Self {
        Self {
            manifold: LieGroupManifold::new(),
        }
    }
}

impl System for Attitude3d {
    type Manifold = LieGroupManifold<SO3>;

    fn manifold(&self) -> &LieGroupManifold<SO3> {
        &self.manifold
    }

    fn control_dim(&self) -> usize {
        3
    }

    fn parameter_dim(&self) -> usize {
        3
    }

    fn step(
        &self,
        _t: f64,
        x: &SO3,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        jacobians: Option<&mut StepJacobians>,
    ) -> SO3 {
        let rate = Vector3::new(u[0] - p[0], u[1] - p[1], u[2] - p[2]);
        let tangent = SO3Tangent::new(rate * h);
        let increment = tangent.exp(None);

        if let Some(jac) = jacobians {
            let a = increment.rotation_matrix().transpose();
            let jr = tangent.right_jacobian() * h;
            for i in 0..3 {
                for j in 0..3 {
                    jac.a[(i, j)] = a[(i, j)];
                    jac.b[(i, j)] = jr[(i, j)];
                    jac.c[(i, j)] = -jr[(i, j)];
                }
            }
        }
        x.compose(&increment, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::test_utils::max_jacobian_error;

    #[test]
    fn test_attitude_bias_cancels_rate() {
        let system = Attitude3d::new();
        let rate = DVector::from_vec(vec![0.1, -0.2, 0.3]);
        let next = system.step(0.0, &SO3::identity(), &rate, 0.5, &rate, None);
        assert!(next.is_approx(&SO3::identity(), 1e-12));
    }

    #[test]
    fn test_attitude_integrates_constant_rate() {
        let system = Attitude3d::new();
        let rate = DVector::from_vec(vec![0.0, 0.0, 0.5]);
        let bias = DVector::zeros(3);
        let mut x = SO3::identity();
        for _ in 0..10 {
            x = system.step(0.0, &x, &rate, 0.1, &bias, None);
        }
        let expected = SO3::from_euler_angles(0.0, 0.0, 0.5);
        assert!(x.is_approx(&expected, 1e-10));
    }

    #[test]
    fn test_attitude_jacobians() {
        let system = Attitude3d::new();
        let x = SO3::from_euler_angles(0.3, -0.2, 1.1);
        let u = DVector::from_vec(vec![0.4, 0.9, -0.3]);
        let p = DVector::from_vec(vec![0.02, -0.01, 0.05]);
        assert!(max_jacobian_error(&system, 0.0, &x, &u, 0.1, &p) < 1e-6);
    }
}
