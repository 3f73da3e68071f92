use nalgebra::{DVector, Vector3};

use crate::{
    core::{StepJacobians, System},
    manifold::{LieGroup, LieGroupManifold, SE2, SE2Tangent, Tangent},
};

/// Kinematic car (unicycle) with pose on SE(2).
///
/// Control `u = (v, ω)`: forward speed and yaw rate. With the disturbance
/// enabled, the first two entries of `p` are a constant body-frame velocity
/// `(d_x, d_y)` added to the commanded motion:
///
/// ```text
/// ξ  = h · (v + d_x, d_y, ω)
/// x' = x ∘ Exp(ξ)
/// A  = Ad(Exp(ξ))⁻¹,   B = Jr(ξ) h [e₀ e₂],   C = Jr(ξ) h [e₀ e₁]
/// ```
#[derive(Debug, Clone)]
pub struct KinematicCar {
    manifold: LieGroupManifold<SE2>,
    disturbance: bool,
}

impl Default for KinematicCar {
    fn default() -> Self {
        Self::new()
    }
}

impl KinematicCar {
    /// Car without disturbance parameters.
    pub fn new() -> Self {
        Self {
            manifold: LieGroupManifold::new(),
            disturbance: false,
        }
    }

    /// Car reading a body-frame velocity disturbance from `p[0..2]`.
    pub fn with_disturbance() -> Self {
        Self {
            manifold: LieGroupManifold::new(),
            disturbance: true,
        }
    }

    pub fn has_disturbance(&self) -> bool {
        self.disturbance
    }

    fn body_twist(&self, u: &DVector<f64>, h: f64, p: &DVector<f64>) -> Vector3<f64> {
        let (dx, dy) = if self.disturbance {
            (p[0], p[1])
        } else {
            (0.0, 0.0)
        };
        Vector3::new(u[0] + dx, dy, u[1]) * h
    }
}

impl System for KinematicCar {
    type Manifold = LieGroupManifold<SE2>;

    fn manifold(&self) -> &LieGroupManifold<SE2> {
        &self.manifold
    }

    fn control_dim(&self) -> usize {
        2
    }

    fn parameter_dim(&self) -> usize {
        if self.disturbance { 2 } else { 0 }
    }

    fn step(
        &self,
        _t: f64,
        x: &SE2,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        jacobians: Option<&mut StepJacobians>,
    ) -> SE2 {
        let twist = self.body_twist(u, h, p);
        let tangent = SE2Tangent::new(twist.x, twist.y, twist.z);
        let increment = tangent.exp(None);

        if let Some(jac) = jacobians {
            let a = increment.inverse(None).adjoint();
            let jr = tangent.right_jacobian();
            for i in 0..3 {
                for j in 0..3 {
                    jac.a[(i, j)] = a[(i, j)];
                }
                jac.b[(i, 0)] = jr[(i, 0)] * h;
                jac.b[(i, 1)] = jr[(i, 2)] * h;
                if self.disturbance {
                    jac.c[(i, 0)] = jr[(i, 0)] * h;
                    jac.c[(i, 1)] = jr[(i, 1)] * h;
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
    fn test_car_drives_straight_along_heading() {
        let car = KinematicCar::new();
        let x = SE2::from_xy_angle(1.0, 1.0, std::f64::consts::FRAC_PI_2);
        let u = DVector::from_vec(vec![2.0, 0.0]);
        let next = car.step(0.0, &x, &u, 0.5, &DVector::zeros(0), None);
        assert!((next.x() - 1.0).abs() < 1e-12);
        assert!((next.y() - 2.0).abs() < 1e-12);
        assert!((next.angle() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_car_lateral_disturbance_moves_sideways() {
        let car = KinematicCar::with_disturbance();
        let p = DVector::from_vec(vec![0.0, 0.4]);
        let u = DVector::zeros(2);
        let next = car.step(0.0, &SE2::identity(), &u, 0.5, &p, None);
        assert!(next.x().abs() < 1e-12);
        assert!((next.y() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_car_jacobians() {
        let car = KinematicCar::new();
        let x = SE2::from_xy_angle(0.5, -1.0, 0.7);
        let u = DVector::from_vec(vec![1.3, 0.4]);
        assert!(max_jacobian_error(&car, 0.0, &x, &u, 0.2, &DVector::zeros(0)) < 1e-6);
    }

    #[test]
    fn test_car_disturbance_jacobians() {
        let car = KinematicCar::with_disturbance();
        let x = SE2::from_xy_angle(-2.0, 0.3, -1.2);
        let u = DVector::from_vec(vec![0.8, -0.6]);
        // Extra trailing entries of p stand for landmarks the car never reads
        let p = DVector::from_vec(vec![0.1, -0.05, 3.0, 4.0]);
        assert!(max_jacobian_error(&car, 0.0, &x, &u, 0.25, &p) < 1e-6);
    }
}
