//! SO(3): rotations in 3D.
//!
//! Elements are unit quaternions; tangents are rotation vectors `θ·axis` in ℝ³.

use crate::manifold::{LieGroup, Tangent};
use nalgebra::{DVector, Matrix3, Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SO(3) group element.
#[derive(Debug, Clone, PartialEq)]
pub struct SO3 {
    quaternion: UnitQuaternion<f64>,
}

impl Display for SO3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "SO3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

impl SO3 {
    /// Degrees of freedom
    pub const DOF: usize = 3;

    pub fn new(quaternion: UnitQuaternion<f64>) -> Self {
        SO3 { quaternion }
    }

    /// Rotation from roll, pitch and yaw (radians).
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self::new(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Rotation about `axis_angle.normalize()` by `axis_angle.norm()`.
    pub fn from_scaled_axis(axis_angle: Vector3<f64>) -> Self {
        SO3Tangent::new(axis_angle).exp(None)
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }

    /// Rotate a point: `R·v`.
    pub fn act(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion * vector
    }

    /// Uniformly distributed rotation vector inside the unit ball, mapped through Exp.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let tangent = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        Self::from_scaled_axis(tangent * std::f64::consts::FRAC_PI_2)
    }
}

impl LieGroup for SO3 {
    type TangentVector = SO3Tangent;
    type JacobianMatrix = Matrix3<f64>;

    fn identity() -> Self {
        SO3::new(UnitQuaternion::identity())
    }

    fn jacobian_identity() -> Matrix3<f64> {
        Matrix3::identity()
    }

    /// # Notes
    /// J_R⁻¹_R = -Ad(R) = -R
    fn inverse(&self, jacobian: Option<&mut Matrix3<f64>>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -self.adjoint();
        }
        SO3::new(self.quaternion.inverse())
    }

    /// # Notes
    /// J_QR_Q = Rᵀ (the other operand's inverse adjoint), J_QR_R = I
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Matrix3<f64>>,
        jacobian_other: Option<&mut Matrix3<f64>>,
    ) -> Self {
        if let Some(jac) = jacobian_self {
            *jac = other.rotation_matrix().transpose();
        }
        if let Some(jac) = jacobian_other {
            *jac = Matrix3::identity();
        }
        SO3::new(self.quaternion * other.quaternion)
    }

    /// Quaternion logarithm, `θu = 2·atan2(|v|, w)·v/|v|` with the quaternion
    /// flipped into the `w >= 0` hemisphere so that `θ ∈ [0, π]`.
    fn log(&self, jacobian: Option<&mut Matrix3<f64>>) -> SO3Tangent {
        let q = self.quaternion.quaternion();
        let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
        let v = Vector3::new(q.i, q.j, q.k) * sign;
        let w = q.w * sign;
        let sin_half = v.norm();

        let data = if sin_half > f64::EPSILON.sqrt() {
            v * (2.0 * sin_half.atan2(w) / sin_half)
        } else {
            // atan2(s, w)/s → 1/w for small s
            v * (2.0 / w)
        };

        let tangent = SO3Tangent::new(data);
        if let Some(jac) = jacobian {
            *jac = tangent.right_jacobian_inv();
        }
        tangent
    }

    fn adjoint(&self) -> Matrix3<f64> {
        self.rotation_matrix()
    }

    fn is_finite(&self) -> bool {
        self.quaternion.coords.iter().all(|c| c.is_finite())
    }
}

/// Rotation vector in so(3).
#[derive(Debug, Clone, PartialEq)]
pub struct SO3Tangent {
    data: Vector3<f64>,
}

impl From<DVector<f64>> for SO3Tangent {
    fn from(data: DVector<f64>) -> Self {
        SO3Tangent::new(Vector3::new(data[0], data[1], data[2]))
    }
}

impl From<SO3Tangent> for DVector<f64> {
    fn from(tangent: SO3Tangent) -> Self {
        DVector::from_column_slice(tangent.data.as_slice())
    }
}

impl SO3Tangent {
    pub fn new(data: Vector3<f64>) -> Self {
        SO3Tangent { data }
    }

    pub fn from_components(x: f64, y: f64, z: f64) -> Self {
        Self::new(Vector3::new(x, y, z))
    }

    pub fn coeffs(&self) -> Vector3<f64> {
        self.data
    }

    pub fn angle(&self) -> f64 {
        self.data.norm()
    }

    /// Skew-symmetric matrix `[θ]×`.
    pub fn hat(&self) -> Matrix3<f64> {
        skew(&self.data)
    }
}

/// `[v]×` such that `[v]× w = v × w`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

impl Tangent<SO3> for SO3Tangent {
    const DIM: usize = 3;

    fn exp(&self, jacobian: Option<&mut Matrix3<f64>>) -> SO3 {
        let theta_sq = self.data.norm_squared();
        let quaternion = if theta_sq > f64::EPSILON {
            UnitQuaternion::from_scaled_axis(self.data)
        } else {
            let half = self.data * 0.5;
            UnitQuaternion::from_quaternion(Quaternion::new(1.0, half.x, half.y, half.z))
        };

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }
        SO3::new(quaternion)
    }

    fn right_jacobian(&self) -> Matrix3<f64> {
        self.left_jacobian().transpose()
    }

    /// # Notes
    /// Jl(θ) = I + (1 - cos θ)/θ² [θ]× + (θ - sin θ)/θ³ [θ]×²
    fn left_jacobian(&self) -> Matrix3<f64> {
        let theta_sq = self.data.norm_squared();
        let hat = self.hat();

        if theta_sq <= f64::EPSILON {
            return Matrix3::identity() + 0.5 * hat + hat * hat / 6.0;
        }

        let theta = theta_sq.sqrt();
        Matrix3::identity()
            + (1.0 - theta.cos()) / theta_sq * hat
            + (theta - theta.sin()) / (theta_sq * theta) * hat * hat
    }

    fn right_jacobian_inv(&self) -> Matrix3<f64> {
        self.left_jacobian_inv().transpose()
    }

    /// # Notes
    /// Jl⁻¹(θ) = I - ½[θ]× + (1/θ² - (1 + cos θ)/(2θ sin θ)) [θ]×²
    fn left_jacobian_inv(&self) -> Matrix3<f64> {
        let theta_sq = self.data.norm_squared();
        let hat = self.hat();

        if theta_sq <= f64::EPSILON {
            return Matrix3::identity() - 0.5 * hat + hat * hat / 12.0;
        }

        let theta = theta_sq.sqrt();
        let coeff = 1.0 / theta_sq - (1.0 + theta.cos()) / (2.0 * theta * theta.sin());
        Matrix3::identity() - 0.5 * hat + coeff * hat * hat
    }

    fn zero() -> Self {
        SO3Tangent::new(Vector3::zeros())
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.data.norm() < tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_so3_exp_log() {
        let tangent = SO3Tangent::from_components(0.3, -0.2, 0.9);
        let recovered = tangent.exp(None).log(None);
        assert!((recovered.coeffs() - tangent.coeffs()).norm() < TOLERANCE);
    }

    #[test]
    fn test_so3_log_near_pi() {
        let tangent = SO3Tangent::from_components(0.0, 0.0, std::f64::consts::PI - 1e-6);
        let recovered = tangent.exp(None).log(None);
        assert!((recovered.angle() - tangent.angle()).abs() < 1e-6);
    }

    #[test]
    fn test_so3_small_angle_exp() {
        let tangent = SO3Tangent::from_components(1e-10, 0.0, -1e-10);
        let rotation = tangent.exp(None);
        assert!(rotation.is_approx(&SO3::identity(), 1e-9));
    }

    #[test]
    fn test_so3_compose_inverse() {
        let mut rng = StdRng::seed_from_u64(3);
        let r = SO3::random(&mut rng);
        let composed = r.compose(&r.inverse(None), None, None);
        assert!(composed.is_approx(&SO3::identity(), TOLERANCE));
    }

    #[test]
    fn test_so3_jacobian_inverses() {
        let tangent = SO3Tangent::from_components(0.4, 0.1, -0.7);
        let right = tangent.right_jacobian() * tangent.right_jacobian_inv();
        let left = tangent.left_jacobian() * tangent.left_jacobian_inv();
        assert!((right - Matrix3::identity()).norm() < 1e-10);
        assert!((left - Matrix3::identity()).norm() < 1e-10);
    }

    #[test]
    fn test_so3_right_jacobian_finite_difference() {
        let tangent = SO3Tangent::from_components(0.5, -0.3, 0.2);
        let jr = tangent.right_jacobian();
        let base = tangent.exp(None);
        let eps = 1e-7;

        for j in 0..3 {
            let mut delta = Vector3::zeros();
            delta[j] = eps;
            let perturbed = SO3Tangent::new(tangent.coeffs() + delta).exp(None);
            let column = perturbed.right_minus(&base, None, None).coeffs() / eps;
            assert!((column - jr.column(j)).norm() < 1e-5);
        }
    }

    #[test]
    fn test_so3_act_matches_matrix() {
        let r = SO3::from_euler_angles(0.1, 0.2, 0.3);
        let v = Vector3::new(1.0, -2.0, 0.5);
        assert!((r.act(&v) - r.rotation_matrix() * v).norm() < TOLERANCE);
    }
}
