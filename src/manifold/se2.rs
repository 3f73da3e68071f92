//! SE(2): planar rigid motions.
//!
//! Elements are a unit complex rotation plus a translation. Tangents are ordered
//! `[x, y, theta]` (translational part first), following manif.

use crate::manifold::{LieGroup, Tangent};
use nalgebra::{DVector, Matrix2, Matrix3, UnitComplex, Vector2};
use rand::Rng;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SE(2) group element.
#[derive(Debug, Clone, PartialEq)]
pub struct SE2 {
    translation: Vector2<f64>,
    rotation: UnitComplex<f64>,
}

impl Display for SE2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SE2(translation: [{:.4}, {:.4}], rotation: {:.4})",
            self.translation.x,
            self.translation.y,
            self.angle()
        )
    }
}

/// `(sin θ / θ, (1 - cos θ) / θ)`, with Taylor expansions near zero.
fn sinc_coefficients(theta: f64) -> (f64, f64) {
    let theta_sq = theta * theta;
    if theta_sq < f64::EPSILON {
        (1.0 - theta_sq / 6.0, 0.5 * theta - theta * theta_sq / 24.0)
    } else {
        (theta.sin() / theta, (1.0 - theta.cos()) / theta)
    }
}

impl SE2 {
    /// Degrees of freedom
    pub const DOF: usize = 3;

    pub fn new(translation: Vector2<f64>, rotation: UnitComplex<f64>) -> Self {
        SE2 {
            translation,
            rotation,
        }
    }

    /// Pose from position and heading.
    pub fn from_xy_angle(x: f64, y: f64, theta: f64) -> Self {
        Self::new(Vector2::new(x, y), UnitComplex::new(theta))
    }

    pub fn translation(&self) -> Vector2<f64> {
        self.translation
    }

    pub fn rotation(&self) -> UnitComplex<f64> {
        self.rotation
    }

    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    /// Heading in `(-π, π]`.
    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    /// Map a body-frame point into the world: `R·p + t`.
    pub fn transform_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.rotation.transform_vector(point) + self.translation
    }

    /// Map a world point into the body frame: `Rᵀ·(p - t)`.
    pub fn inverse_transform_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.rotation
            .inverse_transform_vector(&(point - self.translation))
    }

    /// Pose with translation in `[-scale, scale]²` and any heading.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let scale = 5.0;
        Self::from_xy_angle(
            rng.random_range(-scale..scale),
            rng.random_range(-scale..scale),
            rng.random_range(-std::f64::consts::PI..std::f64::consts::PI),
        )
    }
}

impl LieGroup for SE2 {
    type TangentVector = SE2Tangent;
    type JacobianMatrix = Matrix3<f64>;

    fn identity() -> Self {
        Self::new(Vector2::zeros(), UnitComplex::identity())
    }

    fn jacobian_identity() -> Matrix3<f64> {
        Matrix3::identity()
    }

    /// # Notes
    /// g⁻¹ = [Rᵀ, -Rᵀt; 0, 1], J = -Ad(g)
    fn inverse(&self, jacobian: Option<&mut Matrix3<f64>>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -self.adjoint();
        }
        let rotation = self.rotation.inverse();
        Self::new(-rotation.transform_vector(&self.translation), rotation)
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Matrix3<f64>>,
        jacobian_other: Option<&mut Matrix3<f64>>,
    ) -> Self {
        if let Some(jac) = jacobian_self {
            *jac = other.inverse(None).adjoint();
        }
        if let Some(jac) = jacobian_other {
            *jac = Matrix3::identity();
        }
        Self::new(
            self.rotation.transform_vector(&other.translation) + self.translation,
            self.rotation * other.rotation,
        )
    }

    /// # Notes
    /// ρ = V(θ)⁻¹ t with V = [a -b; b a]
    fn log(&self, jacobian: Option<&mut Matrix3<f64>>) -> SE2Tangent {
        let theta = self.angle();
        let (a, b) = sinc_coefficients(theta);
        let den = 1.0 / (a * a + b * b);

        let tangent = SE2Tangent::new(
            den * (a * self.x() + b * self.y()),
            den * (-b * self.x() + a * self.y()),
            theta,
        );

        if let Some(jac) = jacobian {
            *jac = tangent.right_jacobian_inv();
        }
        tangent
    }

    fn adjoint(&self) -> Matrix3<f64> {
        let mut adjoint = Matrix3::identity();
        adjoint
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&self.rotation_matrix());
        adjoint[(0, 2)] = self.y();
        adjoint[(1, 2)] = -self.x();
        adjoint
    }

    fn is_finite(&self) -> bool {
        self.translation.iter().all(|v| v.is_finite()) && self.rotation.angle().is_finite()
    }
}

/// SE(2) tangent `[x, y, theta]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SE2Tangent {
    data: nalgebra::Vector3<f64>,
}

impl From<DVector<f64>> for SE2Tangent {
    fn from(data: DVector<f64>) -> Self {
        SE2Tangent::new(data[0], data[1], data[2])
    }
}

impl From<SE2Tangent> for DVector<f64> {
    fn from(tangent: SE2Tangent) -> Self {
        DVector::from_column_slice(tangent.data.as_slice())
    }
}

impl SE2Tangent {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        SE2Tangent {
            data: nalgebra::Vector3::new(x, y, theta),
        }
    }

    pub fn x(&self) -> f64 {
        self.data.x
    }

    pub fn y(&self) -> f64 {
        self.data.y
    }

    pub fn angle(&self) -> f64 {
        self.data.z
    }

    pub fn coeffs(&self) -> nalgebra::Vector3<f64> {
        self.data
    }

    /// Off-diagonal translational column shared by the left/right Jacobians.
    fn jacobian_column(&self, sign: f64) -> Vector2<f64> {
        let (x, y, theta) = (self.x(), self.y(), self.angle());
        let theta_sq = theta * theta;
        if theta_sq < f64::EPSILON {
            return Vector2::new(-sign * y / 2.0 + theta * x / 6.0, sign * x / 2.0 + theta * y / 6.0);
        }
        let (sin_theta, cos_theta) = theta.sin_cos();
        Vector2::new(
            (-sign * y + theta * x + sign * y * cos_theta - x * sin_theta) / theta_sq,
            (sign * x + theta * y - sign * x * cos_theta - y * sin_theta) / theta_sq,
        )
    }

    /// Builds `[A c; 0 1]` with `A = [a sb; -sb a]`.
    fn block_jacobian(&self, sign: f64) -> Matrix3<f64> {
        let (a, b) = sinc_coefficients(self.angle());
        let column = self.jacobian_column(sign);
        Matrix3::new(
            a,
            sign * b,
            column.x,
            -sign * b,
            a,
            column.y,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Inverse of a `[A c; 0 1]` block Jacobian: `[A⁻¹ -A⁻¹c; 0 1]`.
    fn invert_block(jacobian: &Matrix3<f64>) -> Matrix3<f64> {
        let a = jacobian[(0, 0)];
        let b = jacobian[(0, 1)];
        let den = 1.0 / (a * a + b * b);
        let a_inv = Matrix2::new(a, -b, b, a) * den;
        let c = Vector2::new(jacobian[(0, 2)], jacobian[(1, 2)]);
        let c_inv = -(a_inv * c);

        let mut inverse = Matrix3::identity();
        inverse.fixed_view_mut::<2, 2>(0, 0).copy_from(&a_inv);
        inverse[(0, 2)] = c_inv.x;
        inverse[(1, 2)] = c_inv.y;
        inverse
    }
}

impl Tangent<SE2> for SE2Tangent {
    const DIM: usize = 3;

    /// # Notes
    /// t = V(θ) ρ with V = [a -b; b a], a = sin θ / θ, b = (1 - cos θ) / θ
    fn exp(&self, jacobian: Option<&mut Matrix3<f64>>) -> SE2 {
        let (a, b) = sinc_coefficients(self.angle());
        let translation = Vector2::new(
            a * self.x() - b * self.y(),
            b * self.x() + a * self.y(),
        );

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }
        SE2::new(translation, UnitComplex::new(self.angle()))
    }

    fn right_jacobian(&self) -> Matrix3<f64> {
        self.block_jacobian(1.0)
    }

    fn left_jacobian(&self) -> Matrix3<f64> {
        self.block_jacobian(-1.0)
    }

    fn right_jacobian_inv(&self) -> Matrix3<f64> {
        Self::invert_block(&self.right_jacobian())
    }

    fn left_jacobian_inv(&self) -> Matrix3<f64> {
        Self::invert_block(&self.left_jacobian())
    }

    fn zero() -> Self {
        SE2Tangent::new(0.0, 0.0, 0.0)
    }

    fn is_zero(&self, tolerance: f64) -> bool {
        self.data.norm() < tolerance
    }
}
