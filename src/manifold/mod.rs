//! State-space arithmetic for trajectory optimization on curved spaces.
//!
//! The optimizers never add or subtract states directly. They go through the
//! [`Manifold`] contract instead:
//!
//! ```text
//! Difference(x, y) = v   with   Retract(x, v) = y
//! Difference(x, x) = 0
//! ```
//!
//! Two families of state spaces are provided:
//! - [`Euclidean`]: plain vectors, `Difference(x, y) = y - x`
//! - [`LieGroupManifold`]: any [`LieGroup`] with the right-perturbation model,
//!   `Difference(x, y) = Log(x⁻¹ ∘ y)` and `Retract(x, v) = x ∘ Exp(v)`
//!
//! Lie group     | dim | X ∈ M              | Exp(τ)           | Comp.  | Action
//! ------------- | --- | ------------------ | ---------------- | ------ | ------
//! Rotation SO(3)| 3   | R (unit quaternion)| R = exp([θ]×)    | R₁R₂   | Rx
//! Rigid SE(2)   | 3   | M = [R t; 0 1]     | Exp([v̂])         | M₁M₂   | Rx+t
//!
//! The Lie group conventions (tangent ordering, Jacobian definitions) follow the
//! [manif](https://github.com/artivis/manif) C++ library.

use nalgebra::{DMatrix, DVector, SMatrix};
use std::{
    error, fmt,
    fmt::{Display, Formatter},
    marker::PhantomData,
};

pub mod se2;
pub mod so3;

pub use se2::{SE2, SE2Tangent};
pub use so3::{SO3, SO3Tangent};

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifoldError {
    /// A tangent or point vector has the wrong length
    DimensionMismatch { expected: usize, actual: usize },
    /// NaN or Inf detected in a manifold element
    InvalidNumber,
}

impl Display for ManifoldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ManifoldError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {expected}, got {actual}")
            }
            ManifoldError::InvalidNumber => write!(f, "Invalid number: NaN or Inf detected"),
        }
    }
}

impl error::Error for ManifoldError {}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// State-space contract consumed by the optimizers.
///
/// All tangent vectors are runtime-sized so the engine can stay dimension-agnostic.
pub trait Manifold: Send + Sync {
    /// Point type stored in trajectories
    type Point: Clone + fmt::Debug + Send + Sync;

    /// Tangent space dimension.
    fn dim(&self) -> usize;

    /// Tangent vector `v` taking `reference` to `target`, i.e. `Retract(reference, v) = target`.
    fn difference(&self, reference: &Self::Point, target: &Self::Point) -> DVector<f64>;

    /// Move `reference` along `tangent`.
    fn retract(&self, reference: &Self::Point, tangent: &DVector<f64>) -> Self::Point;

    /// Derivative of `difference(reference, target)` with respect to a tangent
    /// perturbation of `target`.
    ///
    /// Identity on flat spaces. Costs use it to keep their gradients exact when the
    /// state lives on a group.
    fn difference_jacobian(&self, _reference: &Self::Point, _target: &Self::Point) -> DMatrix<f64> {
        DMatrix::identity(self.dim(), self.dim())
    }

    /// Whether every coordinate of the point is finite.
    fn is_finite(&self, point: &Self::Point) -> bool;
}

/// Flat vector space ℝⁿ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Euclidean {
    dim: usize,
}

impl Euclidean {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Check that `point` belongs to this space.
    pub fn validate(&self, point: &DVector<f64>) -> ManifoldResult<()> {
        if point.len() != self.dim {
            return Err(ManifoldError::DimensionMismatch {
                expected: self.dim,
                actual: point.len(),
            });
        }
        if point.iter().any(|v| !v.is_finite()) {
            return Err(ManifoldError::InvalidNumber);
        }
        Ok(())
    }
}

impl Manifold for Euclidean {
    type Point = DVector<f64>;

    fn dim(&self) -> usize {
        self.dim
    }

    fn difference(&self, reference: &DVector<f64>, target: &DVector<f64>) -> DVector<f64> {
        target - reference
    }

    fn retract(&self, reference: &DVector<f64>, tangent: &DVector<f64>) -> DVector<f64> {
        reference + tangent
    }

    fn is_finite(&self, point: &DVector<f64>) -> bool {
        point.iter().all(|v| v.is_finite())
    }
}

/// Converts a fixed-size Jacobian into the engine's dynamic representation.
pub trait DenseJacobian {
    fn to_dmatrix(&self) -> DMatrix<f64>;
}

impl<const D: usize> DenseJacobian for SMatrix<f64, D, D> {
    fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(D, D, self.as_slice())
    }
}

/// Core trait for Lie group operations.
///
/// Every operation that can report a Jacobian takes optional out-parameters so the
/// caller only pays for the derivatives it asks for. Jacobians are defined with
/// respect to right (local) perturbations: `∂f/∂X = lim (f(X ∘ Exp(τ)) ⊖ f(X)) / τ`.
pub trait LieGroup: Clone + PartialEq + fmt::Debug + Send + Sync {
    /// The tangent space vector type
    type TangentVector: Tangent<Self> + From<DVector<f64>> + Into<DVector<f64>>;

    /// The Jacobian matrix type
    type JacobianMatrix: Clone
        + PartialEq
        + fmt::Debug
        + DenseJacobian
        + std::ops::Neg<Output = Self::JacobianMatrix>
        + std::ops::Mul<Output = Self::JacobianMatrix>;

    /// Neutral element.
    fn identity() -> Self;

    /// Identity matrix in the Jacobian's dimension.
    fn jacobian_identity() -> Self::JacobianMatrix;

    /// Compute the inverse of this element.
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂(g⁻¹)/∂g
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self;

    /// Compose this element with another (group multiplication).
    ///
    /// # Arguments
    /// * `other` - The right operand
    /// * `jacobian_self` - Optional Jacobian ∂(g₁ ∘ g₂)/∂g₁
    /// * `jacobian_other` - Optional Jacobian ∂(g₁ ∘ g₂)/∂g₂
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self;

    /// Logarithmic map to the tangent space.
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂Log(g)/∂g
    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector;

    /// Adjoint matrix Ad(g), mapping local tangents to global ones.
    fn adjoint(&self) -> Self::JacobianMatrix;

    /// Whether all stored coefficients are finite.
    fn is_finite(&self) -> bool;

    /// Approximate equality through the tangent space.
    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        other.right_minus(self, None, None).is_zero(tolerance)
    }

    /// Right plus: g ⊞ τ = g ∘ Exp(τ).
    ///
    /// # Arguments
    /// * `tangent` - Tangent vector perturbation
    /// * `jacobian_self` - Optional Jacobian ∂(g ⊞ τ)/∂g = Ad(Exp(τ))⁻¹
    /// * `jacobian_tangent` - Optional Jacobian ∂(g ⊞ τ)/∂τ = Jr(τ)
    fn right_plus(
        &self,
        tangent: &Self::TangentVector,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_tangent: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac) = jacobian_tangent {
            *jac = tangent.right_jacobian();
        }
        self.compose(&tangent.exp(None), jacobian_self, None)
    }

    /// Right minus: g₁ ⊟ g₂ = Log(g₂⁻¹ ∘ g₁).
    ///
    /// # Arguments
    /// * `other` - The reference element g₂
    /// * `jacobian_self` - Optional Jacobian ∂(g₁ ⊟ g₂)/∂g₁ = Jr⁻¹(τ)
    /// * `jacobian_other` - Optional Jacobian ∂(g₁ ⊟ g₂)/∂g₂ = -Jl⁻¹(τ)
    fn right_minus(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::TangentVector {
        let result = other.inverse(None).compose(self, None, None).log(None);

        if let Some(jac) = jacobian_self {
            *jac = result.right_jacobian_inv();
        }
        if let Some(jac) = jacobian_other {
            *jac = -result.left_jacobian_inv();
        }

        result
    }

    /// Relative transformation g₁⁻¹ ∘ g₂.
    fn between(&self, other: &Self) -> Self {
        self.inverse(None).compose(other, None, None)
    }
}

/// Operations on Lie algebra vectors.
pub trait Tangent<Group: LieGroup>: Clone + PartialEq + fmt::Debug {
    /// Dimension of the tangent space
    const DIM: usize;

    /// Exponential map.
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂Exp(τ)/∂τ = Jr(τ)
    fn exp(&self, jacobian: Option<&mut Group::JacobianMatrix>) -> Group;

    /// Right Jacobian: Exp(τ + δτ) ≈ Exp(τ) ∘ Exp(Jr δτ).
    fn right_jacobian(&self) -> Group::JacobianMatrix;

    /// Left Jacobian: Exp(τ + δτ) ≈ Exp(Jl δτ) ∘ Exp(τ).
    fn left_jacobian(&self) -> Group::JacobianMatrix;

    /// Inverse of the right Jacobian.
    fn right_jacobian_inv(&self) -> Group::JacobianMatrix;

    /// Inverse of the left Jacobian.
    fn left_jacobian_inv(&self) -> Group::JacobianMatrix;

    /// Zero tangent vector.
    fn zero() -> Self;

    /// Check if the tangent vector is approximately zero.
    fn is_zero(&self, tolerance: f64) -> bool;
}

/// State manifold backed by a Lie group with right-plus / right-minus.
pub struct LieGroupManifold<G: LieGroup> {
    _group: PhantomData<fn() -> G>,
}

impl<G: LieGroup> LieGroupManifold<G> {
    pub fn new() -> Self {
        Self {
            _group: PhantomData,
        }
    }
}

impl<G: LieGroup> Default for LieGroupManifold<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: LieGroup> Clone for LieGroupManifold<G> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<G: LieGroup> fmt::Debug for LieGroupManifold<G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "LieGroupManifold(dim = {})", G::TangentVector::DIM)
    }
}

impl<G: LieGroup> Manifold for LieGroupManifold<G> {
    type Point = G;

    fn dim(&self) -> usize {
        G::TangentVector::DIM
    }

    fn difference(&self, reference: &G, target: &G) -> DVector<f64> {
        target.right_minus(reference, None, None).into()
    }

    fn retract(&self, reference: &G, tangent: &DVector<f64>) -> G {
        reference.right_plus(&G::TangentVector::from(tangent.clone()), None, None)
    }

    fn difference_jacobian(&self, reference: &G, target: &G) -> DMatrix<f64> {
        let mut jac = G::jacobian_identity();
        target.right_minus(reference, Some(&mut jac), None);
        jac.to_dmatrix()
    }

    fn is_finite(&self, point: &G) -> bool {
        point.is_finite()
    }
}
