use nalgebra::{DMatrix, DVector};

use crate::manifold::Manifold;

/// Jacobians of a constraint vector `g` in tangent coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintJacobians {
    /// ∂g/∂x (constraint dim × state dim)
    pub gx: DMatrix<f64>,
    /// ∂g/∂u (constraint dim × control dim, zero columns at the terminal step)
    pub gu: DMatrix<f64>,
    /// ∂g/∂p (constraint dim × parameter dim)
    pub gp: DMatrix<f64>,
}

impl ConstraintJacobians {
    pub fn zeros(dim: usize, state_dim: usize, control_dim: usize, parameter_dim: usize) -> Self {
        Self {
            gx: DMatrix::zeros(dim, state_dim),
            gu: DMatrix::zeros(dim, control_dim),
            gp: DMatrix::zeros(dim, parameter_dim),
        }
    }
}

/// Inequality constraint `g(t, x, u, p) <= 0`, evaluated one time step at a time.
///
/// At the terminal step `u` is `None`. Constraints that only restrict controls
/// return a non-violated value there.
pub trait Constraint<M: Manifold>: Send + Sync {
    /// Number of scalar constraints.
    fn dim(&self) -> usize;

    fn evaluate(
        &self,
        t: f64,
        x: &M::Point,
        u: Option<&DVector<f64>>,
        p: &DVector<f64>,
        jacobians: Option<&mut ConstraintJacobians>,
    ) -> DVector<f64>;
}

/// Largest positive entry of `g`, zero when every constraint holds.
pub fn max_violation(g: &DVector<f64>) -> f64 {
    g.iter().fold(0.0_f64, |acc, &v| acc.max(v))
}
