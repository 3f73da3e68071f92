//! Dense linear solves used by the parameter-augmented engine.
//!
//! Per-step control Hessians are tiny and factorized inline with nalgebra. The
//! horizon-wide parameter system grows with the number of landmarks, so it goes
//! through faer's dense Cholesky instead.

pub mod cholesky;

pub use cholesky::DenseCholeskySolver;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::error;

/// Linear algebra specific error types
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Matrix factorization failed (not positive definite)
    #[error("Matrix factorization failed: {0}")]
    FactorizationFailed(String),

    /// Singular or near-singular matrix detected
    #[error("Singular matrix detected (matrix is not invertible)")]
    SingularMatrix,

    /// Matrix and right-hand side do not agree
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the third-party error that caused it
    ///
    /// # Arguments
    /// * `source_error` - The original error (e.g. faer's `LltError`)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Solver for small-to-medium dense symmetric systems.
pub trait DenseLinearSolver {
    /// Solve `(A + damping·I) x = b` for symmetric `A`.
    ///
    /// # Errors
    /// Returns `LinAlgError` if the damped matrix is not positive definite or the
    /// solution is not finite.
    fn solve_damped(
        &self,
        matrix: &DMatrix<f64>,
        rhs: &DVector<f64>,
        damping: f64,
    ) -> LinAlgResult<DVector<f64>>;

    /// Solve `A x = b`.
    fn solve(&self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> LinAlgResult<DVector<f64>> {
        self.solve_damped(matrix, rhs, 0.0)
    }
}
