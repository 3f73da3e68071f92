//! Error types for the manifold-ddp library
//!
//! All errors use the `thiserror` crate for automatic trait implementations.
//!
//! # Error Hierarchy
//!
//! - **`ManifoldDdpError`** is the top-level error exposed to users
//! - **Module errors** (`CoreError`, `OptimizerError`, `TrackError`, ...) are wrapped
//!   inside it
//! - **Error sources** are preserved, so the full chain can be inspected
//!
//! Example error chain:
//! ```text
//! ManifoldDdpError::Track(
//!     TrackError::Optimizer(
//!         OptimizerError::InvalidParameters("max_iterations must be at least 1")
//!     )
//! )
//! ```

use crate::{
    core::CoreError, linalg::LinAlgError, manifold::ManifoldError, optimizer::OptimizerError,
    track::TrackError,
};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the manifold-ddp library
pub type ManifoldDdpResult<T> = Result<T, ManifoldDdpError>;

/// Main error type for the manifold-ddp library
///
/// Wraps the module-specific errors while preserving the full error chain.
///
/// ```rust,ignore
/// if let Err(e) = harness.run(100) {
///     warn!("Error: {}", e);
///     warn!("Full chain: {}", ManifoldDdpError::from(e).chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum ManifoldDdpError {
    /// Trajectory and problem definition errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Optimizer configuration and initialization errors
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Linear algebra errors
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// Manifold operation errors
    #[error(transparent)]
    Manifold(#[from] ManifoldError),

    /// Track harness errors
    #[error(transparent)]
    Track(#[from] TrackError),
}

impl ManifoldDdpError {
    /// Full error chain, one error per line.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// warn!("Error chain: {}", e.chain());
    /// // Output: "Solver setup failed
    /// //            → Invalid optimization parameters: max_iterations must be at least 1"
    /// ```
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Single-line variant of [`chain`](Self::chain) with arrow separators.
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}
