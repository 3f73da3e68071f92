//! Core building blocks shared by every optimizer:
//! - Trajectory containers and their validation
//! - The dynamics-step contract ([`System`])
//! - The stage/terminal cost contract ([`Cost`])
//! - The inequality constraint contract ([`Constraint`])

pub mod constraint;
pub mod cost;
pub mod system;
pub mod trajectory;

pub use constraint::{Constraint, ConstraintJacobians, max_violation};
pub use cost::{Cost, CostExpansion};
pub use system::{Point, StepJacobians, System, rollout};
pub use trajectory::{Trajectory, uniform_times};

use thiserror::Error;
use tracing::error;

/// Core module error types for trajectories and problem definitions
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Trajectory containers disagree in length
    #[error("Trajectory size mismatch: {0}")]
    SizeMismatch(String),

    /// Horizon has no control steps
    #[error("Horizon must contain at least one control step")]
    EmptyHorizon,

    /// Time stamps are not strictly increasing
    #[error("Time stamps must be strictly increasing: ts[{index}] = {previous}, next = {next}")]
    NonIncreasingTime { index: usize, previous: f64, next: f64 },

    /// Dimension mismatch between controls, parameters or weights
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input parameter or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// Trajectory::new(ts, xs, us).map_err(|e| e.log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error from a third-party library
    ///
    /// # Arguments
    /// * `source_error` - The original error (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
