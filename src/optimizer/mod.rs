//! Trajectory optimizers built on one DDP core.
//!
//! - [`Ddp`]: unconstrained manifold DDP with regularization and line search
//! - [`PDdp`]: DDP that also estimates a static parameter vector shared by the horizon
//! - [`GDocp`]: exterior-penalty outer loop around [`Ddp`] for inequality constraints

use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::{debug, error};

use crate::core::CoreError;

pub mod ddp;
pub mod gdocp;
pub mod pddp;
pub mod regularization;

pub use ddp::{Ddp, DdpConfig, trajectory_cost};
pub use gdocp::{GDocp, GDocpConfig, GDocpSummary, OuterIteration, trajectory_violation};
pub use pddp::PDdp;
pub use regularization::Regularization;

// Re-export observer types from the observers module
pub use crate::observers::{ObserverVec, TrajectoryObserver, TrajectorySnapshot};

/// Optimizer-specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Invalid optimization parameters provided
    #[error("Invalid optimization parameters: {0}")]
    InvalidParameters(String),

    /// The initial trajectory already evaluates to NaN or Inf
    #[error("Initial trajectory cost is not finite: {0}")]
    NonFiniteCost(f64),

    /// Initial state contains NaN or Inf
    #[error("Initial state is not finite")]
    NonFiniteState,

    /// Trajectory validation failed
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// config.validate().map_err(|e| e.log())?;
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

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// Predicted decrease fell below tolerance
    Converged,
    /// Iteration budget exhausted first
    MaxIterationsReached,
    /// Regularization exceeded its bound, or the outer penalty loop ran out
    Diverged,
}

impl Display for SolverStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SolverStatus::Converged => write!(f, "Converged"),
            SolverStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            SolverStatus::Diverged => write!(f, "Diverged"),
        }
    }
}

/// What a single `iterate()` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Forward pass accepted, trajectory (and parameters) committed
    Accepted,
    /// Forward pass accepted, but the parameter system was singular so only the
    /// trajectory moved
    ParametersFrozen,
    /// Line search exhausted; trajectory unchanged, regularization increased
    Rejected,
    /// Rollout produced NaN/Inf; trajectory unchanged, regularization increased
    NonFinite,
    /// Predicted decrease below tolerance; nothing to do
    Converged,
    /// Regularization exceeded its bound
    Diverged,
}

impl IterationOutcome {
    /// Whether the nominal trajectory was replaced.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            IterationOutcome::Accepted | IterationOutcome::ParametersFrozen
        )
    }
}

impl Display for IterationOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IterationOutcome::Accepted => write!(f, "accepted"),
            IterationOutcome::ParametersFrozen => write!(f, "accepted (parameters frozen)"),
            IterationOutcome::Rejected => write!(f, "rejected"),
            IterationOutcome::NonFinite => write!(f, "non-finite rollout"),
            IterationOutcome::Converged => write!(f, "converged"),
            IterationOutcome::Diverged => write!(f, "diverged"),
        }
    }
}

/// Result of one `iterate()` call.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// 1-based count of `iterate()` calls on this solver
    pub iteration: usize,
    pub outcome: IterationOutcome,
    /// Trajectory cost before the iteration
    pub cost_before: f64,
    /// Trajectory cost after the iteration (equal to `cost_before` unless accepted)
    pub cost_after: f64,
    /// Decrease predicted by the backward pass for the final step factor
    pub predicted_decrease: f64,
    /// `cost_before - cost_after`
    pub actual_decrease: f64,
    /// Last step factor α tried by the line search
    pub step_size: f64,
    /// Regularization after the schedule update
    pub mu: f64,
    /// Number of rollouts performed by the line search
    pub line_search_steps: usize,
    /// Parameter system was singular and `p` was held fixed
    pub parameters_frozen: bool,
    /// Norm of the applied parameter change
    pub parameter_step_norm: f64,
    /// Wall-clock time of the iteration in milliseconds
    pub iter_time_ms: f64,
}

impl IterationReport {
    /// Print table header in Ceres-style format
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>13}  {:>9}  {:>11}  {:>7}  {:>11}  {:>8}",
            "iter",
            "cost",
            "cost_change",
            "predicted",
            "alpha",
            "mu",
            "ls_iter",
            "iter_time",
            "status"
        );
    }

    /// Print single iteration line in Ceres-style format with scientific notation
    pub fn print_line(&self) {
        let status = match self.outcome {
            IterationOutcome::Accepted => "✓",
            IterationOutcome::ParametersFrozen => "✓ (p)",
            IterationOutcome::Converged => "-",
            _ => "✗",
        };

        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>13.2e}  {:>9.2e}  {:>11.2e}  {:>7}  {:>9.2}ms  {:>8}",
            self.iteration,
            self.cost_after,
            self.actual_decrease,
            self.predicted_decrease,
            self.step_size,
            self.mu,
            self.line_search_steps,
            self.iter_time_ms,
            status
        );
    }
}

/// Summary statistics of a `solve()` call.
#[derive(Debug, Clone)]
pub struct DdpSummary {
    pub status: SolverStatus,
    pub initial_cost: f64,
    pub final_cost: f64,
    /// Iterations that ran a forward pass or gave up on one; the final
    /// convergence check is not counted
    pub iterations: usize,
    /// Accepted forward passes
    pub successful_steps: usize,
    /// Rejected, non-finite and diverged iterations
    pub unsuccessful_steps: usize,
    /// Accepted iterations in which the parameter vector was held fixed
    pub frozen_parameter_steps: usize,
    pub final_mu: f64,
    pub total_time: web_time::Duration,
    pub average_time_per_iteration: web_time::Duration,
    pub iteration_history: Vec<IterationReport>,
}

impl DdpSummary {
    pub fn converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }
}

impl Display for DdpSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "DDP Final Result")?;

        if self.status == SolverStatus::Diverged {
            writeln!(f, "DIVERGED ({:?})", self.status)?;
        } else {
            writeln!(f, "CONVERGED ({:?})", self.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Cost:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_cost)?;
        writeln!(f, "  Final:     {:.6e}", self.final_cost)?;
        writeln!(
            f,
            "  Reduction: {:.6e} ({:.2}%)",
            self.initial_cost - self.final_cost,
            100.0 * (self.initial_cost - self.final_cost) / self.initial_cost.abs().max(1e-12)
        )?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:              {}", self.iterations)?;
        writeln!(
            f,
            "  Successful steps:   {} ({:.1}%)",
            self.successful_steps,
            100.0 * self.successful_steps as f64 / self.iterations.max(1) as f64
        )?;
        writeln!(
            f,
            "  Unsuccessful steps: {} ({:.1}%)",
            self.unsuccessful_steps,
            100.0 * self.unsuccessful_steps as f64 / self.iterations.max(1) as f64
        )?;
        if self.frozen_parameter_steps > 0 {
            writeln!(f, "  Frozen parameters:  {}", self.frozen_parameter_steps)?;
        }
        writeln!(f, "  Final mu:           {:.2e}", self.final_mu)?;
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:             {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        writeln!(
            f,
            "  Average per iteration:  {:.2}ms",
            self.average_time_per_iteration.as_secs_f64() * 1000.0
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_acceptance() {
        assert!(IterationOutcome::Accepted.is_accepted());
        assert!(IterationOutcome::ParametersFrozen.is_accepted());
        assert!(!IterationOutcome::Rejected.is_accepted());
        assert!(!IterationOutcome::NonFinite.is_accepted());
        assert!(!IterationOutcome::Converged.is_accepted());
    }

    #[test]
    fn test_summary_display_reports_status() {
        let summary = DdpSummary {
            status: SolverStatus::Converged,
            initial_cost: 10.0,
            final_cost: 1.0,
            iterations: 2,
            successful_steps: 2,
            unsuccessful_steps: 0,
            frozen_parameter_steps: 0,
            final_mu: 0.0,
            total_time: web_time::Duration::from_millis(3),
            average_time_per_iteration: web_time::Duration::from_micros(1500),
            iteration_history: Vec::new(),
        };
        let text = summary.to_string();
        assert!(text.contains("CONVERGED (Converged)"));
        assert!(text.contains("90.00%"));
    }
}
