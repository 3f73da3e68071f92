//! Inequality constraints `g(t, x, u, p) <= 0`.
//!
//! - [`DiskConstraint`]: keep a planar position block outside a circular obstacle
//! - [`ControlBounds`]: box limits on the control vector
//!
//! Constraints are consumed by [`GDocp`](crate::optimizer::GDocp) through the
//! [`ConstraintCost`](crate::costs::ConstraintCost) penalty adapter.

pub mod control_bounds;
pub mod disk;

pub use control_bounds::ControlBounds;
pub use disk::DiskConstraint;
