//! Concrete dynamics implementing the [`System`](crate::core::System) contract.
//!
//! System        | State      | Control           | Parameters
//! ------------- | ---------- | ----------------- | -----------------------------
//! LinearSystem  | ℝⁿ         | ℝᵐ                | none
//! Particle2d    | ℝ⁴         | 2-D acceleration  | none
//! KinematicCar  | SE(2)      | (speed, yaw rate) | optional body-frame velocity disturbance
//! Attitude3d    | SO(3)      | body angular rate | gyro bias

pub mod attitude3d;
pub mod kinematic_car;
pub mod linear;
pub mod particle2d;

pub use attitude3d::Attitude3d;
pub use kinematic_car::KinematicCar;
pub use linear::LinearSystem;
pub use particle2d::Particle2d;
