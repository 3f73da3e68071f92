use nalgebra::{DVector, Vector2};

use crate::{
    core::{Constraint, ConstraintJacobians, CoreError, CoreResult},
    manifold::Euclidean,
};

/// Circular obstacle on a planar position block of a Euclidean state.
///
/// ```text
/// g = r + margin - |pos - c|
/// ```
///
/// `pos = (x[offset], x[offset + 1])`. At the exact center the gradient is
/// taken along `+x`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskConstraint {
    offset: usize,
    center: Vector2<f64>,
    radius: f64,
    margin: f64,
}

impl DiskConstraint {
    /// # Arguments
    /// * `offset` - Index of the first position coordinate in the state
    /// * `center` - Obstacle center
    /// * `radius` - Obstacle radius, must be positive
    pub fn new(offset: usize, center: [f64; 2], radius: f64) -> CoreResult<Self> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(CoreError::InvalidInput(format!(
                "disk radius must be positive and finite, got {}",
                radius
            ))
            .log());
        }
        if center.iter().any(|c| !c.is_finite()) {
            return Err(CoreError::InvalidInput("disk center is not finite".into()).log());
        }
        Ok(Self {
            offset,
            center: Vector2::new(center[0], center[1]),
            radius,
            margin: 0.0,
        })
    }

    /// Extra clearance added to the radius.
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn center(&self) -> Vector2<f64> {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Distance from the position block of `x` to the disk center.
    pub fn distance(&self, x: &DVector<f64>) -> f64 {
        (self.position(x) - self.center).norm()
    }

    fn position(&self, x: &DVector<f64>) -> Vector2<f64> {
        Vector2::new(x[self.offset], x[self.offset + 1])
    }
}

impl Constraint<Euclidean> for DiskConstraint {
    fn dim(&self) -> usize {
        1
    }

    fn evaluate(
        &self,
        _t: f64,
        x: &DVector<f64>,
        _u: Option<&DVector<f64>>,
        _p: &DVector<f64>,
        jacobians: Option<&mut ConstraintJacobians>,
    ) -> DVector<f64> {
        let delta = self.position(x) - self.center;
        let distance = delta.norm();

        if let Some(jac) = jacobians {
            let direction = if distance > f64::EPSILON {
                delta / distance
            } else {
                Vector2::x()
            };
            jac.gx[(0, self.offset)] = -direction.x;
            jac.gx[(0, self.offset + 1)] = -direction.y;
        }
        DVector::from_element(1, self.radius + self.margin - distance)
    }
}
