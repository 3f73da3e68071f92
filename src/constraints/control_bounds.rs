use nalgebra::DVector;

use crate::{
    core::{Constraint, ConstraintJacobians, CoreError, CoreResult},
    manifold::Manifold,
};

/// Box constraint `lower <= u <= upper`, written as `[u - upper; lower - u] <= 0`.
///
/// Only applies to stages. The terminal step has no control and always reports
/// zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlBounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl ControlBounds {
    /// Infinite entries leave that side of the control unbounded.
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> CoreResult<Self> {
        if lower.len() != upper.len() {
            return Err(CoreError::DimensionMismatch(format!(
                "lower bound has length {}, upper bound {}",
                lower.len(),
                upper.len()
            ))
            .log());
        }
        if let Some(i) = (0..lower.len()).find(|&i| !(lower[i] <= upper[i])) {
            return Err(CoreError::InvalidInput(format!(
                "bound {} is empty: lower {} > upper {}",
                i, lower[i], upper[i]
            ))
            .log());
        }
        Ok(Self { lower, upper })
    }

    /// Symmetric bounds `-limit <= u <= limit`.
    pub fn symmetric(limit: DVector<f64>) -> CoreResult<Self> {
        Self::new(-&limit, limit)
    }

    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }
}

impl<M: Manifold> Constraint<M> for ControlBounds {
    fn dim(&self) -> usize {
        2 * self.lower.len()
    }

    fn evaluate(
        &self,
        _t: f64,
        _x: &M::Point,
        u: Option<&DVector<f64>>,
        _p: &DVector<f64>,
        jacobians: Option<&mut ConstraintJacobians>,
    ) -> DVector<f64> {
        let c = self.lower.len();
        let Some(u) = u else {
            return DVector::zeros(2 * c);
        };

        if let Some(jac) = jacobians {
            for i in 0..c {
                jac.gu[(i, i)] = 1.0;
                jac.gu[(c + i, i)] = -1.0;
            }
        }
        let mut g = DVector::zeros(2 * c);
        g.rows_mut(0, c).copy_from(&(u - &self.upper));
        g.rows_mut(c, c).copy_from(&(&self.lower - u));
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::max_violation, manifold::Euclidean};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn evaluate(bounds: &ControlBounds, u: Option<&DVector<f64>>) -> DVector<f64> {
        let x = DVector::zeros(1);
        <ControlBounds as Constraint<Euclidean>>::evaluate(bounds, 0.0, &x, u, &DVector::zeros(0), None)
    }

    #[test]
    fn test_control_bounds_rejects_empty_box() {
        let result = ControlBounds::new(
            DVector::from_vec(vec![0.0, 2.0]),
            DVector::from_vec(vec![1.0, 1.0]),
        );
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_control_bounds_violation() -> TestResult {
        let bounds = ControlBounds::symmetric(DVector::from_vec(vec![1.0, 2.0]))?;
        let u = DVector::from_vec(vec![1.5, -3.0]);
        let g = evaluate(&bounds, Some(&u));
        assert_eq!(g.len(), 4);
        assert!((max_violation(&g) - 1.0).abs() < 1e-12);
        assert!((g[0] - 0.5).abs() < 1e-12);
        assert!((g[3] - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_control_bounds_ignore_terminal() -> TestResult {
        let bounds = ControlBounds::symmetric(DVector::from_vec(vec![1.0]))?;
        assert_eq!(max_violation(&evaluate(&bounds, None)), 0.0);
        Ok(())
    }
}
