use nalgebra::{DMatrix, DVector};

use crate::{
    core::{CoreError, CoreResult, StepJacobians, System},
    manifold::Euclidean,
};

/// Time-invariant discrete linear dynamics `x' = A x + B u`.
///
/// The step size is ignored; `A` and `B` are already the discrete-time matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    manifold: Euclidean,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}

impl LinearSystem {
    /// # Errors
    /// `CoreError::DimensionMismatch` if `A` is not square or `B` has a different row count.
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>) -> CoreResult<Self> {
        if a.nrows() != a.ncols() || b.nrows() != a.nrows() {
            return Err(CoreError::DimensionMismatch(format!(
                "A is {}x{}, B is {}x{}",
                a.nrows(),
                a.ncols(),
                b.nrows(),
                b.ncols()
            ))
            .log());
        }
        Ok(Self {
            manifold: Euclidean::new(a.nrows()),
            a,
            b,
        })
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }
}

impl System for LinearSystem {
    type Manifold = Euclidean;

    fn manifold(&self) -> &Euclidean {
        &self.manifold
    }

    fn control_dim(&self) -> usize {
        self.b.ncols()
    }

    fn step(
        &self,
        _t: f64,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _h: f64,
        _p: &DVector<f64>,
        jacobians: Option<&mut StepJacobians>,
    ) -> DVector<f64> {
        if let Some(jac) = jacobians {
            jac.a.copy_from(&self.a);
            jac.b.copy_from(&self.b);
        }
        &self.a * x + &self.b * u
    }
}
