use faer::{Mat, Side, linalg::solvers::Solve};
use nalgebra::{DMatrix, DVector};

use crate::linalg::{DenseLinearSolver, LinAlgError, LinAlgResult};

/// Dense LLᵀ solver backed by faer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseCholeskySolver;

impl DenseCholeskySolver {
    pub fn new() -> Self {
        DenseCholeskySolver
    }
}

impl DenseLinearSolver for DenseCholeskySolver {
    fn solve_damped(
        &self,
        matrix: &DMatrix<f64>,
        rhs: &DVector<f64>,
        damping: f64,
    ) -> LinAlgResult<DVector<f64>> {
        let n = matrix.nrows();
        if matrix.ncols() != n || rhs.len() != n {
            return Err(LinAlgError::DimensionMismatch(format!(
                "matrix is {}x{}, rhs has {} rows",
                n,
                matrix.ncols(),
                rhs.len()
            ))
            .log());
        }
        if n == 0 {
            return Ok(DVector::zeros(0));
        }

        // Symmetrize while copying; callers accumulate the lower and upper halves separately.
        let system = Mat::<f64>::from_fn(n, n, |i, j| {
            let value = 0.5 * (matrix[(i, j)] + matrix[(j, i)]);
            if i == j { value + damping } else { value }
        });
        let b = Mat::<f64>::from_fn(n, 1, |i, _| rhs[i]);

        let llt = system.llt(Side::Lower).map_err(|e| {
            LinAlgError::FactorizationFailed("dense Cholesky decomposition failed".to_string())
                .log_with_source(e)
        })?;
        let x = llt.solve(&b);

        let solution = DVector::from_fn(n, |i, _| x[(i, 0)]);
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(LinAlgError::SingularMatrix.log());
        }
        Ok(solution)
    }
}
