use nalgebra::{DMatrix, DVector};

use crate::{
    core::{Constraint, ConstraintJacobians, Cost, CostExpansion},
    manifold::Manifold,
};

/// Exterior quadratic penalty turning inequality constraints into a cost.
///
/// ```text
/// L = h · b/2 · Σᵢ max(gᵢ, 0)²      (stage)
/// Φ =     b/2 · Σᵢ max(gᵢ, 0)²      (terminal, control-free)
/// ```
///
/// Derivatives use the Gauss-Newton approximation over the active set:
/// gradient `b Σ gᵢ ∇gᵢ`, Hessian `b Σ ∇gᵢᵀ ∇gᵢ`, including the cross blocks
/// `Lxu`, `Lpx` and `Lpp`.
pub struct ConstraintCost<'a, M: Manifold> {
    constraints: &'a [Box<dyn Constraint<M>>],
    weight: f64,
}

impl<'a, M: Manifold> ConstraintCost<'a, M> {
    /// Penalize `constraints` with weight `weight` (`b`).
    pub fn new(constraints: &'a [Box<dyn Constraint<M>>], weight: f64) -> Self {
        Self {
            constraints,
            weight,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    fn penalty(
        &self,
        t: f64,
        x: &M::Point,
        u: Option<&DVector<f64>>,
        p: &DVector<f64>,
        scale: f64,
        mut expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        let b = self.weight * scale;
        let mut value = 0.0;

        for constraint in self.constraints {
            let Some(expansion) = expansion.as_deref_mut() else {
                let g = constraint.evaluate(t, x, u, p, None);
                value += g.iter().filter(|&&gi| gi > 0.0).map(|gi| gi * gi).sum::<f64>();
                continue;
            };

            let mut jac = ConstraintJacobians::zeros(
                constraint.dim(),
                expansion.lx.len(),
                expansion.lu.len(),
                p.len(),
            );
            let g = constraint.evaluate(t, x, u, p, Some(&mut jac));

            for (i, &gi) in g.iter().enumerate() {
                if gi <= 0.0 {
                    continue;
                }
                value += gi * gi;

                let gx = jac.gx.row(i).transpose();
                let gu = jac.gu.row(i).transpose();
                let gp = jac.gp.row(i).transpose();

                expansion.lx.axpy(b * gi, &gx, 1.0);
                expansion.lu.axpy(b * gi, &gu, 1.0);
                expansion.lp.axpy(b * gi, &gp, 1.0);
                add_outer(&mut expansion.lxx, b, &gx, &gx);
                add_outer(&mut expansion.luu, b, &gu, &gu);
                add_outer(&mut expansion.lxu, b, &gx, &gu);
                add_outer(&mut expansion.lpp, b, &gp, &gp);
                add_outer(&mut expansion.lpx, b, &gp, &gx);
            }
        }
        0.5 * b * value
    }
}

/// `m += scale · a bᵀ`
fn add_outer(m: &mut DMatrix<f64>, scale: f64, a: &DVector<f64>, b: &DVector<f64>) {
    if m.is_empty() {
        return;
    }
    m.ger(scale, a, b, 1.0);
}

impl<M: Manifold> Cost<M> for ConstraintCost<'_, M> {
    fn stage(
        &self,
        _k: usize,
        t: f64,
        x: &M::Point,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        self.penalty(t, x, Some(u), p, h, expansion)
    }

    fn terminal(
        &self,
        _k: usize,
        t: f64,
        x: &M::Point,
        p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        self.penalty(t, x, None, p, 1.0, expansion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constraints::{ControlBounds, DiskConstraint},
        core::cost::test_utils::max_stage_gradient_error,
        manifold::Euclidean,
    };

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn constraints() -> Result<Vec<Box<dyn Constraint<Euclidean>>>, Box<dyn std::error::Error>> {
        let constraints: Vec<Box<dyn Constraint<Euclidean>>> = vec![
            Box::new(DiskConstraint::new(0, [0.0, 0.0], 1.0)?),
            Box::new(ControlBounds::new(
                DVector::from_vec(vec![-1.0, -1.0]),
                DVector::from_vec(vec![1.0, 1.0]),
            )?),
        ];
        Ok(constraints)
    }

    #[test]
    fn test_constraint_cost_is_zero_when_feasible() -> TestResult {
        let constraints = constraints()?;
        let cost = ConstraintCost::new(&constraints, 100.0);
        let x = DVector::from_vec(vec![2.0, 0.0, 0.0, 0.0]);
        let u = DVector::from_vec(vec![0.5, -0.5]);
        let p = DVector::zeros(0);

        let mut expansion = CostExpansion::zeros(4, 2, 0);
        let value = cost.stage(0, 0.0, &x, &u, 0.1, &p, Some(&mut expansion));
        assert_eq!(value, 0.0);
        assert_eq!(expansion, CostExpansion::zeros(4, 2, 0));
        Ok(())
    }

    #[test]
    fn test_constraint_cost_penalizes_violation() -> TestResult {
        let constraints = constraints()?;
        let cost = ConstraintCost::new(&constraints, 10.0);
        // 0.5 inside the disk, control 0.5 past its bound
        let x = DVector::from_vec(vec![0.5, 0.0, 0.0, 0.0]);
        let u = DVector::from_vec(vec![1.5, 0.0]);
        let p = DVector::zeros(0);

        let stage = cost.stage(0, 0.0, &x, &u, 0.2, &p, None);
        assert!((stage - 0.2 * 5.0 * (0.25 + 0.25)).abs() < 1e-12);

        // Control bounds never act on the terminal state
        let terminal = cost.terminal(1, 0.2, &x, &p, None);
        assert!((terminal - 5.0 * 0.25).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_constraint_cost_gradients() -> TestResult {
        let constraints = constraints()?;
        let cost = ConstraintCost::new(&constraints, 50.0);
        let manifold = Euclidean::new(4);
        let x = DVector::from_vec(vec![0.3, -0.4, 1.0, 2.0]);
        let u = DVector::from_vec(vec![-1.2, 1.4]);
        let p = DVector::zeros(0);
        let error = max_stage_gradient_error(&manifold, &cost, 0, 0.0, &x, &u, 0.1, &p);
        assert!(error < 1e-5, "gradient error {}", error);
        Ok(())
    }
}
