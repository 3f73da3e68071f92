use nalgebra::{DMatrix, DVector};

use crate::{
    core::{CoreError, CoreResult, Cost, CostExpansion},
    manifold::Manifold,
};

/// Linear-quadratic tracking cost on an arbitrary state manifold.
///
/// # Mathematical Formulation
///
/// With `e = x ⊖ x_d = Difference(x_d, x)`:
///
/// ```text
/// L(x, u) = h/2 eᵀ Q e + h/2 (u - u_d)ᵀ R (u - u_d)
/// Φ(x)    = 1/2 e_fᵀ Q_f e_f,     e_f = x ⊖ x_f
/// ```
///
/// The reference `x_d` of step `k` is the `k`-th state reference when one was
/// given, and the goal `x_f` otherwise. Gradients use the exact derivative of
/// the difference map `D = ∂e/∂x`, Hessians the Gauss-Newton term `DᵀQD`.
#[derive(Debug, Clone)]
pub struct LqCost<M: Manifold> {
    manifold: M,
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    qf: DMatrix<f64>,
    goal: M::Point,
    state_references: Vec<M::Point>,
    control_reference: DVector<f64>,
}

impl<M: Manifold> LqCost<M> {
    /// Create a cost driving the state to `goal` with zero reference control.
    ///
    /// # Arguments
    /// * `q` - Stage state weight (state dim × state dim)
    /// * `r` - Control weight; its size fixes the control dimension
    /// * `qf` - Terminal state weight (state dim × state dim)
    pub fn new(
        manifold: M,
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        qf: DMatrix<f64>,
        goal: M::Point,
    ) -> CoreResult<Self> {
        let n = manifold.dim();
        for (name, weight, dim) in [("Q", &q, n), ("R", &r, r.nrows()), ("Qf", &qf, n)] {
            if weight.nrows() != dim || weight.ncols() != dim {
                return Err(CoreError::DimensionMismatch(format!(
                    "{} is {}x{}, expected {}x{}",
                    name,
                    weight.nrows(),
                    weight.ncols(),
                    dim,
                    dim
                ))
                .log());
            }
            if weight.iter().any(|v| !v.is_finite()) {
                return Err(CoreError::InvalidInput(format!("{} is not finite", name)).log());
            }
        }
        if !manifold.is_finite(&goal) {
            return Err(CoreError::InvalidInput("goal state is not finite".into()).log());
        }

        let control_reference = DVector::zeros(r.nrows());
        Ok(Self {
            manifold,
            q,
            r,
            qf,
            goal,
            state_references: Vec::new(),
            control_reference,
        })
    }

    /// Track `references[k]` at stage `k`; steps past the end fall back to the goal.
    pub fn with_state_references(mut self, references: Vec<M::Point>) -> Self {
        self.state_references = references;
        self
    }

    /// Penalize deviation from `reference` instead of from zero control.
    pub fn with_control_reference(mut self, reference: DVector<f64>) -> CoreResult<Self> {
        if reference.len() != self.r.nrows() {
            return Err(CoreError::DimensionMismatch(format!(
                "control reference has length {}, R is {}x{}",
                reference.len(),
                self.r.nrows(),
                self.r.ncols()
            ))
            .log());
        }
        self.control_reference = reference;
        Ok(self)
    }

    pub fn goal(&self) -> &M::Point {
        &self.goal
    }

    /// Move the terminal target.
    pub fn set_goal(&mut self, goal: M::Point) {
        self.goal = goal;
    }

    pub fn manifold(&self) -> &M {
        &self.manifold
    }

    fn state_reference(&self, k: usize) -> &M::Point {
        self.state_references.get(k).unwrap_or(&self.goal)
    }

    /// `1/2 eᵀWe` plus its Gauss-Newton expansion scaled by `scale`.
    fn state_term(
        &self,
        reference: &M::Point,
        x: &M::Point,
        weight: &DMatrix<f64>,
        scale: f64,
        expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        let e = self.manifold.difference(reference, x);
        let we = weight * &e;
        if let Some(expansion) = expansion {
            let d = self.manifold.difference_jacobian(reference, x);
            let dt = d.transpose();
            expansion.lx += &dt * &we * scale;
            expansion.lxx += &dt * weight * &d * scale;
        }
        0.5 * scale * e.dot(&we)
    }
}

impl<M: Manifold> Cost<M> for LqCost<M> {
    fn stage(
        &self,
        k: usize,
        _t: f64,
        x: &M::Point,
        u: &DVector<f64>,
        h: f64,
        _p: &DVector<f64>,
        mut expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        let state = self.state_term(
            self.state_reference(k),
            x,
            &self.q,
            h,
            expansion.as_deref_mut(),
        );

        let du = u - &self.control_reference;
        let r_du = &self.r * &du;
        if let Some(expansion) = expansion {
            expansion.lu += &r_du * h;
            expansion.luu += &self.r * h;
        }
        state + 0.5 * h * du.dot(&r_du)
    }

    fn terminal(
        &self,
        _k: usize,
        _t: f64,
        x: &M::Point,
        _p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        self.state_term(&self.goal, x, &self.qf, 1.0, expansion)
    }
}
