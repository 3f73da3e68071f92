use nalgebra::{DMatrix, DVector};

use crate::manifold::Manifold;

/// Derivatives of a stage or terminal cost in tangent coordinates at `x`.
///
/// Costs add their contribution into whatever is already stored, so a caller
/// zeroes the expansion once and lets every sub-cost accumulate. Terminal
/// expansions are created with a zero control dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct CostExpansion {
    pub lx: DVector<f64>,
    pub lxx: DMatrix<f64>,
    pub lu: DVector<f64>,
    pub luu: DMatrix<f64>,
    /// ∂²L/∂x∂u (state dim × control dim)
    pub lxu: DMatrix<f64>,
    pub lp: DVector<f64>,
    pub lpp: DMatrix<f64>,
    /// ∂²L/∂p∂x (parameter dim × state dim)
    pub lpx: DMatrix<f64>,
}

impl CostExpansion {
    pub fn zeros(state_dim: usize, control_dim: usize, parameter_dim: usize) -> Self {
        Self {
            lx: DVector::zeros(state_dim),
            lxx: DMatrix::zeros(state_dim, state_dim),
            lu: DVector::zeros(control_dim),
            luu: DMatrix::zeros(control_dim, control_dim),
            lxu: DMatrix::zeros(state_dim, control_dim),
            lp: DVector::zeros(parameter_dim),
            lpp: DMatrix::zeros(parameter_dim, parameter_dim),
            lpx: DMatrix::zeros(parameter_dim, state_dim),
        }
    }

    /// Expansion for the terminal step, which has no control.
    pub fn terminal(state_dim: usize, parameter_dim: usize) -> Self {
        Self::zeros(state_dim, 0, parameter_dim)
    }
}

/// Stage and terminal cost over states on `M`.
///
/// `k` is the step index within the horizon being optimized, so costs built on
/// recorded measurements can look up their data directly.
pub trait Cost<M: Manifold>: Send + Sync {
    /// Running cost of step `k` over `[t, t + h]`.
    #[allow(clippy::too_many_arguments)]
    fn stage(
        &self,
        k: usize,
        t: f64,
        x: &M::Point,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64;

    /// Cost on the final state, `k` being the horizon length.
    fn terminal(
        &self,
        k: usize,
        t: f64,
        x: &M::Point,
        p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64;
}

impl<M: Manifold, C: Cost<M> + ?Sized> Cost<M> for &C {
    #[allow(clippy::too_many_arguments)]
    fn stage(
        &self,
        k: usize,
        t: f64,
        x: &M::Point,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        (**self).stage(k, t, x, u, h, p, expansion)
    }

    fn terminal(
        &self,
        k: usize,
        t: f64,
        x: &M::Point,
        p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        (**self).terminal(k, t, x, p, expansion)
    }
}

impl<M: Manifold, C: Cost<M> + ?Sized> Cost<M> for Box<C> {
    #[allow(clippy::too_many_arguments)]
    fn stage(
        &self,
        k: usize,
        t: f64,
        x: &M::Point,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        (**self).stage(k, t, x, u, h, p, expansion)
    }

    fn terminal(
        &self,
        k: usize,
        t: f64,
        x: &M::Point,
        p: &DVector<f64>,
        expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        (**self).terminal(k, t, x, p, expansion)
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Largest deviation between the analytic gradients of a stage cost and
    /// central differences, over `Lx`, `Lu` and `Lp`.
    #[allow(clippy::too_many_arguments)]
    pub fn max_stage_gradient_error<M: Manifold, C: Cost<M>>(
        manifold: &M,
        cost: &C,
        k: usize,
        t: f64,
        x: &M::Point,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
    ) -> f64 {
        let n = manifold.dim();
        let mut expansion = CostExpansion::zeros(n, u.len(), p.len());
        cost.stage(k, t, x, u, h, p, Some(&mut expansion));
        let eps = 1e-6;
        let mut worst: f64 = 0.0;

        for j in 0..n {
            let mut delta = DVector::zeros(n);
            delta[j] = eps;
            let plus = cost.stage(k, t, &manifold.retract(x, &delta), u, h, p, None);
            let minus = cost.stage(k, t, &manifold.retract(x, &(-&delta)), u, h, p, None);
            worst = worst.max(((plus - minus) / (2.0 * eps) - expansion.lx[j]).abs());
        }
        for j in 0..u.len() {
            let mut du = DVector::zeros(u.len());
            du[j] = eps;
            let plus = cost.stage(k, t, x, &(u + &du), h, p, None);
            let minus = cost.stage(k, t, x, &(u - &du), h, p, None);
            worst = worst.max(((plus - minus) / (2.0 * eps) - expansion.lu[j]).abs());
        }
        for j in 0..p.len() {
            let mut dp = DVector::zeros(p.len());
            dp[j] = eps;
            let plus = cost.stage(k, t, x, u, h, &(p + &dp), None);
            let minus = cost.stage(k, t, x, u, h, &(p - &dp), None);
            worst = worst.max(((plus - minus) / (2.0 * eps) - expansion.lp[j]).abs());
        }
        worst
    }
}
