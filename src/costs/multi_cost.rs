use nalgebra::DVector;

use crate::{
    core::{Cost, CostExpansion},
    manifold::Manifold,
};

/// Sum of independent costs.
///
/// Values and every requested derivative are accumulated in insertion order.
/// Sub-costs may borrow from the caller, which is how the constrained solver
/// stacks a penalty on top of a user cost without taking ownership of it.
pub struct MultiCost<'a, M: Manifold> {
    costs: Vec<Box<dyn Cost<M> + 'a>>,
}

impl<M: Manifold> Default for MultiCost<'_, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, M: Manifold> MultiCost<'a, M> {
    pub fn new() -> Self {
        Self { costs: Vec::new() }
    }

    /// Builder variant of [`push`](Self::push).
    pub fn with_cost(mut self, cost: impl Cost<M> + 'a) -> Self {
        self.push(cost);
        self
    }

    pub fn push(&mut self, cost: impl Cost<M> + 'a) {
        self.costs.push(Box::new(cost));
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}

impl<M: Manifold> Cost<M> for MultiCost<'_, M> {
    fn stage(
        &self,
        k: usize,
        t: f64,
        x: &M::Point,
        u: &DVector<f64>,
        h: f64,
        p: &DVector<f64>,
        mut expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        self.costs
            .iter()
            .map(|cost| cost.stage(k, t, x, u, h, p, expansion.as_deref_mut()))
            .sum()
    }

    fn terminal(
        &self,
        k: usize,
        t: f64,
        x: &M::Point,
        p: &DVector<f64>,
        mut expansion: Option<&mut CostExpansion>,
    ) -> f64 {
        self.costs
            .iter()
            .map(|cost| cost.terminal(k, t, x, p, expansion.as_deref_mut()))
            .sum()
    }
}
