//! Regularization schedule for the control Hessian.
//!
//! Quadratic growth on failure, quadratic shrink on success (Tassa, Erez and
//! Todorov, "Synthesis and stabilization of complex behaviors through online
//! trajectory optimization", IROS 2012):
//!
//! ```text
//! increase: dmu = max(dmu0, dmu·dmu0),   mu = max(mu_min, mu·dmu)
//! decrease: dmu = min(1/dmu0, dmu/dmu0), mu = mu·dmu if mu·dmu > mu_min else 0
//! ```

/// Regularization state owned by one solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Regularization {
    mu: f64,
    dmu: f64,
    dmu0: f64,
    mu_min: f64,
    mu_max: f64,
}

impl Regularization {
    /// # Arguments
    /// * `mu` - Initial regularization (clamped to be non-negative)
    /// * `mu_min` - Smallest non-zero value
    /// * `mu_max` - Upper bound; exceeding it means divergence
    /// * `dmu0` - Base growth factor, greater than one
    pub fn new(mu: f64, mu_min: f64, mu_max: f64, dmu0: f64) -> Self {
        Self {
            mu: mu.max(0.0),
            dmu: 1.0,
            dmu0,
            mu_min,
            mu_max,
        }
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn mu_max(&self) -> f64 {
        self.mu_max
    }

    /// Grow `mu` after a failure.
    ///
    /// Returns `false` once `mu` exceeds `mu_max`.
    pub fn increase(&mut self) -> bool {
        self.dmu = self.dmu0.max(self.dmu * self.dmu0);
        self.mu = self.mu_min.max(self.mu * self.dmu);
        self.mu <= self.mu_max
    }

    /// Shrink `mu` after a success, dropping to zero below `mu_min`.
    pub fn decrease(&mut self) {
        self.dmu = (1.0 / self.dmu0).min(self.dmu / self.dmu0);
        let next = self.mu * self.dmu;
        self.mu = if next > self.mu_min { next } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increase_starts_at_mu_min() {
        let mut reg = Regularization::new(0.0, 1e-6, 1e10, 2.0);
        assert!(reg.increase());
        assert!((reg.mu() - 1e-6).abs() < 1e-18);
    }

    #[test]
    fn test_increase_is_strict_and_accelerates() {
        let mut reg = Regularization::new(1.0, 1e-6, 1e10, 2.0);
        assert!(reg.increase());
        let first = reg.mu();
        assert!(reg.increase());
        let second = reg.mu();
        assert!(first > 1.0);
        assert!(second / first > first / 1.0);
    }

    #[test]
    fn test_decrease_is_strict_and_bounded_below() {
        let mut reg = Regularization::new(1.0, 1e-6, 1e10, 2.0);
        let mut previous = reg.mu();
        for _ in 0..30 {
            reg.decrease();
            assert!(reg.mu() >= 0.0);
            assert!(reg.mu() < previous || reg.mu() == 0.0);
            previous = reg.mu();
        }
        assert_eq!(reg.mu(), 0.0);
    }

    #[test]
    fn test_increase_reports_divergence() {
        let mut reg = Regularization::new(1.0, 1e-6, 1e3, 2.0);
        let mut steps = 0;
        while reg.increase() {
            steps += 1;
            assert!(steps < 100);
        }
        assert!(reg.mu() > reg.mu_max());
    }
}
