use nalgebra::DVector;

use crate::core::{CoreError, CoreResult};

/// Time stamps, states and controls of one horizon.
///
/// `ts` and `xs` hold `N + 1` entries, `us` holds `N`. Control `us[k]` drives the
/// system from `ts[k]` to `ts[k + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory<P> {
    pub ts: Vec<f64>,
    pub xs: Vec<P>,
    pub us: Vec<DVector<f64>>,
}

impl<P> Trajectory<P> {
    /// Build a trajectory after checking container sizes and time ordering.
    ///
    /// # Errors
    /// - `CoreError::EmptyHorizon` if `us` is empty
    /// - `CoreError::SizeMismatch` unless `ts.len() == xs.len() == us.len() + 1`
    /// - `CoreError::NonIncreasingTime` if two consecutive stamps do not increase
    /// - `CoreError::DimensionMismatch` if the controls differ in length
    pub fn new(ts: Vec<f64>, xs: Vec<P>, us: Vec<DVector<f64>>) -> CoreResult<Self> {
        if us.is_empty() {
            return Err(CoreError::EmptyHorizon.log());
        }
        if ts.len() != us.len() + 1 || xs.len() != us.len() + 1 {
            return Err(CoreError::SizeMismatch(format!(
                "expected {} time stamps and states for {} controls, got {} and {}",
                us.len() + 1,
                us.len(),
                ts.len(),
                xs.len()
            ))
            .log());
        }
        if let Some(index) = ts.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(CoreError::NonIncreasingTime {
                index,
                previous: ts[index],
                next: ts[index + 1],
            }
            .log());
        }
        let control_dim = us[0].len();
        if let Some(k) = us.iter().position(|u| u.len() != control_dim) {
            return Err(CoreError::DimensionMismatch(format!(
                "control {} has length {}, expected {}",
                k,
                us[k].len(),
                control_dim
            ))
            .log());
        }
        Ok(Self { ts, xs, us })
    }

    /// Number of control steps `N`.
    pub fn horizon(&self) -> usize {
        self.us.len()
    }

    pub fn control_dim(&self) -> usize {
        self.us.first().map_or(0, |u| u.len())
    }

    /// Step size `ts[k + 1] - ts[k]`.
    pub fn step_size(&self, k: usize) -> f64 {
        self.ts[k + 1] - self.ts[k]
    }

    pub fn initial_time(&self) -> f64 {
        self.ts[0]
    }

    pub fn final_time(&self) -> f64 {
        self.ts[self.ts.len() - 1]
    }
}

/// `steps + 1` equally spaced stamps from `t0` to `tf`.
pub fn uniform_times(t0: f64, tf: f64, steps: usize) -> Vec<f64> {
    let h = (tf - t0) / steps.max(1) as f64;
    (0..=steps).map(|k| t0 + h * k as f64).collect()
}
