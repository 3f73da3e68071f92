use nalgebra::{DVector, Vector2};

use crate::{
    core::Trajectory,
    costs::LandmarkObservation,
    manifold::SE2,
    track::{TrackError, TrackResult},
};

/// Number of leading disturbance entries in the parameter vector.
pub const DISTURBANCE_DIM: usize = 2;

/// Canonical, append-only record of a tracking run.
///
/// Every state buffer holds one entry more than the control buffers:
/// `ts`, `xs`, `true_xs`, `odometry_xs` and `observations` have `len()` entries,
/// `us` and `odometry` have `len() - 1`.
///
/// The parameter vector is `[d_x, d_y, l₀ₓ, l₀ᵧ, ...]`; landmarks are appended
/// the first time they are seen and never removed.
#[derive(Debug, Clone)]
pub struct TrackHistory {
    ts: Vec<f64>,
    xs: Vec<SE2>,
    us: Vec<DVector<f64>>,
    true_xs: Vec<SE2>,
    odometry_xs: Vec<SE2>,
    odometry: Vec<DVector<f64>>,
    observations: Vec<Vec<LandmarkObservation>>,
    p: DVector<f64>,
    /// World landmark index of each estimated landmark
    world_ids: Vec<usize>,
}

impl TrackHistory {
    /// Start a history at a known initial pose, with a zero disturbance estimate.
    pub fn new(t0: f64, x0: SE2) -> Self {
        Self {
            ts: vec![t0],
            xs: vec![x0.clone()],
            us: Vec::new(),
            true_xs: vec![x0.clone()],
            odometry_xs: vec![x0],
            odometry: Vec::new(),
            observations: vec![Vec::new()],
            p: DVector::zeros(DISTURBANCE_DIM),
            world_ids: Vec::new(),
        }
    }

    /// Number of recorded states.
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Number of recorded controls.
    pub fn horizon(&self) -> usize {
        self.us.len()
    }

    pub fn ts(&self) -> &[f64] {
        &self.ts
    }

    /// Estimated poses.
    pub fn xs(&self) -> &[SE2] {
        &self.xs
    }

    /// Estimated controls.
    pub fn us(&self) -> &[DVector<f64>] {
        &self.us
    }

    pub fn true_xs(&self) -> &[SE2] {
        &self.true_xs
    }

    /// Dead-reckoning poses from odometry alone.
    pub fn odometry_xs(&self) -> &[SE2] {
        &self.odometry_xs
    }

    /// Measured controls.
    pub fn odometry(&self) -> &[DVector<f64>] {
        &self.odometry
    }

    pub fn observations(&self) -> &[Vec<LandmarkObservation>] {
        &self.observations
    }

    /// Estimated `[d_x, d_y, landmarks...]`.
    pub fn parameters(&self) -> &DVector<f64> {
        &self.p
    }

    pub fn disturbance(&self) -> Vector2<f64> {
        Vector2::new(self.p[0], self.p[1])
    }

    pub fn landmark_count(&self) -> usize {
        self.world_ids.len()
    }

    /// Estimated position of landmark `index`.
    pub fn landmark(&self, index: usize) -> Option<Vector2<f64>> {
        let slot = DISTURBANCE_DIM + 2 * index;
        (index < self.world_ids.len()).then(|| Vector2::new(self.p[slot], self.p[slot + 1]))
    }

    /// World index of estimated landmark `index`.
    pub fn world_id(&self, index: usize) -> Option<usize> {
        self.world_ids.get(index).copied()
    }

    /// Estimate index of a world landmark, if it has been seen.
    pub fn estimate_index(&self, world_id: usize) -> Option<usize> {
        self.world_ids.iter().position(|&id| id == world_id)
    }

    /// Append a landmark seen for the first time and return its estimate index.
    pub fn add_landmark(&mut self, world_id: usize, position: Vector2<f64>) -> usize {
        let n = self.p.len();
        let mut p = DVector::zeros(n + 2);
        p.rows_mut(0, n).copy_from(&self.p);
        p[n] = position.x;
        p[n + 1] = position.y;
        self.p = p;
        self.world_ids.push(world_id);
        self.world_ids.len() - 1
    }

    /// Attach observations to the most recent state.
    pub fn observe(&mut self, observations: Vec<LandmarkObservation>) {
        if let Some(last) = self.observations.last_mut() {
            last.extend(observations);
        }
    }

    /// Record one control period.
    ///
    /// `estimate` is the odometry prediction of the new pose and becomes the
    /// estimated state until the next re-solve; the measured control doubles as
    /// the initial control estimate.
    pub fn push(
        &mut self,
        t: f64,
        truth: SE2,
        estimate: SE2,
        dead_reckoning: SE2,
        measured: DVector<f64>,
    ) {
        self.ts.push(t);
        self.true_xs.push(truth);
        self.xs.push(estimate);
        self.odometry_xs.push(dead_reckoning);
        self.us.push(measured.clone());
        self.odometry.push(measured);
        self.observations.push(Vec::new());
    }

    /// First control index of a trailing window of `window` controls.
    ///
    /// `None`, or a window longer than the history, selects everything.
    pub fn window_start(&self, window: Option<usize>) -> usize {
        match window {
            Some(m) if m < self.us.len() => self.us.len() - m,
            _ => 0,
        }
    }

    /// Owned copy of states `[start, len)` and controls `[start, horizon)`.
    pub fn window(&self, start: usize) -> TrackResult<Trajectory<SE2>> {
        if start >= self.us.len() {
            return Err(TrackError::SpliceMismatch(format!(
                "window start {} leaves no controls in a history of {}",
                start,
                self.us.len()
            ))
            .log());
        }
        Ok(Trajectory::new(
            self.ts[start..].to_vec(),
            self.xs[start..].to_vec(),
            self.us[start..].to_vec(),
        )?)
    }

    /// Write an optimized window back at offset `start`, together with the new
    /// parameter estimate.
    pub fn splice(
        &mut self,
        start: usize,
        window: Trajectory<SE2>,
        p: DVector<f64>,
    ) -> TrackResult<()> {
        let expected = self.us.len().saturating_sub(start);
        if start >= self.us.len()
            || window.us.len() != expected
            || window.xs.len() != expected + 1
        {
            return Err(TrackError::SpliceMismatch(format!(
                "window of {} states / {} controls does not fit at {} in a history of {} controls",
                window.xs.len(),
                window.us.len(),
                start,
                self.us.len()
            ))
            .log());
        }
        if p.len() != self.p.len() {
            return Err(TrackError::SpliceMismatch(format!(
                "parameter vector has length {}, history holds {}",
                p.len(),
                self.p.len()
            ))
            .log());
        }

        for (slot, x) in self.xs[start..].iter_mut().zip(window.xs) {
            *slot = x;
        }
        for (slot, u) in self.us[start..].iter_mut().zip(window.us) {
            *slot = u;
        }
        self.p = p;
        Ok(())
    }

    /// Sorted estimate indices of the landmarks observed at states `[start, len)`.
    pub fn observed_landmarks(&self, start: usize) -> Vec<usize> {
        let mut seen: Vec<usize> = self
            .observations
            .iter()
            .skip(start)
            .flat_map(|list| list.iter().map(|o| o.landmark))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen
    }

    /// Whether every buffer has the length its role requires.
    pub fn is_consistent(&self) -> bool {
        let n = self.xs.len();
        self.ts.len() == n
            && self.true_xs.len() == n
            && self.odometry_xs.len() == n
            && self.observations.len() == n
            && self.us.len() + 1 == n
            && self.odometry.len() + 1 == n
            && self.p.len() == DISTURBANCE_DIM + 2 * self.world_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::LieGroup;

    fn history(steps: usize) -> TrackHistory {
        let mut history = TrackHistory::new(0.0, SE2::identity());
        for k in 1..=steps {
            let x = SE2::from_xy_angle(k as f64, 0.0, 0.0);
            history.push(
                k as f64 * 0.1,
                x.clone(),
                x.clone(),
                x,
                DVector::from_vec(vec![1.0, 0.0]),
            );
        }
        history
    }

    #[test]
    fn test_history_keeps_buffer_sizes_consistent() {
        let mut history = history(5);
        assert_eq!(history.len(), 6);
        assert_eq!(history.horizon(), 5);
        let index = history.add_landmark(7, Vector2::new(1.0, 2.0));
        history.observe(vec![LandmarkObservation {
            landmark: index,
            measurement: Vector2::new(0.5, 0.5),
        }]);
        assert!(history.is_consistent());
        assert_eq!(history.landmark(0), Some(Vector2::new(1.0, 2.0)));
        assert_eq!(history.estimate_index(7), Some(0));
        assert_eq!(history.world_id(0), Some(7));
        assert_eq!(history.observed_landmarks(5), vec![0]);
        assert!(history.observed_landmarks(0).len() == 1);
    }

    #[test]
    fn test_window_start_offsets() {
        let history = history(8);
        assert_eq!(history.window_start(None), 0);
        assert_eq!(history.window_start(Some(20)), 0);
        assert_eq!(history.window_start(Some(3)), 5);
    }

    #[test]
    fn test_window_splice_round_trip_preserves_prefix() -> TrackResult<()> {
        let mut history = history(6);
        let start = history.window_start(Some(4));
        let mut window = history.window(start)?;
        assert_eq!(window.xs.len(), 5);
        assert_eq!(window.us.len(), 4);

        window.us[0] = DVector::from_vec(vec![3.0, 0.5]);
        window.xs[4] = SE2::from_xy_angle(-1.0, -1.0, 1.0);
        let p = history.parameters().clone();
        history.splice(start, window, p)?;

        assert_eq!(history.us()[start], DVector::from_vec(vec![3.0, 0.5]));
        assert_eq!(history.us()[0], DVector::from_vec(vec![1.0, 0.0]));
        assert!(history.xs()[6].is_approx(&SE2::from_xy_angle(-1.0, -1.0, 1.0), 1e-12));
        assert!(history.is_consistent());
        Ok(())
    }

    #[test]
    fn test_splice_rejects_wrong_window_size() -> TrackResult<()> {
        let mut history = history(6);
        let window = history.window(3)?;
        let p = history.parameters().clone();
        let result = history.splice(2, window, p);
        assert!(matches!(result, Err(TrackError::SpliceMismatch(_))));
        Ok(())
    }
}
