// src/counting/speed.rs
//
// Sampled speed estimate. Positions are taken every `sample_interval`
// frames, so a displacement spans that many frames:
//
//   speed = |Δp|_px × scale × fps / sample_interval
//
// No plausibility clamping happens here; consumers decide what to trust.

use tracing::debug;

use super::track_store::TrackStore;
use crate::types::{Point, TrackId};

#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    frame_rate: f64,
    scale_m_per_px: f64,
    sample_interval: u64,
}

impl SpeedEstimator {
    pub fn new(frame_rate: f64, scale_m_per_px: f64, sample_interval: u64) -> Self {
        Self {
            frame_rate,
            scale_m_per_px,
            sample_interval: sample_interval.max(1),
        }
    }

    /// Frames 1, 1 + K, 1 + 2K, ... (1-based indices).
    pub fn is_sampling_frame(&self, frame_index: u64) -> bool {
        frame_index >= 1 && (frame_index - 1) % self.sample_interval == 0
    }

    /// Records `position` for `id` and returns the speed in m/s since the
    /// previous sample. The first sample of a track returns 0.
    pub fn sample(&self, store: &mut TrackStore, id: TrackId, position: Point) -> f64 {
        let state = store.state_mut(id);
        let Some(previous) = state.last_position.replace(position) else {
            return 0.0;
        };

        let distance_px = previous.distance(&position);
        let distance_m = distance_px * self.scale_m_per_px;
        let speed = distance_m * self.frame_rate / self.sample_interval as f64;
        state.last_speed = Some(speed);

        debug!(
            "Track {} moved {:.1}px → {:.2} m/s ({:.1} km/h)",
            id,
            distance_px,
            speed,
            to_kmh(speed)
        );
        speed
    }
}

pub fn to_kmh(speed_mps: f64) -> f64 {
    speed_mps * 3.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_start_then_rate() {
        let estimator = SpeedEstimator::new(30.0, 0.05, 10);
        let mut store = TrackStore::new();

        assert!(estimator.is_sampling_frame(1));
        let first = estimator.sample(&mut store, TrackId(1), Point::new(100.0, 100.0));
        assert_eq!(first, 0.0);
        assert_eq!(store.get(TrackId(1)).unwrap().last_speed, None);

        assert!(estimator.is_sampling_frame(11));
        let second = estimator.sample(&mut store, TrackId(1), Point::new(150.0, 100.0));
        assert!((second - 7.5).abs() < 1e-9);
        assert_eq!(
            store.get(TrackId(1)).unwrap().last_position,
            Some(Point::new(150.0, 100.0))
        );
    }

    #[test]
    fn test_sampling_cadence() {
        let estimator = SpeedEstimator::new(30.0, 0.05, 10);
        let sampled: Vec<u64> = (0..=25).filter(|&f| estimator.is_sampling_frame(f)).collect();
        assert_eq!(sampled, vec![1, 11, 21]);
    }

    #[test]
    fn test_zero_interval_treated_as_every_frame() {
        let estimator = SpeedEstimator::new(25.0, 1.0, 0);
        assert!(estimator.is_sampling_frame(1));
        assert!(estimator.is_sampling_frame(2));
    }

    #[test]
    fn test_diagonal_displacement() {
        let estimator = SpeedEstimator::new(10.0, 0.1, 5);
        let mut store = TrackStore::new();
        estimator.sample(&mut store, TrackId(3), Point::new(0.0, 0.0));
        // 3-4-5 triangle: 50px → 5m over 5 frames at 10fps → 10 m/s
        let speed = estimator.sample(&mut store, TrackId(3), Point::new(30.0, 40.0));
        assert!((speed - 10.0).abs() < 1e-9);
        assert!((to_kmh(speed) - 36.0).abs() < 1e-9);
    }
}
