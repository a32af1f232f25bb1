// src/pipeline/metrics.rs
//
// Run counters and timings, reported in logs and in the session summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_detections: Arc<AtomicU64>,
    pub detections_seen: Arc<AtomicU64>,
    pub untracked_detections: Arc<AtomicU64>,
    pub zone_hits: Arc<AtomicU64>,
    pub zone_entries: Arc<AtomicU64>,
    pub zone_exits: Arc<AtomicU64>,
    pub entry_claims: Arc<AtomicU64>,
    pub transitions_recorded: Arc<AtomicU64>,
    pub speed_samples: Arc<AtomicU64>,
    pub events_dropped: Arc<AtomicU64>,
    pub update_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_detections: Arc::new(AtomicU64::new(0)),
            detections_seen: Arc::new(AtomicU64::new(0)),
            untracked_detections: Arc::new(AtomicU64::new(0)),
            zone_hits: Arc::new(AtomicU64::new(0)),
            zone_entries: Arc::new(AtomicU64::new(0)),
            zone_exits: Arc::new(AtomicU64::new(0)),
            entry_claims: Arc::new(AtomicU64::new(0)),
            transitions_recorded: Arc::new(AtomicU64::new(0)),
            speed_samples: Arc::new(AtomicU64::new(0)),
            events_dropped: Arc::new(AtomicU64::new(0)),
            update_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set(&self, counter: &AtomicU64, value: u64) {
        counter.store(value, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let update_us = self.update_time_us.load(Ordering::Relaxed);
        MetricsSummary {
            total_frames: frames,
            frames_with_detections: self.frames_with_detections.load(Ordering::Relaxed),
            detections_seen: self.detections_seen.load(Ordering::Relaxed),
            untracked_detections: self.untracked_detections.load(Ordering::Relaxed),
            zone_hits: self.zone_hits.load(Ordering::Relaxed),
            zone_entries: self.zone_entries.load(Ordering::Relaxed),
            zone_exits: self.zone_exits.load(Ordering::Relaxed),
            entry_claims: self.entry_claims.load(Ordering::Relaxed),
            transitions_recorded: self.transitions_recorded.load(Ordering::Relaxed),
            speed_samples: self.speed_samples.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            avg_update_us: if frames > 0 { update_us / frames } else { 0 },
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub frames_with_detections: u64,
    pub detections_seen: u64,
    pub untracked_detections: u64,
    pub zone_hits: u64,
    pub zone_entries: u64,
    pub zone_exits: u64,
    pub entry_claims: u64,
    pub transitions_recorded: u64,
    pub speed_samples: u64,
    pub events_dropped: u64,
    pub avg_update_us: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}
