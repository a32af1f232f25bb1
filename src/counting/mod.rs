// src/counting/mod.rs
//
// Zone-transition counting engine.
//
// Signal flow per frame:
//   tracked detections ─┬→ occupancy (single zone)  ─┐
//   zone hits (oracle) ─┴→ transition (entry→exit) ──┼→ filtered, relabelled detections
//   sampling frames    ───→ speed estimator ─────────┘
//
// All mutable per-track state lives in one TrackStore owned by the engine
// and lent to each counter for the duration of a call. Updates are total:
// nothing in here can fail.

pub mod occupancy;
pub mod speed;
pub mod track_store;
pub mod transition;

pub use occupancy::OccupancyCounter;
pub use speed::{to_kmh, SpeedEstimator};
pub use track_store::{TrackState, TrackStore, UNCLASSIFIED};
pub use transition::{TransitionCounter, TransitionMatrix};

use serde::Serialize;

use crate::types::{Detection, Point, TrackId};
use crate::zone::{CountingModeKind, ZoneId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CountEvent {
    ZoneEntered {
        track_id: TrackId,
        zone_id: ZoneId,
    },
    ZoneExited {
        track_id: TrackId,
        zone_id: ZoneId,
    },
    EntryClaimed {
        track_id: TrackId,
        entry_zone: ZoneId,
    },
    TransitionRecorded {
        track_id: TrackId,
        entry_zone: ZoneId,
        exit_zone: ZoneId,
    },
    SpeedSampled {
        track_id: TrackId,
        speed_mps: f64,
    },
}

pub enum CountingMode {
    Occupancy(OccupancyCounter),
    Transition(TransitionCounter),
}

pub struct CountingEngine {
    store: TrackStore,
    mode: CountingMode,
    speed: SpeedEstimator,
    events: Vec<CountEvent>,
}

impl CountingEngine {
    pub fn occupancy(zone_id: ZoneId, speed: SpeedEstimator) -> Self {
        Self::with_mode(CountingMode::Occupancy(OccupancyCounter::new(zone_id)), speed)
    }

    pub fn transition(speed: SpeedEstimator) -> Self {
        Self::with_mode(CountingMode::Transition(TransitionCounter::new()), speed)
    }

    pub fn for_mode(kind: CountingModeKind, speed: SpeedEstimator) -> Self {
        match kind {
            CountingModeKind::Occupancy => Self::occupancy(0, speed),
            CountingModeKind::Transition => Self::transition(speed),
        }
    }

    fn with_mode(mode: CountingMode, speed: SpeedEstimator) -> Self {
        Self {
            store: TrackStore::new(),
            mode,
            speed,
            events: Vec::new(),
        }
    }

    pub fn mode_kind(&self) -> CountingModeKind {
        match self.mode {
            CountingMode::Occupancy(_) => CountingModeKind::Occupancy,
            CountingMode::Transition(_) => CountingModeKind::Transition,
        }
    }

    /// Applies one frame. `entry_hits[i]` / `exit_hits[j]` are the oracle
    /// results for entry zone i / exit zone j. In occupancy mode only
    /// `entry_hits[0]` is read. Untracked detections are ignored.
    pub fn update(
        &mut self,
        all: &[Detection],
        entry_hits: &[Vec<Detection>],
        exit_hits: &[Vec<Detection>],
    ) -> Vec<Detection> {
        let tracked = only_tracked(all);

        match &mut self.mode {
            CountingMode::Occupancy(counter) => {
                let in_zone = entry_hits
                    .get(counter.zone_id())
                    .map(|hits| only_tracked(hits))
                    .unwrap_or_default();
                let out = counter.update(&mut self.store, &tracked, &in_zone);
                self.events.extend(counter.drain_events());
                out
            }
            CountingMode::Transition(counter) => {
                let ins: Vec<Vec<Detection>> = entry_hits.iter().map(|h| only_tracked(h)).collect();
                let outs: Vec<Vec<Detection>> = exit_hits.iter().map(|h| only_tracked(h)).collect();
                let out = counter.update(&mut self.store, &tracked, &ins, &outs);
                self.events.extend(counter.drain_events());
                out
            }
        }
    }

    /// Samples the anchor of every tracked detection when `frame_index` is a
    /// sampling frame. Returns how many tracks were sampled.
    pub fn sample_speeds(
        &mut self,
        frame_index: u64,
        detections: &[Detection],
        anchor: impl Fn(&Detection) -> Point,
    ) -> usize {
        if !self.speed.is_sampling_frame(frame_index) {
            return 0;
        }

        let mut sampled = 0;
        for det in detections {
            let Some(id) = det.tracked_id() else {
                continue;
            };
            let had_position = self
                .store
                .get(id)
                .map(|s| s.last_position.is_some())
                .unwrap_or(false);
            let speed_mps = self.speed.sample(&mut self.store, id, anchor(det));
            if had_position {
                self.events.push(CountEvent::SpeedSampled {
                    track_id: id,
                    speed_mps,
                });
            }
            sampled += 1;
        }
        sampled
    }

    pub fn occupancy_count(&self) -> Option<usize> {
        match &self.mode {
            CountingMode::Occupancy(counter) => Some(counter.count_inside()),
            CountingMode::Transition(_) => None,
        }
    }

    pub fn transitions(&self) -> Option<&TransitionMatrix> {
        match &self.mode {
            CountingMode::Occupancy(_) => None,
            CountingMode::Transition(counter) => Some(counter.counts()),
        }
    }

    /// Distinct tracks recorded across all transition cells.
    pub fn transition_total(&self) -> Option<usize> {
        match &self.mode {
            CountingMode::Occupancy(_) => None,
            CountingMode::Transition(counter) => Some(counter.total()),
        }
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn drain_events(&mut self) -> Vec<CountEvent> {
        std::mem::take(&mut self.events)
    }
}

fn only_tracked(detections: &[Detection]) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.tracked_id().is_some())
        .cloned()
        .collect()
}
