// src/counting/transition.rs
//
// Directional entry→exit counting.
//
//   1. Entry claim:  first entry zone a track is seen in wins, forever.
//   2. Exit resolve: a track with a known entry that shows up in an exit
//                    zone is added to matrix[exit][entry]. Sets keep this
//                    idempotent across frames; a track already counted
//                    under one exit is never counted under another.
//   3. Relabel:      output detections carry their entry zone as class;
//                    tracks with no entry yet are dropped.
//
// Zones are walked in configuration order, so overlapping polygons resolve
// to the lowest zone id deterministically.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::track_store::{TrackStore, UNCLASSIFIED};
use super::CountEvent;
use crate::types::{Detection, TrackId};
use crate::zone::ZoneId;

/// exit zone → entry zone → distinct tracks
pub type TransitionMatrix = BTreeMap<ZoneId, BTreeMap<ZoneId, BTreeSet<TrackId>>>;

#[derive(Default)]
pub struct TransitionCounter {
    counts: TransitionMatrix,
    events: Vec<CountEvent>,
}

impl TransitionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        store: &mut TrackStore,
        all: &[Detection],
        in_zones: &[Vec<Detection>],
        out_zones: &[Vec<Detection>],
    ) -> Vec<Detection> {
        for (zone_in_id, hits) in in_zones.iter().enumerate() {
            for id in hits.iter().filter_map(|d| d.tracked_id()) {
                let state = store.state_mut(id);
                if state.entry_zone.is_none() {
                    state.entry_zone = Some(zone_in_id);
                    debug!("Track {} claimed entry zone {}", id, zone_in_id);
                    self.events.push(CountEvent::EntryClaimed {
                        track_id: id,
                        entry_zone: zone_in_id,
                    });
                }
            }
        }

        for (zone_out_id, hits) in out_zones.iter().enumerate() {
            for id in hits.iter().filter_map(|d| d.tracked_id()) {
                let Some(state) = store.get_mut(id) else {
                    continue;
                };
                let Some(zone_in_id) = state.entry_zone else {
                    continue;
                };
                if state.exit_zone.is_some() {
                    continue;
                }
                state.exit_zone = Some(zone_out_id);

                let inserted = self
                    .counts
                    .entry(zone_out_id)
                    .or_default()
                    .entry(zone_in_id)
                    .or_default()
                    .insert(id);
                if inserted {
                    info!(
                        "Track {} counted: entry {} → exit {} (cell total {})",
                        id,
                        zone_in_id,
                        zone_out_id,
                        self.count(zone_out_id, zone_in_id)
                    );
                    self.events.push(CountEvent::TransitionRecorded {
                        track_id: id,
                        entry_zone: zone_in_id,
                        exit_zone: zone_out_id,
                    });
                }
            }
        }

        relabel_by_entry(store, all)
    }

    pub fn counts(&self) -> &TransitionMatrix {
        &self.counts
    }

    pub fn count(&self, exit: ZoneId, entry: ZoneId) -> usize {
        self.counts
            .get(&exit)
            .and_then(|row| row.get(&entry))
            .map(|set| set.len())
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts
            .values()
            .flat_map(|row| row.values())
            .map(|set| set.len())
            .sum()
    }

    pub fn drain_events(&mut self) -> Vec<CountEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Keeps detections whose track has an entry zone, with that zone as class.
pub fn relabel_by_entry(store: &TrackStore, detections: &[Detection]) -> Vec<Detection> {
    detections
        .iter()
        .filter_map(|d| {
            let class_id = store.class_for(d.tracked_id()?);
            (class_id != UNCLASSIFIED).then(|| Detection {
                class_id,
                ..d.clone()
            })
        })
        .collect()
}
