// src/counting/occupancy.rs
//
// Single-zone presence counting. The stored `inside` flag is the source of
// truth: the count only moves on a false→true or true→false flip, so tracks
// that flicker at the zone edge never inflate it.

use std::collections::HashSet;

use tracing::debug;

use super::track_store::TrackStore;
use super::CountEvent;
use crate::types::{Detection, TrackId};
use crate::zone::ZoneId;

pub struct OccupancyCounter {
    zone_id: ZoneId,
    count_inside: usize,
    events: Vec<CountEvent>,
}

impl OccupancyCounter {
    pub fn new(zone_id: ZoneId) -> Self {
        Self {
            zone_id,
            count_inside: 0,
            events: Vec::new(),
        }
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone_id
    }

    pub fn count_inside(&self) -> usize {
        self.count_inside
    }

    /// Applies one frame of membership results and returns the detections
    /// currently inside the zone, relabelled with the zone id.
    pub fn update(
        &mut self,
        store: &mut TrackStore,
        all: &[Detection],
        in_zone: &[Detection],
    ) -> Vec<Detection> {
        let inside_ids: HashSet<TrackId> = in_zone.iter().filter_map(|d| d.tracked_id()).collect();

        for id in in_zone.iter().filter_map(|d| d.tracked_id()) {
            let state = store.state_mut(id);
            if !state.inside {
                state.inside = true;
                self.count_inside += 1;
                debug!("Track {} entered zone {} (inside={})", id, self.zone_id, self.count_inside);
                self.events.push(CountEvent::ZoneEntered {
                    track_id: id,
                    zone_id: self.zone_id,
                });
            }
        }

        for id in all.iter().filter_map(|d| d.tracked_id()) {
            if inside_ids.contains(&id) {
                continue;
            }
            // First sight outside the zone records the track with no count change
            let state = store.state_mut(id);
            if state.inside {
                state.inside = false;
                self.count_inside = self.count_inside.saturating_sub(1);
                debug!("Track {} left zone {} (inside={})", id, self.zone_id, self.count_inside);
                self.events.push(CountEvent::ZoneExited {
                    track_id: id,
                    zone_id: self.zone_id,
                });
            }
        }
        debug_assert_eq!(self.count_inside, store.inside_count());

        all.iter()
            .filter(|d| {
                d.tracked_id()
                    .and_then(|id| store.get(id))
                    .map(|s| s.inside)
                    .unwrap_or(false)
            })
            .map(|d| Detection {
                class_id: self.zone_id as i64,
                ..d.clone()
            })
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<CountEvent> {
        std::mem::take(&mut self.events)
    }
}
