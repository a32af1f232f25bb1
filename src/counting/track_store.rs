// src/counting/track_store.rs
//
// Per-track state for one session. Created on first sight of a valid track
// id and kept until the session ends: a track that disappears for a few
// frames and comes back under the same id resumes its old state.

use std::collections::HashMap;

use crate::types::{Point, TrackId};
use crate::zone::ZoneId;

/// Class label for tracks whose origin zone is not known yet.
pub const UNCLASSIFIED: i64 = -1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackState {
    /// Anchor position at the last speed sample
    pub last_position: Option<Point>,
    pub last_speed: Option<f64>,
    /// First entry zone the track was seen in. Never overwritten.
    pub entry_zone: Option<ZoneId>,
    /// Exit zone under which the track was counted, if any
    pub exit_zone: Option<ZoneId>,
    /// Latest membership result for the watched zone (occupancy mode)
    pub inside: bool,
}

#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: HashMap<TrackId, TrackState>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackState> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut TrackState> {
        self.tracks.get_mut(&id)
    }

    /// State for `id`, allocating a blank entry on first sight.
    pub fn state_mut(&mut self, id: TrackId) -> &mut TrackState {
        self.tracks.entry(id).or_default()
    }

    /// Class label to draw a track under: its entry zone, or `UNCLASSIFIED`.
    pub fn class_for(&self, id: TrackId) -> i64 {
        self.tracks
            .get(&id)
            .and_then(|s| s.entry_zone)
            .map(|z| z as i64)
            .unwrap_or(UNCLASSIFIED)
    }

    pub fn inside_count(&self) -> usize {
        self.tracks.values().filter(|s| s.inside).count()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// All tracks ordered by id.
    pub fn iter_sorted(&self) -> Vec<(TrackId, &TrackState)> {
        let mut all: Vec<(TrackId, &TrackState)> =
            self.tracks.iter().map(|(id, s)| (*id, s)).collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}
