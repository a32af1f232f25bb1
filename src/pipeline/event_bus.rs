// src/pipeline/event_bus.rs
//
// Counting events queued per frame for the results writer. Bounded: when
// the consumer falls behind, the oldest events are dropped.

use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

use crate::counting::CountEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEvent {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    #[serde(flatten)]
    pub event: CountEvent,
}

pub struct EventBus {
    events: VecDeque<PipelineEvent>,
    max_pending: usize,
    dropped: u64,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending: max_pending.max(1),
            dropped: 0,
        }
    }

    pub fn publish(&mut self, event: PipelineEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    pub fn publish_all(&mut self, frame_id: u64, timestamp_ms: f64, events: Vec<CountEvent>) {
        for event in events {
            self.publish(PipelineEvent {
                frame_id,
                timestamp_ms,
                event,
            });
        }
    }

    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        self.events.drain(..).collect()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrackId;

    fn entered(id: u64) -> CountEvent {
        CountEvent::ZoneEntered {
            track_id: TrackId(id),
            zone_id: 0,
        }
    }

    #[test]
    fn test_drops_oldest_when_full() {
        let mut bus = EventBus::new(2);
        bus.publish_all(1, 33.3, vec![entered(1), entered(2), entered(3)]);
        assert_eq!(bus.dropped_count(), 1);

        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].event, entered(2));
        assert_eq!(drained[1].event, entered(3));
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_event_serialises_flat() {
        let event = PipelineEvent {
            frame_id: 10,
            timestamp_ms: 333.0,
            event: CountEvent::TransitionRecorded {
                track_id: TrackId(7),
                entry_zone: 1,
                exit_zone: 2,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transition_recorded");
        assert_eq!(json["frame_id"], 10);
        assert_eq!(json["track_id"], 7);
        assert_eq!(json["entry_zone"], 1);
        assert_eq!(json["exit_zone"], 2);
    }
}
