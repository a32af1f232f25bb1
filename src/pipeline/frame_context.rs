// src/pipeline/frame_context.rs
//
// Everything known about one frame, from raw tracker output through zone
// hits to the detections handed on for drawing. Built fresh per frame so no
// stage reads another frame's leftovers.

use crate::types::{Detection, Frame};

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_id: u64,
    pub timestamp_ms: f64,

    // Tracker output, split by whether the tracker assigned an identity
    pub detections: Vec<Detection>,
    pub untracked: Vec<Detection>,

    // Oracle results, one list per configured zone, in zone order
    pub entry_hits: Vec<Vec<Detection>>,
    pub exit_hits: Vec<Vec<Detection>>,

    // Counting output
    pub counted: Vec<Detection>,
    pub speed_samples: usize,
}

impl FrameContext {
    pub fn new(frame: Frame, fps: f64) -> Self {
        let timestamp_ms = frame.timestamp_ms(fps);
        let (detections, untracked): (Vec<Detection>, Vec<Detection>) = frame
            .detections
            .into_iter()
            .partition(|d| d.tracked_id().is_some());
        Self {
            frame_id: frame.index,
            timestamp_ms,
            detections,
            untracked,
            entry_hits: Vec::new(),
            exit_hits: Vec::new(),
            counted: Vec::new(),
            speed_samples: 0,
        }
    }

    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty() || !self.untracked.is_empty()
    }

    pub fn total_detections(&self) -> usize {
        self.detections.len() + self.untracked.len()
    }

    pub fn zone_hit_count(&self) -> usize {
        self.entry_hits
            .iter()
            .chain(self.exit_hits.iter())
            .map(|h| h.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    #[test]
    fn test_splits_untracked() {
        let frame = Frame {
            index: 15,
            detections: vec![
                Detection::new(1, BBox::new(0.0, 0.0, 1.0, 1.0)),
                Detection::new(-1, BBox::new(0.0, 0.0, 1.0, 1.0)),
                Detection::new(2, BBox::new(0.0, 0.0, 1.0, 1.0)),
            ],
        };
        let ctx = FrameContext::new(frame, 30.0);
        assert_eq!(ctx.frame_id, 15);
        assert!((ctx.timestamp_ms - 500.0).abs() < 1e-9);
        assert_eq!(ctx.detections.len(), 2);
        assert_eq!(ctx.untracked.len(), 1);
        assert_eq!(ctx.total_detections(), 3);
        assert!(ctx.has_detections());
    }
}
