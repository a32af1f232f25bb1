// src/overlay.rs
//
// Per-frame annotation description. No pixels are touched here: a renderer
// downstream draws exactly what this says (zone outlines, boxes, counts).

use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::counting::{CountingEngine, TransitionMatrix, UNCLASSIFIED};
use crate::types::{BBox, Detection, Point, TrackId};
use crate::zone::{Zone, ZoneId, ZoneKind, ZoneSet};

pub const PALETTE: [&str; 4] = ["#E6194B", "#3CB44B", "#FFE119", "#3C76D1"];
pub const UNTRACKED_COLOR: &str = "#808080";
pub const DEFAULT_CORNER_NAMES: [&str; 4] = ["North", "East", "South", "West"];

/// Vertical distance between stacked count labels, and from the zone centre
/// down to the occupancy label.
pub const TEXT_LINE_SPACING: f32 = 40.0;

/// Centre points kept per track, and frames a track may go unseen before
/// its trace is forgotten.
pub const TRACE_LENGTH: usize = 100;

pub fn palette_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

const CORNERS: [Corner; 4] = [
    Corner::TopLeft,
    Corner::TopRight,
    Corner::BottomRight,
    Corner::BottomLeft,
];

#[derive(Debug, Clone, Serialize)]
pub struct ZoneOutline {
    pub kind: ZoneKind,
    pub id: ZoneId,
    pub name: String,
    pub polygon: Vec<Point>,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxAnnotation {
    pub bbox: BBox,
    pub label: Option<String>,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextAnnotation {
    pub position: Point,
    pub text: String,
    pub color: &'static str,
}

/// Recent box centres of one track, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct TraceAnnotation {
    pub track_id: TrackId,
    pub points: Vec<Point>,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelCount {
    pub entry_zone: ZoneId,
    pub entry_name: String,
    pub count: usize,
    pub color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CornerPanel {
    pub corner: Corner,
    pub title: String,
    pub exit_zone: ZoneId,
    pub counts: Vec<PanelCount>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameOverlay {
    pub frame_id: u64,
    pub zones: Vec<ZoneOutline>,
    pub boxes: Vec<BoxAnnotation>,
    pub texts: Vec<TextAnnotation>,
    pub traces: Vec<TraceAnnotation>,
    pub panels: Vec<CornerPanel>,
}

struct Trace {
    points: VecDeque<Point>,
    last_frame: u64,
}

pub struct OverlayBuilder {
    outlines: Vec<ZoneOutline>,
    entry_centers: Vec<Point>,
    exit_centers: Vec<Point>,
    entry_names: Vec<String>,
    panel_titles: Vec<String>,
    traces: HashMap<TrackId, Trace>,
}

impl OverlayBuilder {
    pub fn new(zones: &ZoneSet) -> Self {
        let outlines = zones
            .entry
            .iter()
            .chain(zones.exit.iter())
            .map(outline)
            .collect();

        // Exit zones without a configured name pick up the compass defaults
        let panel_titles = zones
            .exit
            .iter()
            .take(CORNERS.len())
            .enumerate()
            .map(|(i, z)| {
                z.name()
                    .map(str::to_string)
                    .unwrap_or_else(|| DEFAULT_CORNER_NAMES[i].to_string())
            })
            .collect();

        Self {
            outlines,
            entry_centers: zones.entry.iter().map(Zone::center).collect(),
            exit_centers: zones.exit.iter().map(Zone::center).collect(),
            entry_names: zones.entry.iter().map(Zone::display_name).collect(),
            panel_titles,
            traces: HashMap::new(),
        }
    }

    /// `counted` are the engine's filtered, relabelled detections;
    /// `untracked` are detections the tracker gave no identity. Frames must
    /// be built in stream order since traces accumulate across calls.
    pub fn build(
        &mut self,
        frame_id: u64,
        engine: &CountingEngine,
        counted: &[Detection],
        untracked: &[Detection],
    ) -> FrameOverlay {
        let mut boxes: Vec<BoxAnnotation> = counted.iter().map(counted_box).collect();
        boxes.extend(untracked.iter().map(|d| BoxAnnotation {
            bbox: d.bbox,
            label: None,
            color: UNTRACKED_COLOR,
        }));

        let traces = self.update_traces(frame_id, counted);

        let (texts, panels) = match (engine.occupancy_count(), engine.transitions()) {
            (Some(count), _) => (self.occupancy_texts(count), Vec::new()),
            (None, Some(matrix)) => (self.transition_texts(matrix), self.panels(matrix)),
            (None, None) => (Vec::new(), Vec::new()),
        };

        FrameOverlay {
            frame_id,
            zones: self.outlines.clone(),
            boxes,
            texts,
            traces,
            panels,
        }
    }

    fn update_traces(&mut self, frame_id: u64, counted: &[Detection]) -> Vec<TraceAnnotation> {
        let mut out = Vec::new();
        for det in counted {
            let Some(id) = det.tracked_id() else {
                continue;
            };
            let trace = self.traces.entry(id).or_insert_with(|| Trace {
                points: VecDeque::with_capacity(TRACE_LENGTH),
                last_frame: frame_id,
            });
            if trace.points.len() == TRACE_LENGTH {
                trace.points.pop_front();
            }
            trace.points.push_back(det.bbox.center());
            trace.last_frame = frame_id;

            out.push(TraceAnnotation {
                track_id: id,
                points: trace.points.iter().copied().collect(),
                color: counted_color(det),
            });
        }

        self.traces
            .retain(|_, t| frame_id.saturating_sub(t.last_frame) <= TRACE_LENGTH as u64);
        out
    }

    fn occupancy_texts(&self, count: usize) -> Vec<TextAnnotation> {
        self.entry_centers
            .first()
            .map(|c| TextAnnotation {
                position: Point::new(c.x, c.y + TEXT_LINE_SPACING),
                text: format!("Count: {}", count),
                color: palette_color(0),
            })
            .into_iter()
            .collect()
    }

    fn transition_texts(&self, matrix: &TransitionMatrix) -> Vec<TextAnnotation> {
        let mut texts = Vec::new();
        for (exit_id, row) in matrix {
            let Some(center) = self.exit_centers.get(*exit_id) else {
                continue;
            };
            for (i, (entry_id, ids)) in row.iter().enumerate() {
                texts.push(TextAnnotation {
                    position: Point::new(center.x, center.y + TEXT_LINE_SPACING * i as f32),
                    text: ids.len().to_string(),
                    color: palette_color(*entry_id),
                });
            }
        }
        texts
    }

    fn panels(&self, matrix: &TransitionMatrix) -> Vec<CornerPanel> {
        self.panel_titles
            .iter()
            .zip(CORNERS)
            .enumerate()
            .map(|(exit_id, (title, corner))| {
                let counts = matrix
                    .get(&exit_id)
                    .map(|row| {
                        row.iter()
                            .map(|(entry_id, ids)| PanelCount {
                                entry_zone: *entry_id,
                                entry_name: self
                                    .entry_names
                                    .get(*entry_id)
                                    .cloned()
                                    .unwrap_or_else(|| format!("entry-{}", entry_id)),
                                count: ids.len(),
                                color: palette_color(*entry_id),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                CornerPanel {
                    corner,
                    title: title.clone(),
                    exit_zone: exit_id,
                    counts,
                }
            })
            .collect()
    }
}

fn outline(zone: &Zone) -> ZoneOutline {
    ZoneOutline {
        kind: zone.kind(),
        id: zone.id(),
        name: zone.display_name(),
        polygon: zone.polygon().to_vec(),
        color: palette_color(zone.id()),
    }
}

fn counted_color(det: &Detection) -> &'static str {
    if det.class_id == UNCLASSIFIED {
        UNTRACKED_COLOR
    } else {
        palette_color(det.class_id as usize)
    }
}

fn counted_box(det: &Detection) -> BoxAnnotation {
    BoxAnnotation {
        bbox: det.bbox,
        label: det.tracked_id().map(|id| id.to_string()),
        color: counted_color(det),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::SpeedEstimator;
    use crate::membership::{MembershipOracle, PolygonOracle};
    use crate::types::{ZoneSpec, ZonesConfig};
    use crate::zone::Anchor;

    fn square(cx: f32, cy: f32, half: f32) -> Vec<[f32; 2]> {
        vec![
            [cx - half, cy - half],
            [cx + half, cy - half],
            [cx + half, cy + half],
            [cx - half, cy + half],
        ]
    }

    fn zones(entries: usize, exits: usize) -> ZoneSet {
        let spec = |i: usize, y: f32| ZoneSpec {
            name: None,
            polygon: square(100.0 * (i as f32 + 1.0), y, 10.0),
        };
        ZoneSet::from_config(&ZonesConfig {
            anchor: Anchor::Center,
            entry: (0..entries).map(|i| spec(i, 100.0)).collect(),
            exit: (0..exits).map(|i| spec(i, 500.0)).collect(),
        })
        .unwrap()
    }

    fn at(id: i64, x: f32, y: f32) -> Detection {
        Detection::new(id, BBox::new(x - 2.0, y - 2.0, x + 2.0, y + 2.0))
    }

    fn step(engine: &mut CountingEngine, set: &ZoneSet, dets: &[Detection]) -> Vec<Detection> {
        let ins: Vec<_> = set.entry.iter().map(|z| PolygonOracle.trigger(dets, z)).collect();
        let outs: Vec<_> = set.exit.iter().map(|z| PolygonOracle.trigger(dets, z)).collect();
        engine.update(dets, &ins, &outs)
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(palette_color(0), "#E6194B");
        assert_eq!(palette_color(3), "#3C76D1");
        assert_eq!(palette_color(4), "#E6194B");
    }

    #[test]
    fn test_occupancy_overlay_draws_count_below_zone() {
        let set = zones(1, 0);
        let mut builder = OverlayBuilder::new(&set);
        let mut engine = CountingEngine::occupancy(0, SpeedEstimator::new(30.0, 0.05, 10));

        let dets = vec![at(4, 100.0, 100.0), at(5, 400.0, 400.0)];
        let counted = step(&mut engine, &set, &dets);
        let overlay = builder.build(1, &engine, &counted, &[at(-1, 0.0, 0.0)]);

        assert_eq!(overlay.zones.len(), 1);
        assert_eq!(overlay.texts.len(), 1);
        assert_eq!(overlay.texts[0].text, "Count: 1");
        assert_eq!(overlay.texts[0].position, Point::new(100.0, 140.0));
        assert!(overlay.panels.is_empty());

        assert_eq!(overlay.boxes.len(), 2);
        assert_eq!(overlay.boxes[0].label.as_deref(), Some("#4"));
        assert_eq!(overlay.boxes[0].color, "#E6194B");
        assert_eq!(overlay.boxes[1].label, None);
        assert_eq!(overlay.boxes[1].color, UNTRACKED_COLOR);
    }

    #[test]
    fn test_transition_overlay_stacks_counts_and_fills_panels() {
        let set = zones(2, 2);
        let mut builder = OverlayBuilder::new(&set);
        let mut engine = CountingEngine::transition(SpeedEstimator::new(30.0, 0.05, 10));

        // Track 1: entry 0 -> exit 1. Track 2: entry 1 -> exit 1.
        step(&mut engine, &set, &[at(1, 100.0, 100.0), at(2, 200.0, 100.0)]);
        let counted = step(&mut engine, &set, &[at(1, 200.0, 500.0), at(2, 200.0, 500.0)]);
        let overlay = builder.build(2, &engine, &counted, &[]);

        assert_eq!(overlay.zones.len(), 4);
        assert_eq!(overlay.texts.len(), 2);
        // First count on the exit centre, the next one line below
        assert_eq!(overlay.texts[0].position, Point::new(200.0, 500.0));
        assert_eq!(overlay.texts[0].color, palette_color(0));
        assert_eq!(overlay.texts[1].position, Point::new(200.0, 540.0));
        assert_eq!(overlay.texts[1].color, palette_color(1));

        assert_eq!(overlay.panels.len(), 2);
        assert_eq!(overlay.panels[0].title, "North");
        assert_eq!(overlay.panels[0].corner, Corner::TopLeft);
        assert!(overlay.panels[0].counts.is_empty());
        assert_eq!(overlay.panels[1].title, "East");
        assert_eq!(overlay.panels[1].counts.len(), 2);
        assert_eq!(overlay.panels[1].counts[0].count, 1);

        let colors: Vec<_> = overlay.boxes.iter().map(|b| b.color).collect();
        assert_eq!(colors, vec![palette_color(0), palette_color(1)]);
    }

    #[test]
    fn test_trace_is_capped_and_coloured_by_entry_zone() {
        let set = zones(2, 1);
        let mut builder = OverlayBuilder::new(&set);
        let mut engine = CountingEngine::transition(SpeedEstimator::new(30.0, 0.05, 10));

        // Track 7 is claimed by entry 1 and then drifts inside it
        let mut overlay = FrameOverlay::default();
        for frame in 1..=150u64 {
            let x = 195.0 + (frame % 10) as f32;
            let counted = step(&mut engine, &set, &[at(7, x, 100.0)]);
            overlay = builder.build(frame, &engine, &counted, &[]);
        }

        assert_eq!(overlay.traces.len(), 1);
        let trace = &overlay.traces[0];
        assert_eq!(trace.track_id, TrackId(7));
        assert_eq!(trace.points.len(), TRACE_LENGTH);
        assert_eq!(trace.color, palette_color(1));
        assert_eq!(trace.points.last(), Some(&Point::new(195.0, 100.0)));
    }

    #[test]
    fn test_trace_forgotten_after_track_disappears() {
        let set = zones(1, 1);
        let mut builder = OverlayBuilder::new(&set);
        let mut engine = CountingEngine::transition(SpeedEstimator::new(30.0, 0.05, 10));

        let counted = step(&mut engine, &set, &[at(3, 100.0, 100.0)]);
        assert_eq!(builder.build(1, &engine, &counted, &[]).traces[0].points.len(), 1);

        let gap = 2 + TRACE_LENGTH as u64;
        builder.build(gap, &engine, &[], &[]);
        let counted = step(&mut engine, &set, &[at(3, 100.0, 100.0)]);
        let overlay = builder.build(gap + 1, &engine, &counted, &[]);
        assert_eq!(overlay.traces[0].points.len(), 1);
    }
}
