// src/pipeline/orchestrator.rs
//
// Drives one detection stream through the counting engine:
//
//   source task ──mpsc──▶ OrderedApply ──▶ oracle per zone ──▶ CountingEngine
//                                                     │
//                      ResultsWriter ◀── EventBus ◀───┴──▶ OverlayBuilder
//
// Frames are applied strictly in stream order. A stop request is only
// honoured between frames, so a frame is either fully applied or not at all.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::ordered_apply::{OrderedApply, Sequenced};
use super::{EventBus, FrameContext, PipelineEvent, PipelineMetrics};
use crate::counting::{CountEvent, CountingEngine, SpeedEstimator};
use crate::membership::MembershipOracle;
use crate::overlay::{FrameOverlay, OverlayBuilder};
use crate::results::ResultsWriter;
use crate::types::{Frame, SessionConfig};
use crate::zone::{Anchor, ZoneSet};

const EVENT_BUS_CAPACITY: usize = 1024;
const PROGRESS_EVERY_FRAMES: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub frames_applied: u64,
    pub stopped: bool,
}

pub struct PipelineOrchestrator<O: MembershipOracle> {
    zones: ZoneSet,
    oracle: O,
    engine: CountingEngine,
    overlay: OverlayBuilder,
    bus: EventBus,
    metrics: PipelineMetrics,
    frame_rate: f64,
    anchor: Anchor,
}

impl<O: MembershipOracle> PipelineOrchestrator<O> {
    pub fn new(zones: ZoneSet, oracle: O, session: &SessionConfig, frame_rate: f64) -> Self {
        let speed = SpeedEstimator::new(
            frame_rate,
            session.scale_m_per_px,
            session.speed_sample_interval,
        );
        let engine = CountingEngine::for_mode(zones.mode(), speed);
        let overlay = OverlayBuilder::new(&zones);
        let anchor = zones
            .entry
            .first()
            .map(|z| z.anchor())
            .unwrap_or_default();

        info!(
            "✓ Counting engine ready: mode={:?}, {:.1} FPS, scale={} m/px, sample every {} frames",
            engine.mode_kind(),
            frame_rate,
            session.scale_m_per_px,
            session.speed_sample_interval
        );

        Self {
            zones,
            oracle,
            engine,
            overlay,
            bus: EventBus::new(EVENT_BUS_CAPACITY),
            metrics: PipelineMetrics::new(),
            frame_rate,
            anchor,
        }
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    pub fn engine(&self) -> &CountingEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        self.bus.drain()
    }

    /// Applies one frame to the engine. Events land on the bus; the caller
    /// drains them.
    pub fn process_frame(&mut self, frame: Frame) -> (FrameContext, FrameOverlay) {
        let mut ctx = FrameContext::new(frame, self.frame_rate);

        self.metrics.inc(&self.metrics.total_frames);
        if ctx.has_detections() {
            self.metrics.inc(&self.metrics.frames_with_detections);
        }
        self.metrics
            .add(&self.metrics.detections_seen, ctx.total_detections() as u64);
        self.metrics
            .add(&self.metrics.untracked_detections, ctx.untracked.len() as u64);

        ctx.entry_hits = self
            .zones
            .entry
            .iter()
            .map(|z| self.oracle.trigger(&ctx.detections, z))
            .collect();
        ctx.exit_hits = self
            .zones
            .exit
            .iter()
            .map(|z| self.oracle.trigger(&ctx.detections, z))
            .collect();
        self.metrics
            .add(&self.metrics.zone_hits, ctx.zone_hit_count() as u64);

        let started = Instant::now();
        ctx.counted = self
            .engine
            .update(&ctx.detections, &ctx.entry_hits, &ctx.exit_hits);
        let anchor = self.anchor;
        ctx.speed_samples =
            self.engine
                .sample_speeds(ctx.frame_id, &ctx.detections, |d| anchor.point(&d.bbox));
        self.metrics.add(
            &self.metrics.update_time_us,
            started.elapsed().as_micros() as u64,
        );

        let events = self.engine.drain_events();
        for event in &events {
            self.record_event(event);
        }
        self.bus.publish_all(ctx.frame_id, ctx.timestamp_ms, events);
        self.metrics
            .set(&self.metrics.events_dropped, self.bus.dropped_count());

        if ctx.speed_samples > 0 {
            debug!(
                "Frame {}: sampled {} track position(s)",
                ctx.frame_id, ctx.speed_samples
            );
        }

        let overlay = self
            .overlay
            .build(ctx.frame_id, &self.engine, &ctx.counted, &ctx.untracked);

        (ctx, overlay)
    }

    fn record_event(&self, event: &CountEvent) {
        let m = &self.metrics;
        match event {
            CountEvent::ZoneEntered { .. } => m.inc(&m.zone_entries),
            CountEvent::ZoneExited { .. } => m.inc(&m.zone_exits),
            CountEvent::EntryClaimed { .. } => m.inc(&m.entry_claims),
            CountEvent::TransitionRecorded { .. } => m.inc(&m.transitions_recorded),
            CountEvent::SpeedSampled { .. } => m.inc(&m.speed_samples),
        }
    }

    /// Consumes sequenced frames until the channel closes or `stop` is set.
    pub async fn run(
        &mut self,
        mut rx: mpsc::Receiver<Sequenced<Frame>>,
        writer: &mut ResultsWriter,
        stop: &AtomicBool,
    ) -> Result<RunOutcome> {
        let mut ordered = OrderedApply::new();
        let mut applied = 0u64;

        while let Some(Sequenced { seq, item }) = rx.recv().await {
            for frame in ordered.push(seq, item) {
                if stop.load(Ordering::Relaxed) {
                    warn!("Stop requested, halting after {} frames", applied);
                    return Ok(RunOutcome {
                        frames_applied: applied,
                        stopped: true,
                    });
                }

                let (ctx, overlay) = self.process_frame(frame);
                writer.write_events(&self.drain_events())?;
                writer.write_overlay(&overlay)?;
                applied += 1;

                if applied % PROGRESS_EVERY_FRAMES == 0 {
                    self.log_progress(ctx.frame_id);
                }
            }
        }

        if ordered.pending_len() > 0 {
            warn!(
                "{} frame(s) never became applicable (gap at sequence {})",
                ordered.pending_len(),
                ordered.next_seq()
            );
        }

        debug!("Frame channel closed after {} frames", applied);
        Ok(RunOutcome {
            frames_applied: applied,
            stopped: false,
        })
    }

    fn log_progress(&self, frame_id: u64) {
        let tracks = self.engine.store().len();
        match (self.engine.occupancy_count(), self.engine.transition_total()) {
            (Some(inside), _) => info!(
                "Frame {}: {} inside zone, {} tracks seen ({:.1} FPS)",
                frame_id,
                inside,
                tracks,
                self.metrics.fps()
            ),
            (None, Some(total)) => info!(
                "Frame {}: {} transitions, {} tracks seen ({:.1} FPS)",
                frame_id,
                total,
                tracks,
                self.metrics.fps()
            ),
            (None, None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::PolygonOracle;
    use crate::types::{BBox, Detection, TrackId, ZoneSpec, ZonesConfig};

    fn square(cx: f32, cy: f32) -> Vec<[f32; 2]> {
        vec![
            [cx - 10.0, cy - 10.0],
            [cx + 10.0, cy - 10.0],
            [cx + 10.0, cy + 10.0],
            [cx - 10.0, cy + 10.0],
        ]
    }

    fn zones(with_exit: bool) -> ZoneSet {
        let spec = |x: f32| ZoneSpec {
            name: None,
            polygon: square(x, 50.0),
        };
        ZoneSet::from_config(&ZonesConfig {
            anchor: Anchor::Center,
            entry: vec![spec(50.0)],
            exit: if with_exit { vec![spec(300.0)] } else { vec![] },
        })
        .unwrap()
    }

    fn at(id: i64, x: f32) -> Detection {
        Detection::new(id, BBox::new(x - 2.0, 48.0, x + 2.0, 52.0))
    }

    fn frame(index: u64, dets: Vec<Detection>) -> Frame {
        Frame {
            index,
            detections: dets,
        }
    }

    fn orchestrator(with_exit: bool) -> PipelineOrchestrator<PolygonOracle> {
        PipelineOrchestrator::new(zones(with_exit), PolygonOracle, &SessionConfig::default(), 30.0)
    }

    #[test]
    fn test_process_frame_counts_and_publishes() {
        let mut orch = orchestrator(true);

        let (ctx, _) = orch.process_frame(frame(1, vec![at(1, 50.0), at(-1, 50.0)]));
        assert_eq!(ctx.untracked.len(), 1);
        assert_eq!(ctx.entry_hits[0].len(), 1);
        assert_eq!(ctx.counted.len(), 1);

        let (_, overlay) = orch.process_frame(frame(2, vec![at(1, 300.0)]));
        assert_eq!(overlay.texts.len(), 1);
        assert_eq!(overlay.texts[0].text, "1");

        let events = orch.drain_events();
        assert!(events.iter().any(|e| matches!(
            e.event,
            CountEvent::TransitionRecorded { track_id: TrackId(1), .. }
        )));
        assert_eq!(events.last().map(|e| e.frame_id), Some(2));

        let summary = orch.metrics().summary();
        assert_eq!(summary.total_frames, 2);
        assert_eq!(summary.untracked_detections, 1);
        assert_eq!(summary.entry_claims, 1);
        assert_eq!(summary.transitions_recorded, 1);
    }

    #[tokio::test]
    async fn test_run_applies_out_of_order_frames_in_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultsWriter::create(dir.path(), "run", true, false).unwrap();
        let mut orch = orchestrator(false);
        let stop = AtomicBool::new(false);

        let (tx, rx) = mpsc::channel(8);
        // Seq 1 (outside) arrives before seq 0 (inside); applied in order
        // the track ends up outside.
        tx.send(Sequenced { seq: 1, item: frame(2, vec![at(1, 300.0)]) }).await.unwrap();
        tx.send(Sequenced { seq: 0, item: frame(1, vec![at(1, 50.0)]) }).await.unwrap();
        tx.send(Sequenced { seq: 2, item: frame(3, vec![]) }).await.unwrap();
        drop(tx);

        let outcome = orch.run(rx, &mut writer, &stop).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome {
                frames_applied: 3,
                stopped: false
            }
        );
        assert_eq!(orch.engine().occupancy_count(), Some(0));

        let path = writer.finish().unwrap();
        let lines: Vec<serde_json::Value> = std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let types: Vec<_> = lines.iter().map(|l| l["type"].as_str().unwrap().to_string()).collect();
        assert_eq!(types, vec!["zone_entered", "zone_exited"]);
        assert_eq!(lines[0]["frame_id"], 1);
        assert_eq!(lines[1]["frame_id"], 2);
    }

    #[tokio::test]
    async fn test_run_honours_stop_between_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultsWriter::create(dir.path(), "stop", true, false).unwrap();
        let mut orch = orchestrator(false);
        let stop = AtomicBool::new(true);

        let (tx, rx) = mpsc::channel(4);
        tx.send(Sequenced { seq: 0, item: frame(1, vec![at(1, 50.0)]) }).await.unwrap();
        drop(tx);

        let outcome = orch.run(rx, &mut writer, &stop).await.unwrap();
        assert!(outcome.stopped);
        assert_eq!(outcome.frames_applied, 0);
        assert!(orch.engine().store().is_empty());
    }
}
