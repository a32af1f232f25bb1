// src/results.rs
//
// Result files per processed input:
//   <stem>_counts.jsonl   one event (and optionally one overlay) per line
//   <stem>_summary.json   final counts, speeds and run metrics

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::counting::{to_kmh, CountingEngine};
use crate::overlay::FrameOverlay;
use crate::pipeline::metrics::MetricsSummary;
use crate::pipeline::PipelineEvent;
use crate::types::{SessionConfig, TrackId};
use crate::zone::{CountingModeKind, ZoneId, ZoneSet};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ResultLine<'a> {
    Event(&'a PipelineEvent),
    Overlay(&'a FrameOverlay),
}

pub struct ResultsWriter {
    out: BufWriter<File>,
    path: PathBuf,
    write_events: bool,
    write_overlays: bool,
    lines_written: u64,
}

impl ResultsWriter {
    pub fn create(
        output_dir: &Path,
        stem: &str,
        write_events: bool,
        write_overlays: bool,
    ) -> Result<Self> {
        std::fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;
        let path = output_dir.join(format!("{}_counts.jsonl", stem));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        info!("💾 Results will be written to: {}", path.display());

        Ok(Self {
            out: BufWriter::new(file),
            path,
            write_events,
            write_overlays,
            lines_written: 0,
        })
    }

    pub fn write_events(&mut self, events: &[PipelineEvent]) -> Result<()> {
        if !self.write_events {
            return Ok(());
        }
        for event in events {
            self.write_line(&ResultLine::Event(event))?;
        }
        Ok(())
    }

    pub fn write_overlay(&mut self, overlay: &FrameOverlay) -> Result<()> {
        if !self.write_overlays {
            return Ok(());
        }
        self.write_line(&ResultLine::Overlay(overlay))
    }

    fn write_line(&mut self, line: &ResultLine<'_>) -> Result<()> {
        let json_line = serde_json::to_string(line)?;
        writeln!(self.out, "{}", json_line)?;
        self.lines_written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.out
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        info!("💾 {} result lines written to {}", self.lines_written(), self.path.display());
        Ok(self.path)
    }
}

// ============================================================================
// SESSION SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TransitionCell {
    pub exit_zone: ZoneId,
    pub exit_name: String,
    pub entry_zone: ZoneId,
    pub entry_name: String,
    pub count: usize,
    pub track_ids: Vec<TrackId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackSpeed {
    pub track_id: TrackId,
    pub speed_mps: f64,
    pub speed_kmh: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: String,
    pub source: String,
    pub mode: CountingModeKind,
    pub frame_rate: f64,
    pub scale_m_per_px: f64,
    pub speed_sample_interval: u64,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub tracks_seen: usize,
    pub occupancy: Option<usize>,
    pub transitions: Vec<TransitionCell>,
    pub total_transitions: usize,
    pub speeds: Vec<TrackSpeed>,
    pub metrics: MetricsSummary,
}

impl SessionSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        session_id: String,
        started_at: String,
        source: &Path,
        session: &SessionConfig,
        frame_rate: f64,
        zones: &ZoneSet,
        engine: &CountingEngine,
        metrics: MetricsSummary,
    ) -> Self {
        let transitions: Vec<TransitionCell> = engine
            .transitions()
            .map(|matrix| {
                matrix
                    .iter()
                    .flat_map(|(exit_id, row)| {
                        row.iter().map(move |(entry_id, ids)| TransitionCell {
                            exit_zone: *exit_id,
                            exit_name: zones.exit_name(*exit_id),
                            entry_zone: *entry_id,
                            entry_name: zones.entry_name(*entry_id),
                            count: ids.len(),
                            track_ids: ids.iter().copied().collect(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let total_transitions = transitions.iter().map(|c| c.count).sum();

        let speeds = engine
            .store()
            .iter_sorted()
            .into_iter()
            .filter_map(|(id, state)| {
                state.last_speed.map(|mps| TrackSpeed {
                    track_id: id,
                    speed_mps: mps,
                    speed_kmh: to_kmh(mps),
                })
            })
            .collect();

        Self {
            session_id,
            started_at,
            source: source.display().to_string(),
            mode: engine.mode_kind(),
            frame_rate,
            scale_m_per_px: session.scale_m_per_px,
            speed_sample_interval: session.speed_sample_interval,
            confidence_threshold: session.confidence_threshold,
            iou_threshold: session.iou_threshold,
            tracks_seen: engine.store().len(),
            occupancy: engine.occupancy_count(),
            transitions,
            total_transitions,
            speeds,
            metrics,
        }
    }

    pub fn save(&self, output_dir: &Path, stem: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(format!("{}_summary.json", stem));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write summary {}", path.display()))?;
        info!("💾 Session summary saved to {}", path.display());
        Ok(path)
    }
}
