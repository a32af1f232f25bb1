// src/detection_source.rs
//
// Reads tracked detections written by the external detector + tracker, one
// JSON object per line. The optional first line carries video properties.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::pipeline::ordered_apply::Sequenced;
use crate::types::{Frame, FrameRecord, InputConfig, VideoInfo};

pub fn find_detection_files(input: &InputConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(&input.dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if input
                .extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            {
                files.push(path.to_path_buf());
            }
        }
    }

    files.sort();
    info!("Found {} detection files", files.len());
    Ok(files)
}

/// Anything that yields frames of tracked detections in stream order.
pub trait DetectionSource: Send {
    fn video_info(&self) -> Option<&VideoInfo>;
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn skipped_lines(&self) -> usize {
        0
    }
}

/// What the reader task saw once it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceReport {
    pub frames_sent: u64,
    pub skipped_lines: usize,
}

#[derive(Deserialize)]
struct Header {
    video_info: VideoInfo,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Line {
    Header(Header),
    Frame(FrameRecord),
}

pub struct DetectionReader {
    lines: Lines<BufReader<File>>,
    path: PathBuf,
    video_info: Option<VideoInfo>,
    confidence_threshold: f32,
    line_no: usize,
    next_index: u64,
    skipped_lines: usize,
    // First frame line, read while probing for the header
    pending: Option<FrameRecord>,
}

impl DetectionReader {
    pub fn open(path: &Path, confidence_threshold: f32) -> Result<Self> {
        info!("Opening detections: {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("Failed to open detection file {}", path.display()))?;

        let mut reader = Self {
            lines: BufReader::new(file).lines(),
            path: path.to_path_buf(),
            video_info: None,
            confidence_threshold,
            line_no: 0,
            next_index: 1,
            skipped_lines: 0,
            pending: None,
        };

        match reader.next_line()? {
            Some(Line::Header(h)) => {
                info!(
                    "Video properties: {}x{} @ {:.1} FPS, {} frames",
                    h.video_info.width,
                    h.video_info.height,
                    h.video_info.fps,
                    h.video_info
                        .total_frames
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "?".to_string())
                );
                reader.video_info = Some(h.video_info);
            }
            Some(Line::Frame(record)) => reader.pending = Some(record),
            None => {}
        }

        Ok(reader)
    }

    /// Next parseable line. Blank and malformed lines are skipped.
    fn next_line(&mut self) -> Result<Option<Line>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.with_context(|| {
                format!("Failed to read line {} of {}", self.line_no, self.path.display())
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Line>(trimmed) {
                Ok(parsed) => return Ok(Some(parsed)),
                Err(e) => {
                    warn!(
                        "Skipping malformed line {} in {}: {}",
                        self.line_no,
                        self.path.display(),
                        e
                    );
                    self.skipped_lines += 1;
                }
            }
        }
        Ok(None)
    }

    fn to_frame(&mut self, record: FrameRecord) -> Frame {
        let index = record.frame.unwrap_or(self.next_index);
        self.next_index = index.saturating_add(1);

        let total = record.detections.len();
        let detections: Vec<_> = record
            .detections
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();
        if detections.len() < total {
            debug!(
                "Frame {}: dropped {} low-confidence detection(s)",
                index,
                total - detections.len()
            );
        }

        Frame { index, detections }
    }
}

impl DetectionSource for DetectionReader {
    fn video_info(&self) -> Option<&VideoInfo> {
        self.video_info.as_ref()
    }

    fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(self.to_frame(record)));
        }
        loop {
            match self.next_line()? {
                Some(Line::Frame(record)) => return Ok(Some(self.to_frame(record))),
                Some(Line::Header(_)) => {
                    warn!(
                        "Ignoring repeated header at line {} in {}",
                        self.line_no,
                        self.path.display()
                    );
                    self.skipped_lines += 1;
                }
                None => return Ok(None),
            }
        }
    }
}

/// Reads `source` on the blocking pool and forwards frames tagged with
/// their stream position. Ends when the source is exhausted, fails, or the
/// receiver is dropped.
pub fn spawn_source<S>(
    mut source: S,
    capacity: usize,
) -> (
    mpsc::Receiver<Sequenced<Frame>>,
    tokio::task::JoinHandle<Result<SourceReport>>,
)
where
    S: DetectionSource + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::task::spawn_blocking(move || {
        let mut seq = 0u64;
        while let Some(frame) = source.next_frame()? {
            if tx.blocking_send(Sequenced { seq, item: frame }).is_err() {
                debug!("Frame receiver closed after {} frames", seq);
                break;
            }
            seq += 1;
        }
        Ok(SourceReport {
            frames_sent: seq,
            skipped_lines: source.skipped_lines(),
        })
    });
    (rx, handle)
}
