// src/types.rs

use serde::{Deserialize, Serialize};

use crate::zone::Anchor;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    pub zones: ZonesConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Frames per second of the source. Falls back to the detection file header.
    #[serde(default)]
    pub frame_rate: Option<f64>,
    /// Metres per pixel, applied linearly to anchor displacement
    #[serde(default = "default_scale")]
    pub scale_m_per_px: f64,
    /// Sample track positions every N frames
    #[serde(default = "default_speed_interval")]
    pub speed_sample_interval: u64,
    /// Handed to the detection source; the counting engine never looks at it
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    /// Detector NMS setting, recorded for the run summary only
    #[serde(default = "default_iou")]
    pub iou_threshold: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_rate: None,
            scale_m_per_px: default_scale(),
            speed_sample_interval: default_speed_interval(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou(),
        }
    }
}

fn default_scale() -> f64 {
    0.05
}

fn default_speed_interval() -> u64 {
    10
}

fn default_confidence() -> f32 {
    0.3
}

fn default_iou() -> f32 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonesConfig {
    #[serde(default)]
    pub anchor: Anchor,
    pub entry: Vec<ZoneSpec>,
    #[serde(default)]
    pub exit: Vec<ZoneSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub polygon: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub dir: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: "detections".to_string(),
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["jsonl".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: String,
    #[serde(default)]
    pub write_overlays: bool,
    #[serde(default = "default_true")]
    pub write_events: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "output".to_string(),
            write_overlays: false,
            write_events: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[f32; 2]> for Point {
    fn from(p: [f32; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

/// Axis-aligned box in pixel space, serialised as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }
}

impl From<[f32; 4]> for BBox {
    fn from(b: [f32; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

// ============================================================================
// DETECTIONS
// ============================================================================

/// Identity assigned by the external tracker. Only non-negative ids are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl TrackId {
    pub fn from_raw(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().map(TrackId)
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default = "untracked_id")]
    pub track_id: i64,
    pub bbox: BBox,
    #[serde(default)]
    pub class_id: i64,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn untracked_id() -> i64 {
    -1
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn new(track_id: i64, bbox: BBox) -> Self {
        Self {
            track_id,
            bbox,
            class_id: 0,
            confidence: 1.0,
        }
    }

    /// `None` for detections the tracker could not associate.
    pub fn tracked_id(&self) -> Option<TrackId> {
        TrackId::from_raw(self.track_id)
    }
}

// ============================================================================
// SOURCE RECORDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    #[serde(default)]
    pub total_frames: Option<u64>,
}

/// One line of a detection file as written by the tracker. `detections` is
/// required (possibly empty) so that a misspelt key is rejected instead of
/// read as an empty frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameRecord {
    #[serde(default)]
    pub frame: Option<u64>,
    pub detections: Vec<Detection>,
}

/// A frame's tracked detections, with a resolved 1-based index.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn timestamp_ms(&self, fps: f64) -> f64 {
        (self.index as f64 / fps) * 1000.0
    }
}
