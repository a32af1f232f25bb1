// src/zone.rs
//
// Counting zones. Polygons are validated once at session start and never
// change afterwards; ids are the zone's position in the configured list.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::membership::point_in_polygon;
use crate::types::{BBox, Point, ZoneSpec, ZonesConfig};

pub type ZoneId = usize;

/// Twice the minimum polygon area (px²) accepted as non-degenerate.
const MIN_DOUBLE_AREA: f64 = 1e-3;

// ============================================================================
// ANCHOR
// ============================================================================

/// Which point of a bounding box is tested against zone polygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    Center,
    CenterLeft,
    CenterRight,
    TopCenter,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    pub fn point(&self, b: &BBox) -> Point {
        let cx = (b.x1 + b.x2) * 0.5;
        let cy = (b.y1 + b.y2) * 0.5;
        match self {
            Self::Center => Point::new(cx, cy),
            Self::CenterLeft => Point::new(b.x1, cy),
            Self::CenterRight => Point::new(b.x2, cy),
            Self::TopCenter => Point::new(cx, b.y1),
            Self::TopLeft => Point::new(b.x1, b.y1),
            Self::TopRight => Point::new(b.x2, b.y1),
            Self::BottomLeft => Point::new(b.x1, b.y2),
            Self::BottomCenter => Point::new(cx, b.y2),
            Self::BottomRight => Point::new(b.x2, b.y2),
        }
    }
}

// ============================================================================
// ZONE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Entry,
    Exit,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Zone {
    id: ZoneId,
    kind: ZoneKind,
    name: Option<String>,
    polygon: Vec<Point>,
    anchor: Anchor,
}

impl Zone {
    pub fn new(
        id: ZoneId,
        kind: ZoneKind,
        name: Option<String>,
        polygon: Vec<Point>,
        anchor: Anchor,
    ) -> Result<Self> {
        let polygon = normalize_polygon(polygon);
        validate_polygon(&polygon)
            .with_context(|| format!("{} zone {} has an invalid polygon", kind.as_str(), id))?;
        Ok(Self {
            id,
            kind,
            name,
            polygon,
            anchor,
        })
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.kind.as_str(), self.id))
    }

    pub fn polygon(&self) -> &[Point] {
        &self.polygon
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Mean of the vertices; used to place count labels.
    pub fn center(&self) -> Point {
        let n = self.polygon.len() as f32;
        let (sx, sy) = self
            .polygon
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }
}

/// Drops repeated consecutive vertices and an explicit closing vertex.
fn normalize_polygon(points: Vec<Point>) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn validate_polygon(polygon: &[Point]) -> Result<()> {
    if polygon.len() < 3 {
        bail!("polygon needs at least 3 distinct vertices, got {}", polygon.len());
    }
    if polygon.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        bail!("polygon contains a non-finite coordinate");
    }
    // Checked before the area: a symmetric bowtie has zero signed area
    if let Some((a, b)) = find_self_intersection(polygon) {
        bail!("polygon is self-intersecting (edges {} and {} cross)", a, b);
    }
    if double_area(polygon).abs() < MIN_DOUBLE_AREA {
        bail!("polygon has zero area");
    }
    Ok(())
}

/// Shoelace sum (signed, twice the area).
fn double_area(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let a = polygon[i];
            let b = polygon[(i + 1) % n];
            a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64
        })
        .sum()
}

fn find_self_intersection(polygon: &[Point]) -> Option<(usize, usize)> {
    let n = polygon.len();
    for i in 0..n {
        let (a1, a2) = (polygon[i], polygon[(i + 1) % n]);
        for j in (i + 1)..n {
            // Adjacent edges share a vertex by construction
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (b1, b2) = (polygon[j], polygon[(j + 1) % n]);
            if segments_intersect(a1, a2, b1, b2) {
                return Some((i, j));
            }
        }
    }
    None
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x as f64 - a.x as f64) * (c.y as f64 - a.y as f64)
        - (b.y as f64 - a.y as f64) * (c.x as f64 - a.x as f64)
}

pub(crate) fn on_segment(a: Point, b: Point, p: Point) -> bool {
    orientation(a, b, p).abs() < 1e-9
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    on_segment(b1, b2, a1) || on_segment(b1, b2, a2) || on_segment(a1, a2, b1) || on_segment(a1, a2, b2)
}

/// True when the two polygons share any point: crossing or touching edges,
/// or one lying wholly inside the other.
fn polygons_overlap(a: &[Point], b: &[Point]) -> bool {
    let edges = |poly: &[Point]| {
        let n = poly.len();
        (0..n).map(move |i| (poly[i], poly[(i + 1) % n])).collect::<Vec<_>>()
    };
    let (ea, eb) = (edges(a), edges(b));
    if ea
        .iter()
        .any(|&(a1, a2)| eb.iter().any(|&(b1, b2)| segments_intersect(a1, a2, b1, b2)))
    {
        return true;
    }
    a.iter().any(|&p| point_in_polygon(p, b)) || b.iter().any(|&p| point_in_polygon(p, a))
}

// ============================================================================
// ZONE SET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingModeKind {
    Occupancy,
    Transition,
}

/// The fixed, ordered zones of one processing session.
#[derive(Debug, Clone)]
pub struct ZoneSet {
    pub entry: Vec<Zone>,
    pub exit: Vec<Zone>,
}

impl ZoneSet {
    pub fn from_config(cfg: &ZonesConfig) -> Result<Self> {
        if cfg.entry.is_empty() {
            bail!("at least one entry zone is required");
        }
        if cfg.exit.is_empty() && cfg.entry.len() > 1 {
            bail!(
                "occupancy mode watches a single zone, but {} entry zones are configured without exit zones",
                cfg.entry.len()
            );
        }

        let entry = build_zones(&cfg.entry, ZoneKind::Entry, cfg.anchor)?;
        let exit = build_zones(&cfg.exit, ZoneKind::Exit, cfg.anchor)?;

        let zones = Self { entry, exit };
        for (e, x) in zones.overlapping_pairs() {
            warn!(
                "Entry zone {} overlaps exit zone {}: a vehicle inside both is claimed and resolved on the same frame",
                zones.entry_name(e),
                zones.exit_name(x)
            );
        }

        info!(
            "✓ Zones ready: {} entry, {} exit (anchor={:?})",
            zones.entry.len(),
            zones.exit.len(),
            cfg.anchor
        );

        Ok(zones)
    }

    /// (entry, exit) id pairs whose polygons share any point.
    pub fn overlapping_pairs(&self) -> Vec<(ZoneId, ZoneId)> {
        let mut pairs = Vec::new();
        for entry in &self.entry {
            for exit in &self.exit {
                if polygons_overlap(entry.polygon(), exit.polygon()) {
                    pairs.push((entry.id(), exit.id()));
                }
            }
        }
        pairs
    }

    pub fn mode(&self) -> CountingModeKind {
        if self.exit.is_empty() {
            CountingModeKind::Occupancy
        } else {
            CountingModeKind::Transition
        }
    }

    pub fn entry_name(&self, id: ZoneId) -> String {
        self.entry
            .get(id)
            .map(|z| z.display_name())
            .unwrap_or_else(|| format!("entry-{}", id))
    }

    pub fn exit_name(&self, id: ZoneId) -> String {
        self.exit
            .get(id)
            .map(|z| z.display_name())
            .unwrap_or_else(|| format!("exit-{}", id))
    }
}

fn build_zones(specs: &[ZoneSpec], kind: ZoneKind, anchor: Anchor) -> Result<Vec<Zone>> {
    specs
        .iter()
        .enumerate()
        .map(|(id, spec)| {
            let polygon = spec.polygon.iter().copied().map(Point::from).collect();
            Zone::new(id, kind, spec.name.clone(), polygon, anchor)
        })
        .collect()
}
