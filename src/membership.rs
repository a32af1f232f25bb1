// src/membership.rs
//
// Zone membership oracle: which detections have their anchor inside a zone.
// The counting engine only ever sees the filtered subsets this produces.

use crate::types::{Detection, Point};
use crate::zone::{on_segment, Zone};

pub trait MembershipOracle {
    /// Returns the detections (in input order) whose anchor lies inside `zone`.
    fn trigger(&self, detections: &[Detection], zone: &Zone) -> Vec<Detection>;
}

/// Even-odd ray casting over the zone polygon. Points on an edge count as inside.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolygonOracle;

impl MembershipOracle for PolygonOracle {
    fn trigger(&self, detections: &[Detection], zone: &Zone) -> Vec<Detection> {
        let anchor = zone.anchor();
        detections
            .iter()
            .filter(|d| point_in_polygon(anchor.point(&d.bbox), zone.polygon()))
            .cloned()
            .collect()
    }
}

pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if on_segment(a, b, p) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;
    use crate::zone::{Anchor, ZoneKind};

    fn diamond() -> Vec<Point> {
        // First entry polygon of the reference intersection layout
        vec![
            Point::new(652.0, 214.0),
            Point::new(795.0, 62.0),
            Point::new(947.0, 205.0),
            Point::new(804.0, 357.0),
        ]
    }

    #[test]
    fn test_point_inside_and_outside() {
        let poly = diamond();
        assert!(point_in_polygon(Point::new(800.0, 210.0), &poly));
        assert!(!point_in_polygon(Point::new(100.0, 100.0), &poly));
        assert!(!point_in_polygon(Point::new(652.0, 100.0), &poly));
    }

    #[test]
    fn test_boundary_counts_as_inside() {
        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(Point::new(0.0, 5.0), &square));
        assert!(point_in_polygon(Point::new(10.0, 10.0), &square));
        assert!(!point_in_polygon(Point::new(10.5, 5.0), &square));
    }

    #[test]
    fn test_concave_polygon() {
        // U shape: the notch at (5, 8) is outside
        let u = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(7.0, 10.0),
            Point::new(7.0, 4.0),
            Point::new(3.0, 4.0),
            Point::new(3.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(!point_in_polygon(Point::new(5.0, 8.0), &u));
        assert!(point_in_polygon(Point::new(1.5, 8.0), &u));
        assert!(point_in_polygon(Point::new(5.0, 2.0), &u));
    }

    #[test]
    fn test_oracle_uses_zone_anchor() {
        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        // Box centred at (50, 110), bottom edge outside, top edge inside
        let det = Detection::new(1, BBox::new(40.0, 90.0, 60.0, 130.0));

        let center = Zone::new(0, ZoneKind::Entry, None, square.clone(), Anchor::Center).unwrap();
        let top = Zone::new(0, ZoneKind::Entry, None, square, Anchor::TopCenter).unwrap();

        let oracle = PolygonOracle;
        assert!(oracle.trigger(&[det.clone()], &center).is_empty());
        assert_eq!(oracle.trigger(&[det], &top).len(), 1);
    }

    #[test]
    fn test_oracle_preserves_order() {
        let zone = Zone::new(0, ZoneKind::Exit, None, diamond(), Anchor::Center).unwrap();
        let dets = vec![
            Detection::new(3, BBox::new(790.0, 200.0, 810.0, 220.0)),
            Detection::new(1, BBox::new(0.0, 0.0, 10.0, 10.0)),
            Detection::new(2, BBox::new(780.0, 190.0, 800.0, 210.0)),
        ];
        let hits = PolygonOracle.trigger(&dets, &zone);
        let ids: Vec<i64> = hits.iter().map(|d| d.track_id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
