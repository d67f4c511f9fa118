//! Planar geometry toolkit used by the plan processor.
//!
//! Paths arrive in WGS-84; all distance reasoning happens in a metric grid.
//! [`UtmToolkit`] projects into a fixed UTM zone and delegates simplification
//! and densification to the `geo` crate.

use geo::{Coord, Densify, LineString, Simplify};

use crate::error::{GeometryError, GeometryResult};
use crate::model::GeoPoint;
use crate::projection::UtmZone;
use crate::traits::GeometryToolkit;

/// A coordinate in a metre-based planar grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: PlanarPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Point at fraction `t` of the way to `other`.
    pub fn lerp(&self, other: PlanarPoint, t: f64) -> PlanarPoint {
        PlanarPoint::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }
}

/// UTM-backed toolkit. The default zone is 33N (ETRS89 / EPSG:25833).
#[derive(Debug, Clone, Copy)]
pub struct UtmToolkit {
    zone: UtmZone,
}

impl Default for UtmToolkit {
    fn default() -> Self {
        Self {
            zone: UtmZone::north(33),
        }
    }
}

impl UtmToolkit {
    pub fn new(zone: UtmZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> UtmZone {
        self.zone
    }
}

fn to_line_string(path: &[PlanarPoint]) -> LineString<f64> {
    LineString::new(path.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
}

fn from_line_string(line: &LineString<f64>) -> Vec<PlanarPoint> {
    line.coords().map(|c| PlanarPoint::new(c.x, c.y)).collect()
}

impl GeometryToolkit for UtmToolkit {
    fn project(&self, point: GeoPoint) -> GeometryResult<PlanarPoint> {
        let (x, y) = self.zone.forward(point)?;
        Ok(PlanarPoint::new(x, y))
    }

    fn unproject(&self, point: PlanarPoint) -> GeometryResult<GeoPoint> {
        self.zone.inverse(point.x, point.y)
    }

    fn simplify(&self, path: &[PlanarPoint], tolerance: f64) -> GeometryResult<Vec<PlanarPoint>> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(GeometryError::InvalidResolution(tolerance));
        }
        if path.len() < 3 {
            return Ok(path.to_vec());
        }
        Ok(from_line_string(&to_line_string(path).simplify(&tolerance)))
    }

    fn segmentize(&self, path: &[PlanarPoint], max_segment: f64) -> GeometryResult<Vec<PlanarPoint>> {
        if !max_segment.is_finite() || max_segment <= 0.0 {
            return Err(GeometryError::InvalidResolution(max_segment));
        }
        if path.len() < 2 {
            return Ok(path.to_vec());
        }
        Ok(from_line_string(&to_line_string(path).densify(max_segment)))
    }

    fn distance(&self, a: PlanarPoint, b: PlanarPoint) -> f64 {
        a.distance(b)
    }
}

/// Result of consuming a travel budget along a planar path.
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    /// Where the traveller stands after this tick.
    pub waypoint: PlanarPoint,
    /// Distance covered along the path, never above the budget.
    pub travelled: f64,
    /// The untravelled rest of the path, starting at the waypoint.
    pub remaining: Vec<PlanarPoint>,
}

/// Walks `path` from its first coordinate until `budget` metres are used up.
///
/// The waypoint is interpolated inside the segment where the budget runs out,
/// so the walked distance never exceeds it. A path shorter than the budget
/// ends on its last coordinate; a single-coordinate path ends where it starts.
pub fn advance_along(path: &[PlanarPoint], budget: f64) -> Option<Advance> {
    let first = *path.first()?;
    let budget = budget.max(0.0);
    let mut travelled = 0.0;

    for (i, pair) in path.windows(2).enumerate() {
        let (from, to) = (pair[0], pair[1]);
        let step = from.distance(to);
        if travelled + step > budget {
            let t = if step > 0.0 { (budget - travelled) / step } else { 0.0 };
            let waypoint = from.lerp(to, t);
            let mut remaining = Vec::with_capacity(path.len() - i);
            remaining.push(waypoint);
            remaining.extend_from_slice(&path[i + 1..]);
            return Some(Advance {
                waypoint,
                travelled: budget,
                remaining,
            });
        }
        travelled += step;
    }

    let last = path.last().copied().unwrap_or(first);
    Some(Advance {
        waypoint: last,
        travelled,
        remaining: vec![last],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(len: f64, points: usize) -> Vec<PlanarPoint> {
        (0..points)
            .map(|i| PlanarPoint::new(len * i as f64 / (points - 1) as f64, 0.0))
            .collect()
    }

    #[test]
    fn advance_interpolates_inside_segment() {
        let path = straight(1000.0, 3); // 0, 500, 1000
        let advance = advance_along(&path, 700.0).unwrap();
        assert!((advance.waypoint.x - 700.0).abs() < 1e-9);
        assert_eq!(advance.travelled, 700.0);
        assert_eq!(advance.remaining.len(), 2);
        assert_eq!(advance.remaining[1], PlanarPoint::new(1000.0, 0.0));
    }

    #[test]
    fn advance_stops_at_path_end() {
        let path = straight(150.0, 4);
        let advance = advance_along(&path, 200.0).unwrap();
        assert_eq!(advance.waypoint, PlanarPoint::new(150.0, 0.0));
        assert!((advance.travelled - 150.0).abs() < 1e-9);
        assert_eq!(advance.remaining, vec![PlanarPoint::new(150.0, 0.0)]);
    }

    #[test]
    fn advance_on_single_point_degenerates() {
        let only = PlanarPoint::new(3.0, 4.0);
        let advance = advance_along(&[only], 200.0).unwrap();
        assert_eq!(advance.waypoint, only);
        assert_eq!(advance.travelled, 0.0);
        assert!(advance_along(&[], 200.0).is_none());
    }

    #[test]
    fn advance_never_leaves_budget_on_winding_path() {
        let path = vec![
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(120.0, 0.0),
            PlanarPoint::new(120.0, 120.0),
            PlanarPoint::new(0.0, 120.0),
        ];
        let advance = advance_along(&path, 200.0).unwrap();
        assert!(path[0].distance(advance.waypoint) <= 200.0);
        assert!((advance.waypoint.x - 120.0).abs() < 1e-9);
        assert!((advance.waypoint.y - 80.0).abs() < 1e-9);
    }

    #[test]
    fn segmentize_bounds_segment_length() {
        let toolkit = UtmToolkit::default();
        let dense = toolkit.segmentize(&straight(100.0, 2), 20.0).unwrap();
        assert!(dense.len() >= 6);
        for pair in dense.windows(2) {
            assert!(pair[0].distance(pair[1]) <= 20.0 + 1e-9);
        }
    }

    #[test]
    fn segmentize_rejects_zero_resolution() {
        let toolkit = UtmToolkit::default();
        assert_eq!(
            toolkit.segmentize(&straight(100.0, 2), 0.0),
            Err(GeometryError::InvalidResolution(0.0))
        );
    }

    #[test]
    fn simplify_drops_collinear_points() {
        let toolkit = UtmToolkit::default();
        let simplified = toolkit.simplify(&straight(100.0, 11), 0.2).unwrap();
        assert_eq!(simplified, vec![PlanarPoint::new(0.0, 0.0), PlanarPoint::new(100.0, 0.0)]);
    }

    #[test]
    fn project_path_round_trips() {
        let toolkit = UtmToolkit::default();
        let path = crate::polyline::Polyline::straight(
            GeoPoint::new(52.5096, 13.3757),
            GeoPoint::new(52.5090, 13.3768),
        );
        let planar = toolkit.project_path(&path).unwrap();
        let back = toolkit.unproject_path(&planar).unwrap();
        for (a, b) in path.points().iter().zip(back.points()) {
            assert!((a.lat - b.lat).abs() < 1e-7 && (a.lon - b.lon).abs() < 1e-7);
        }
    }
}
