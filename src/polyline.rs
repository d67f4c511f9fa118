//! Polyline representation for route geometries.
//!
//! Paths are stored as decoded geographic coordinates. GeoJSON conversion
//! happens at the boundary (when receiving from Valhalla or persisting a plan).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::model::GeoPoint;

/// A path in WGS-84 coordinates, in travel order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<GeoPoint>,
}

impl Polyline {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    /// Two-point path between `from` and `to`.
    pub fn straight(from: GeoPoint, to: GeoPoint) -> Self {
        Self::new(vec![from, to])
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<GeoPoint> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<GeoPoint> {
        self.points.last().copied()
    }

    /// Parses a GeoJSON `LineString` geometry (`[lon, lat]` pairs).
    ///
    /// Returns `None` for anything that is not a well-formed line string.
    pub fn from_geojson(value: &Value) -> Option<Self> {
        if value.get("type")?.as_str()? != "LineString" {
            return None;
        }
        let coordinates = value.get("coordinates")?.as_array()?;
        let mut points = Vec::with_capacity(coordinates.len());
        for pair in coordinates {
            let pair = pair.as_array()?;
            let lon = pair.first()?.as_f64()?;
            let lat = pair.get(1)?.as_f64()?;
            points.push(GeoPoint::new(lat, lon));
        }
        Some(Self::new(points))
    }

    pub fn to_geojson(&self) -> Value {
        let coordinates: Vec<[f64; 2]> = self.points.iter().map(|p| [p.lon, p.lat]).collect();
        json!({ "type": "LineString", "coordinates": coordinates })
    }
}
