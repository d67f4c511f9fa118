//! Berlin locations from the seed scenario.
//!
//! Coordinates are WGS-84 and fall inside UTM zone 33N, which the dispatch
//! engine uses by default.

use responder_dispatch::model::GeoPoint;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lon: f64) -> Self {
        Self { name, lat, lon }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

// ============================================================================
// Patrol car positions at the start of the scenario
// ============================================================================

pub const PATROL_CARS: &[Location] = &[
    Location::new("B-P 3021 Unter den Linden", 52.5189, 13.3982),
    Location::new("B-P 8812 Checkpoint Charlie", 52.5024, 13.3876),
    Location::new("B-P 4590 Invalidenstrasse", 52.5301, 13.3645),
    Location::new("B-P 7118 Torstrasse", 52.5255, 13.4020),
];

// ============================================================================
// Incident sites
// ============================================================================

pub const INCIDENT_SITES: &[Location] = &[
    Location::new("Kurfuerstendamm 231", 52.5025, 13.3105),
    Location::new("Potsdamer Platz", 52.5096, 13.3757),
    Location::new("Fasanenstrasse 25", 52.5068, 13.3235),
    Location::new("Alexanderplatz", 52.5220, 13.4130),
    Location::new("Urbanstrasse 70", 52.4920, 13.4150),
    Location::new("Schillerpromenade", 52.4820, 13.4240),
];
