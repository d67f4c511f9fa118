//! Haversine matrix provider (fallback when Valhalla is unavailable).
//!
//! Uses great-circle distance to estimate travel time and a straight,
//! lightly densified line as the path geometry. Ignores roads entirely but
//! needs no routing tiles, which makes it the default for offline simulation.

use crate::error::{MatrixError, MatrixResult};
use crate::matrix::{Matrix, MatrixEntry};
use crate::model::{GeoPoint, Priority};
use crate::polyline::Polyline;
use crate::traits::MatrixProvider;

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Intermediate points per straight path, endpoints excluded.
const SHAPE_INTERIOR_POINTS: usize = 8;

#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Great-circle distance between two points in kilometers.
    pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
        let lat1_rad = from.lat.to_radians();
        let lat2_rad = to.lat.to_radians();
        let delta_lat = (to.lat - from.lat).to_radians();
        let delta_lng = (to.lon - from.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }

    fn km_to_seconds(&self, km: f64) -> f64 {
        let hours = km / self.speed_kmh;
        (hours * 3600.0).round()
    }

    fn shape(from: GeoPoint, to: GeoPoint) -> Polyline {
        if from == to {
            return Polyline::new(vec![from]);
        }
        let steps = SHAPE_INTERIOR_POINTS + 1;
        let points = (0..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                GeoPoint::new(from.lat + (to.lat - from.lat) * t, from.lon + (to.lon - from.lon) * t)
            })
            .collect();
        Polyline::new(points)
    }
}

impl MatrixProvider for HaversineMatrix {
    fn get_matrix(&self, locations: &[GeoPoint], priorities: &[Priority]) -> MatrixResult<Matrix> {
        if locations.is_empty() {
            return Err(MatrixError::NoLocations);
        }

        let rows = locations
            .iter()
            .map(|&from| {
                locations
                    .iter()
                    .map(|&to| {
                        let km = Self::haversine_km(from, to);
                        MatrixEntry {
                            distance_km: km,
                            time_s: self.km_to_seconds(km),
                            shape: Self::shape(from, to),
                        }
                    })
                    .collect()
            })
            .collect();

        Matrix::from_rows(rows, priorities.to_vec())
    }
}
