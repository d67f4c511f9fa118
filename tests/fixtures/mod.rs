//! Test fixtures for responder-dispatch.
//!
//! Provides realistic test data including:
//! - Berlin locations from the seed scenario
//! - Builders for vehicles, incidents and hand-written travel matrices

#![allow(dead_code)]

pub mod berlin_locations;

pub use berlin_locations::*;

use chrono::{TimeZone, Utc};
use responder_dispatch::haversine::HaversineMatrix;
use responder_dispatch::matrix::{Matrix, MatrixEntry};
use responder_dispatch::model::{GeoPoint, Incident, Priority, Vehicle};
use responder_dispatch::polyline::Polyline;

pub fn vehicle(id: u64, location: &Location) -> Vehicle {
    let mut vehicle = Vehicle::new(id, location.point());
    vehicle.registration = Some(format!("B-P {}", 1000 + id));
    vehicle
}

pub fn incident(id: u64, location: &Location, priority: Priority) -> Incident {
    let mut incident = Incident::new(id, location.point(), priority);
    incident.description = format!("Incident at {}", location.name);
    incident.address = Some(format!("{}, Berlin", location.name));
    incident.reported_at = Utc.with_ymd_and_hms(2025, 9, 18, 8, 0, 0).unwrap();
    incident
}

/// A point `metres` north of `origin`, good to a few centimetres at Berlin's
/// latitude for distances under a kilometre.
pub fn north_of(origin: GeoPoint, metres: f64) -> GeoPoint {
    GeoPoint::new(origin.lat + metres / 111_250.0, origin.lon)
}

/// Matrix over `points` with hand-picked travel times. Distances follow the
/// great circle and every shape is a straight two-point line.
pub fn timed_matrix(points: &[GeoPoint], priorities: Vec<Priority>, time_s: impl Fn(usize, usize) -> f64) -> Matrix {
    let rows = points
        .iter()
        .enumerate()
        .map(|(i, &from)| {
            points
                .iter()
                .enumerate()
                .map(|(j, &to)| MatrixEntry {
                    distance_km: HaversineMatrix::haversine_km(from, to),
                    time_s: if i == j { 0.0 } else { time_s(i, j) },
                    shape: if i == j {
                        Polyline::new(vec![from])
                    } else {
                        Polyline::straight(from, to)
                    },
                })
                .collect()
        })
        .collect();
    Matrix::from_rows(rows, priorities).unwrap()
}
