//! Dispatch domain entities.
//!
//! Vehicles and incidents live across ticks; plans, vehicle updates and
//! changesets are rebuilt from scratch on every tick.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::polyline::Polyline;

pub type VehicleId = u64;
pub type IncidentId = u64;

/// A WGS-84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Urgency tier of an incident. Biases stop ordering, never forces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    #[default]
    Police,
    Fire,
    Ambulance,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Police => "police",
            ServiceType::Fire => "fire",
            ServiceType::Ambulance => "ambulance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "police" => Some(ServiceType::Police),
            "fire" => Some(ServiceType::Fire),
            "ambulance" => Some(ServiceType::Ambulance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    #[default]
    Car,
    Van,
    Motorcycle,
}

impl VehicleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleKind::Car => "car",
            VehicleKind::Van => "van",
            VehicleKind::Motorcycle => "motorcycle",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "car" => Some(VehicleKind::Car),
            "van" => Some(VehicleKind::Van),
            "motorcycle" => Some(VehicleKind::Motorcycle),
            _ => None,
        }
    }
}

/// A mobile response unit. Only its position changes between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub position: GeoPoint,
    pub capacity: u32,
    #[serde(default)]
    pub category: ServiceType,
    #[serde(default)]
    pub kind: VehicleKind,
    #[serde(default)]
    pub registration: Option<String>,
}

impl Vehicle {
    pub fn new(id: VehicleId, position: GeoPoint) -> Self {
        Self {
            id,
            position,
            capacity: 4,
            category: ServiceType::default(),
            kind: VehicleKind::default(),
            registration: None,
        }
    }
}

/// A reported incident awaiting a responder. Removed once completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub position: GeoPoint,
    pub priority: Priority,
    pub description: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub category: ServiceType,
    pub reported_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(id: IncidentId, position: GeoPoint, priority: Priority) -> Self {
        Self {
            id,
            position,
            priority,
            description: String::new(),
            address: None,
            category: ServiceType::default(),
            reported_at: Utc::now(),
        }
    }
}

/// One planned hop of a vehicle. `order` starts at 1 and follows route order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub vehicle_id: VehicleId,
    pub incident_id: IncidentId,
    pub order: u32,
    pub path: Polyline,
    pub eta: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdate {
    pub vehicle_id: VehicleId,
    pub position: GeoPoint,
}

/// Everything a tick wants to persist, applied atomically by a state store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    pub plans: Vec<Plan>,
    pub completed: Vec<IncidentId>,
    pub vehicle_updates: Vec<VehicleUpdate>,
}

/// Point-in-time view of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub incidents: Vec<Incident>,
    pub vehicles: Vec<Vehicle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_round_trips_through_str() {
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            assert_eq!(Priority::parse(priority.as_str()), Some(priority));
        }
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn priority_serializes_lowercase() {
        let json = serde_json::to_string(&Priority::High).unwrap();
        assert_eq!(json, "\"high\"");
    }

    #[test]
    fn vehicle_defaults_fill_missing_fields() {
        let vehicle: Vehicle =
            serde_json::from_str(r#"{"id": 7, "position": {"lat": 52.5, "lon": 13.4}, "capacity": 9}"#)
                .unwrap();
        assert_eq!(vehicle.category, ServiceType::Police);
        assert_eq!(vehicle.kind, VehicleKind::Car);
        assert!(vehicle.registration.is_none());
    }
}
