//! Pairwise travel matrix and the location index scheme shared by the
//! optimizer and the plan processor.
//!
//! Indices `[0, E)` are incidents, `[E, E+V)` are vehicle start positions and
//! `[E+V, E+2V)` are per-vehicle virtual terminals. Providers only return the
//! first `E+V` rows; terminals exist in the optimizer's cost model alone.

use crate::error::{MatrixError, MatrixResult};
use crate::model::{GeoPoint, Incident, Priority, Vehicle};
use crate::polyline::Polyline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationLayout {
    pub incidents: usize,
    pub vehicles: usize,
}

impl LocationLayout {
    pub fn new(incidents: usize, vehicles: usize) -> Self {
        Self { incidents, vehicles }
    }

    /// Number of real locations (`E+V`).
    pub fn locations(&self) -> usize {
        self.incidents + self.vehicles
    }

    /// Size of the routing model including virtual terminals (`E+2V`).
    pub fn model_size(&self) -> usize {
        self.incidents + 2 * self.vehicles
    }

    pub fn is_incident(&self, node: usize) -> bool {
        node < self.incidents
    }

    pub fn is_terminal(&self, node: usize) -> bool {
        node >= self.locations() && node < self.model_size()
    }

    pub fn start_node(&self, vehicle: usize) -> usize {
        self.incidents + vehicle
    }

    pub fn terminal_node(&self, vehicle: usize) -> usize {
        self.locations() + vehicle
    }

    /// Vehicle position in the snapshot for a start node, if it is one.
    pub fn vehicle_for_start(&self, node: usize) -> Option<usize> {
        (node >= self.incidents && node < self.locations()).then(|| node - self.incidents)
    }

    pub fn start_nodes(&self) -> Vec<usize> {
        (0..self.vehicles).map(|v| self.start_node(v)).collect()
    }

    pub fn terminal_nodes(&self) -> Vec<usize> {
        (0..self.vehicles).map(|v| self.terminal_node(v)).collect()
    }
}

/// Coordinates and target priorities in matrix order: incidents first, then
/// vehicles. Vehicle targets carry `Priority::Medium`.
pub fn locations_for(incidents: &[Incident], vehicles: &[Vehicle]) -> (Vec<GeoPoint>, Vec<Priority>) {
    let mut points = Vec::with_capacity(incidents.len() + vehicles.len());
    let mut priorities = Vec::with_capacity(incidents.len() + vehicles.len());
    for incident in incidents {
        points.push(incident.position);
        priorities.push(incident.priority);
    }
    for vehicle in vehicles {
        points.push(vehicle.position);
        priorities.push(Priority::Medium);
    }
    (points, priorities)
}

/// One ordered pair of the matrix. Distance is in kilometers, time in seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixEntry {
    pub distance_km: f64,
    pub time_s: f64,
    pub shape: Polyline,
}

/// Square travel matrix with a priority tag per target.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    size: usize,
    entries: Vec<MatrixEntry>,
    priorities: Vec<Priority>,
}

impl Matrix {
    /// Builds a matrix from row-major entries.
    pub fn from_rows(rows: Vec<Vec<MatrixEntry>>, priorities: Vec<Priority>) -> MatrixResult<Self> {
        let size = rows.len();
        if priorities.len() != size {
            return Err(MatrixError::SizeMismatch {
                expected: size,
                got: priorities.len(),
            });
        }
        let mut entries = Vec::with_capacity(size * size);
        for row in rows {
            if row.len() != size {
                return Err(MatrixError::SizeMismatch {
                    expected: size,
                    got: row.len(),
                });
            }
            entries.extend(row);
        }
        Ok(Self {
            size,
            entries,
            priorities,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn entry(&self, from: usize, to: usize) -> Option<&MatrixEntry> {
        if from >= self.size || to >= self.size {
            return None;
        }
        self.entries.get(from * self.size + to)
    }

    pub fn priority(&self, target: usize) -> Priority {
        self.priorities.get(target).copied().unwrap_or(Priority::Medium)
    }

    pub fn priorities(&self) -> &[Priority] {
        &self.priorities
    }
}
