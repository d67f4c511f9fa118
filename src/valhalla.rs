//! Valhalla HTTP adapter for travel matrices.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MatrixError, MatrixResult};
use crate::matrix::{Matrix, MatrixEntry};
use crate::model::{GeoPoint, Priority};
use crate::polyline::Polyline;
use crate::traits::MatrixProvider;

/// Cost assigned to pairs Valhalla cannot route between.
const UNREACHABLE: f64 = 1.0e7;

#[derive(Debug, Clone)]
pub struct ValhallaConfig {
    pub base_url: String,
    pub costing: String,
    pub timeout_secs: u64,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            costing: "auto".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValhallaClient {
    config: ValhallaConfig,
    client: reqwest::blocking::Client,
}

impl ValhallaClient {
    pub fn new(config: ValhallaConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn request_body<'a>(&'a self, locations: &'a [ValhallaLocation]) -> MatrixRequest<'a> {
        MatrixRequest {
            sources: locations,
            targets: locations,
            costing: &self.config.costing,
            directions_options: DirectionsOptions { units: "kilometers" },
            shape_format: "geojson",
        }
    }
}

impl MatrixProvider for ValhallaClient {
    fn get_matrix(&self, locations: &[GeoPoint], priorities: &[Priority]) -> MatrixResult<Matrix> {
        if locations.is_empty() {
            return Err(MatrixError::NoLocations);
        }
        if priorities.len() != locations.len() {
            return Err(MatrixError::SizeMismatch {
                expected: locations.len(),
                got: priorities.len(),
            });
        }

        let points: Vec<ValhallaLocation> = locations
            .iter()
            .map(|p| ValhallaLocation {
                lat: p.lat,
                lon: p.lon,
                kind: "break",
            })
            .collect();

        let url = format!("{}/sources_to_targets", self.config.base_url);
        info!(size = locations.len(), "requesting matrix from valhalla");
        let body: MatrixResponse = self
            .client
            .post(url)
            .json(&self.request_body(&points))
            .send()?
            .error_for_status()?
            .json()?;

        let matrix = assemble(locations, priorities, body)?;
        info!("matrix received");
        Ok(matrix)
    }
}

fn assemble(locations: &[GeoPoint], priorities: &[Priority], body: MatrixResponse) -> MatrixResult<Matrix> {
    let n = locations.len();
    if body.sources_to_targets.len() != n {
        return Err(MatrixError::SizeMismatch {
            expected: n,
            got: body.sources_to_targets.len(),
        });
    }

    let mut rows = vec![vec![MatrixEntry::default(); n]; n];
    let mut filled = vec![false; n * n];
    for cell in body.sources_to_targets.into_iter().flatten() {
        let (from, to) = (cell.from_index, cell.to_index);
        if from >= n || to >= n {
            return Err(MatrixError::Malformed(format!("cell index ({from}, {to}) out of range")));
        }
        let (distance_km, time_s) = match (cell.distance, cell.time) {
            (Some(distance), Some(time)) => (distance, time),
            _ => {
                warn!(from, to, "valhalla found no route between locations");
                (UNREACHABLE, UNREACHABLE)
            }
        };
        let shape = cell
            .shape
            .as_ref()
            .and_then(Polyline::from_geojson)
            .unwrap_or_else(|| Polyline::straight(locations[from], locations[to]));
        rows[from][to] = MatrixEntry {
            distance_km,
            time_s,
            shape,
        };
        filled[from * n + to] = true;
    }

    if let Some(missing) = filled.iter().position(|f| !f) {
        return Err(MatrixError::Malformed(format!(
            "no cell for pair ({}, {})",
            missing / n,
            missing % n
        )));
    }

    Matrix::from_rows(rows, priorities.to_vec())
}

#[derive(Debug, Serialize)]
struct ValhallaLocation {
    lat: f64,
    lon: f64,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct DirectionsOptions {
    units: &'static str,
}

#[derive(Debug, Serialize)]
struct MatrixRequest<'a> {
    sources: &'a [ValhallaLocation],
    targets: &'a [ValhallaLocation],
    costing: &'a str,
    directions_options: DirectionsOptions,
    shape_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    sources_to_targets: Vec<Vec<MatrixCell>>,
}

#[derive(Debug, Deserialize)]
struct MatrixCell {
    from_index: usize,
    to_index: usize,
    distance: Option<f64>,
    time: Option<f64>,
    #[serde(default)]
    shape: Option<serde_json::Value>,
}
