use thiserror::Error;

use crate::model::{IncidentId, VehicleId};

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("matrix request needs at least one location")]
    NoLocations,

    #[error("matrix transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed matrix response: {0}")]
    Malformed(String),

    #[error("matrix has {got} rows, expected {expected}")]
    SizeMismatch { expected: usize, got: usize },
}

pub type MatrixResult<T> = Result<T, MatrixError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vehicle {0} does not exist")]
    UnknownVehicle(VehicleId),

    #[error("incident {0} does not exist")]
    UnknownIncident(IncidentId),

    #[error("state store lock poisoned")]
    Poisoned,

    #[error("stored value is invalid: {0}")]
    Corrupt(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("scenario error: {0}")]
    Scenario(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("coordinate ({0}, {1}) is not finite")]
    NonFinite(f64, f64),

    #[error("latitude {0} is outside the projection domain")]
    OutOfDomain(f64),

    #[error("invalid resolution {0}")]
    InvalidResolution(f64),

    #[error("geometry has no coordinates")]
    Empty,
}

pub type GeometryResult<T> = Result<T, GeometryError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that abort a tick. Solver failures are not among them: a tick
/// without a feasible assignment is skipped, not failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("matrix provider failed: {0}")]
    Matrix(#[from] MatrixError),

    #[error("state store failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
