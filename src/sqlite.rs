//! SQLite-backed state store.
//!
//! Three tables: `vehicles`, `incidents` and `plans`. A commit runs all of its
//! stages in one transaction; dropping the transaction on error rolls it back.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, error, info};

use crate::error::{StoreError, StoreResult};
use crate::model::{
    Changeset, GeoPoint, Incident, Plan, Priority, ServiceType, Snapshot, Vehicle, VehicleKind,
};
use crate::polyline::Polyline;
use crate::store::Scenario;
use crate::traits::StateStore;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS vehicles (
        id           INTEGER PRIMARY KEY,
        lat          REAL    NOT NULL,
        lon          REAL    NOT NULL,
        capacity     INTEGER NOT NULL,
        category     TEXT    NOT NULL,
        kind         TEXT    NOT NULL,
        registration TEXT
    );
    CREATE TABLE IF NOT EXISTS incidents (
        id          INTEGER PRIMARY KEY,
        lat         REAL    NOT NULL,
        lon         REAL    NOT NULL,
        priority    TEXT    NOT NULL,
        description TEXT    NOT NULL,
        address     TEXT,
        category    TEXT    NOT NULL,
        reported_at TEXT    NOT NULL
    );
    CREATE TABLE IF NOT EXISTS plans (
        vehicle_id  INTEGER NOT NULL REFERENCES vehicles(id),
        incident_id INTEGER NOT NULL REFERENCES incidents(id),
        plan_index  INTEGER NOT NULL,
        route       TEXT    NOT NULL,
        eta         TEXT    NOT NULL,
        PRIMARY KEY (vehicle_id, plan_index)
    );";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Loads the scenario's vehicles and incidents into an empty database.
    /// A database that already holds state is left alone and `false` is
    /// returned, so a restart resumes from the last commit.
    pub fn seed_if_empty(&self, scenario: &Scenario) -> StoreResult<bool> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let existing: i64 = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM vehicles) + (SELECT COUNT(*) FROM incidents)",
            [],
            |row| row.get(0),
        )?;
        if existing > 0 {
            info!(rows = existing, "database already holds state, skipping seed");
            return Ok(false);
        }
        {
            let mut insert = tx.prepare(
                "INSERT INTO vehicles (id, lat, lon, capacity, category, kind, registration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for v in &scenario.vehicles {
                insert.execute(params![
                    v.id as i64,
                    v.position.lat,
                    v.position.lon,
                    v.capacity,
                    v.category.as_str(),
                    v.kind.as_str(),
                    v.registration,
                ])?;
            }
        }
        {
            let mut insert = tx.prepare(
                "INSERT INTO incidents (id, lat, lon, priority, description, address, category, reported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for i in &scenario.incidents {
                insert.execute(params![
                    i.id as i64,
                    i.position.lat,
                    i.position.lon,
                    i.priority.as_str(),
                    i.description,
                    i.address,
                    i.category.as_str(),
                    i.reported_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        info!(
            vehicles = scenario.vehicles.len(),
            incidents = scenario.incidents.len(),
            "seeded sqlite store"
        );
        Ok(true)
    }

    pub fn plans(&self) -> StoreResult<Vec<Plan>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT vehicle_id, incident_id, plan_index, route, eta FROM plans ORDER BY vehicle_id, plan_index",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(vehicle_id, incident_id, order, route, eta)| {
                let value: serde_json::Value =
                    serde_json::from_str(&route).map_err(|err| StoreError::Corrupt(err.to_string()))?;
                let path = Polyline::from_geojson(&value)
                    .ok_or_else(|| StoreError::Corrupt(format!("plan route is not a line string: {route}")))?;
                Ok(Plan {
                    vehicle_id: vehicle_id as u64,
                    incident_id: incident_id as u64,
                    order,
                    path,
                    eta: parse_timestamp(&eta)?,
                })
            })
            .collect()
    }

    pub fn vehicle(&self, id: u64) -> StoreResult<Option<Vehicle>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let raw = conn
            .query_row(
                "SELECT id, lat, lon, capacity, category, kind, registration FROM vehicles WHERE id = ?1",
                params![id as i64],
                VehicleRow::read,
            )
            .optional()?;
        raw.map(VehicleRow::into_vehicle).transpose()
    }
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt(format!("bad timestamp {raw}: {err}")))
}

struct VehicleRow {
    id: i64,
    lat: f64,
    lon: f64,
    capacity: u32,
    category: String,
    kind: String,
    registration: Option<String>,
}

impl VehicleRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            lat: row.get(1)?,
            lon: row.get(2)?,
            capacity: row.get(3)?,
            category: row.get(4)?,
            kind: row.get(5)?,
            registration: row.get(6)?,
        })
    }

    fn into_vehicle(self) -> StoreResult<Vehicle> {
        Ok(Vehicle {
            id: self.id as u64,
            position: GeoPoint::new(self.lat, self.lon),
            capacity: self.capacity,
            category: ServiceType::parse(&self.category)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown service type {}", self.category)))?,
            kind: VehicleKind::parse(&self.kind)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown vehicle kind {}", self.kind)))?,
            registration: self.registration,
        })
    }
}

struct IncidentRow {
    id: i64,
    lat: f64,
    lon: f64,
    priority: String,
    description: String,
    address: Option<String>,
    category: String,
    reported_at: String,
}

impl IncidentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            lat: row.get(1)?,
            lon: row.get(2)?,
            priority: row.get(3)?,
            description: row.get(4)?,
            address: row.get(5)?,
            category: row.get(6)?,
            reported_at: row.get(7)?,
        })
    }

    fn into_incident(self) -> StoreResult<Incident> {
        Ok(Incident {
            id: self.id as u64,
            position: GeoPoint::new(self.lat, self.lon),
            priority: Priority::parse(&self.priority)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown priority {}", self.priority)))?,
            description: self.description,
            address: self.address,
            category: ServiceType::parse(&self.category)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown service type {}", self.category)))?,
            reported_at: parse_timestamp(&self.reported_at)?,
        })
    }
}

impl StateStore for SqliteStore {
    fn get_entities(&self) -> StoreResult<Snapshot> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

        let incidents = conn
            .prepare(
                "SELECT id, lat, lon, priority, description, address, category, reported_at
                 FROM incidents ORDER BY id",
            )?
            .query_map([], IncidentRow::read)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(IncidentRow::into_incident)
            .collect::<StoreResult<Vec<_>>>()?;

        let vehicles = conn
            .prepare("SELECT id, lat, lon, capacity, category, kind, registration FROM vehicles ORDER BY id")?
            .query_map([], VehicleRow::read)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(VehicleRow::into_vehicle)
            .collect::<StoreResult<Vec<_>>>()?;

        info!(
            incidents = incidents.len(),
            vehicles = vehicles.len(),
            "fetched incidents and vehicles"
        );
        Ok(Snapshot { incidents, vehicles })
    }

    fn commit(&self, changes: &Changeset) -> StoreResult<()> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let result = stage_and_commit(&mut conn, changes);
        match &result {
            Ok(()) => info!("transaction committed"),
            Err(err) => error!(%err, "transaction failed, rolling back all changes"),
        }
        result
    }
}

fn stage_and_commit(conn: &mut Connection, changes: &Changeset) -> StoreResult<()> {
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM plans", [])?;
    debug!("staged: deletion of old plans");

    {
        let mut insert = tx.prepare(
            "INSERT INTO plans (vehicle_id, incident_id, plan_index, route, eta) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for plan in &changes.plans {
            insert.execute(params![
                plan.vehicle_id as i64,
                plan.incident_id as i64,
                plan.order,
                plan.path.to_geojson().to_string(),
                plan.eta.to_rfc3339(),
            ])?;
        }
    }
    debug!(plans = changes.plans.len(), "staged: new plans");

    for &id in &changes.completed {
        if tx.execute("DELETE FROM incidents WHERE id = ?1", params![id as i64])? == 0 {
            return Err(StoreError::UnknownIncident(id));
        }
    }
    debug!(incidents = changes.completed.len(), "staged: completed incidents removed");

    for update in &changes.vehicle_updates {
        let updated = tx.execute(
            "UPDATE vehicles SET lat = ?1, lon = ?2 WHERE id = ?3",
            params![update.position.lat, update.position.lon, update.vehicle_id as i64],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownVehicle(update.vehicle_id));
        }
    }
    debug!(vehicles = changes.vehicle_updates.len(), "staged: vehicle positions");

    tx.commit()?;
    Ok(())
}
