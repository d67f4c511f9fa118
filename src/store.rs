//! In-memory state store and scenario seeding.

use std::fs;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{StoreError, StoreResult};
use crate::model::{Changeset, Incident, Plan, Snapshot, Vehicle};
use crate::traits::StateStore;

/// Initial fleet and incident queue, loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub vehicles: Vec<Vehicle>,
    pub incidents: Vec<Incident>,
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| StoreError::Scenario(format!("{}: {err}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> StoreResult<Self> {
        serde_json::from_str(raw).map_err(|err| StoreError::Scenario(err.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    vehicles: Vec<Vehicle>,
    incidents: Vec<Incident>,
    plans: Vec<Plan>,
}

impl State {
    /// Applies every stage of a commit. Any error leaves `self` half-written,
    /// so callers stage onto a copy.
    fn apply(&mut self, changes: &Changeset) -> StoreResult<()> {
        self.plans.clear();
        debug!("staged: deletion of old plans");

        for plan in &changes.plans {
            if !self.vehicles.iter().any(|v| v.id == plan.vehicle_id) {
                return Err(StoreError::UnknownVehicle(plan.vehicle_id));
            }
            if !self.incidents.iter().any(|i| i.id == plan.incident_id) {
                return Err(StoreError::UnknownIncident(plan.incident_id));
            }
            self.plans.push(plan.clone());
        }
        debug!(plans = changes.plans.len(), "staged: new plans");

        for &id in &changes.completed {
            let Some(index) = self.incidents.iter().position(|i| i.id == id) else {
                return Err(StoreError::UnknownIncident(id));
            };
            if self.plans.iter().any(|p| p.incident_id == id) {
                return Err(StoreError::Corrupt(format!(
                    "completed incident {id} is still referenced by a plan"
                )));
            }
            self.incidents.remove(index);
        }
        debug!(incidents = changes.completed.len(), "staged: completed incidents removed");

        for update in &changes.vehicle_updates {
            let Some(vehicle) = self.vehicles.iter_mut().find(|v| v.id == update.vehicle_id) else {
                return Err(StoreError::UnknownVehicle(update.vehicle_id));
            };
            vehicle.position = update.position;
        }
        debug!(vehicles = changes.vehicle_updates.len(), "staged: vehicle positions");

        Ok(())
    }
}

/// Keeps the whole world in memory. Commits are staged on a copy and swapped
/// in under the write lock, so readers see either all of a commit or none.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new(vehicles: Vec<Vehicle>, incidents: Vec<Incident>) -> Self {
        Self {
            state: RwLock::new(State {
                vehicles,
                incidents,
                plans: Vec::new(),
            }),
        }
    }

    pub fn from_scenario(scenario: Scenario) -> Self {
        Self::new(scenario.vehicles, scenario.incidents)
    }

    pub fn plans(&self) -> StoreResult<Vec<Plan>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.plans.clone())
    }
}

impl StateStore for InMemoryStore {
    fn get_entities(&self) -> StoreResult<Snapshot> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        info!(
            incidents = state.incidents.len(),
            vehicles = state.vehicles.len(),
            "fetched incidents and vehicles"
        );
        Ok(Snapshot {
            incidents: state.incidents.clone(),
            vehicles: state.vehicles.clone(),
        })
    }

    fn commit(&self, changes: &Changeset) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        let mut staged = state.clone();
        if let Err(err) = staged.apply(changes) {
            error!(%err, "transaction failed, rolling back all changes");
            return Err(err);
        }
        *state = staged;
        info!("transaction committed");
        Ok(())
    }
}
