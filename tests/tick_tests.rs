//! Dispatch loop tests
//!
//! No-op ticks, failure isolation, rollback and a full simulated run.

mod fixtures;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use fixtures::*;
use responder_dispatch::config::{EngineConfig, SolverSettings};
use responder_dispatch::error::{DispatchError, MatrixError, MatrixResult, StoreError, StoreResult};
use responder_dispatch::geometry::UtmToolkit;
use responder_dispatch::haversine::HaversineMatrix;
use responder_dispatch::matrix::Matrix;
use responder_dispatch::model::{Changeset, GeoPoint, Incident, Priority, Snapshot, Vehicle, VehicleUpdate};
use responder_dispatch::solver::{LocalSearchSolver, RouteSolver, RoutingModel, Solution, SolveFailure, SolveStatus};
use responder_dispatch::store::InMemoryStore;
use responder_dispatch::tick::{Dispatcher, RunSummary, SkipReason, TickOutcome, TickPhase};
use responder_dispatch::traits::{MatrixProvider, StateStore};

// ============================================================================
// Test collaborators
// ============================================================================

/// Haversine provider that counts requests, or fails them all.
#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingProvider {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MatrixProvider for CountingProvider {
    fn get_matrix(&self, locations: &[GeoPoint], priorities: &[Priority]) -> MatrixResult<Matrix> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MatrixError::Malformed("routing service unavailable".to_string()));
        }
        HaversineMatrix::default().get_matrix(locations, priorities)
    }
}

/// In-memory store that counts commits. With `corrupt` set, every commit
/// carries an extra update for a vehicle that does not exist.
struct CountingStore {
    inner: InMemoryStore,
    commits: AtomicUsize,
    corrupt: bool,
}

impl CountingStore {
    fn new(vehicles: Vec<Vehicle>, incidents: Vec<Incident>) -> Self {
        Self {
            inner: InMemoryStore::new(vehicles, incidents),
            commits: AtomicUsize::new(0),
            corrupt: false,
        }
    }

    fn corrupting(vehicles: Vec<Vehicle>, incidents: Vec<Incident>) -> Self {
        Self {
            corrupt: true,
            ..Self::new(vehicles, incidents)
        }
    }

    fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl StateStore for CountingStore {
    fn get_entities(&self) -> StoreResult<Snapshot> {
        self.inner.get_entities()
    }

    fn commit(&self, changes: &Changeset) -> StoreResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.corrupt {
            let mut changes = changes.clone();
            changes.vehicle_updates.push(VehicleUpdate {
                vehicle_id: 999,
                position: GeoPoint::new(52.5, 13.4),
            });
            return self.inner.commit(&changes);
        }
        self.inner.commit(changes)
    }
}

/// Lends a provider to the dispatcher so the test can still read its counter.
struct Borrowed<'a>(&'a CountingProvider);

impl MatrixProvider for Borrowed<'_> {
    fn get_matrix(&self, locations: &[GeoPoint], priorities: &[Priority]) -> MatrixResult<Matrix> {
        self.0.get_matrix(locations, priorities)
    }
}

/// Store whose fetches start failing once `limit` of them have succeeded.
struct ExhaustedStore {
    inner: InMemoryStore,
    fetches: AtomicUsize,
    limit: usize,
}

impl StateStore for ExhaustedStore {
    fn get_entities(&self) -> StoreResult<Snapshot> {
        if self.fetches.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(StoreError::Corrupt("database went away".to_string()));
        }
        self.inner.get_entities()
    }

    fn commit(&self, changes: &Changeset) -> StoreResult<()> {
        self.inner.commit(changes)
    }
}

struct FailingSolver;

impl RouteSolver for FailingSolver {
    fn solve(&self, _model: &RoutingModel, _budget: Duration) -> Result<Solution, SolveFailure> {
        Err(SolveFailure::new(SolveStatus::TimedOut, "no solution within budget"))
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        solver_time_budget_s: 1.0,
        solver: SolverSettings {
            max_iterations: 200,
            ..SolverSettings::default()
        },
        ..EngineConfig::default()
    }
}

fn fleet() -> Vec<Vehicle> {
    PATROL_CARS
        .iter()
        .enumerate()
        .map(|(i, car)| vehicle(i as u64 + 1, car))
        .collect()
}

fn queue() -> Vec<Incident> {
    INCIDENT_SITES
        .iter()
        .enumerate()
        .map(|(i, site)| {
            let priority = [Priority::High, Priority::Medium, Priority::Low][i % 3];
            incident(i as u64 + 1, site, priority)
        })
        .collect()
}

fn dispatcher<S: RouteSolver>(
    provider: CountingProvider,
    solver: S,
    store: CountingStore,
    config: EngineConfig,
) -> Dispatcher<CountingProvider, S, CountingStore, UtmToolkit> {
    Dispatcher::new(provider, solver, store, UtmToolkit::default(), config)
}

// ============================================================================
// No-op ticks
// ============================================================================

#[test]
fn tick_without_incidents_does_nothing() {
    let mut dispatcher = dispatcher(
        CountingProvider::default(),
        LocalSearchSolver::default(),
        CountingStore::new(fleet(), Vec::new()),
        config(),
    );

    let outcome = dispatcher.tick().unwrap();

    assert_eq!(outcome, TickOutcome::Skipped(SkipReason::NoIncidents));
    assert_eq!(dispatcher.store().commits(), 0);
    assert_eq!(dispatcher.phase(), TickPhase::Idle);
}

#[test]
fn tick_without_vehicles_does_nothing() {
    let provider = CountingProvider::default();
    let mut dispatcher = Dispatcher::new(
        Borrowed(&provider),
        LocalSearchSolver::default(),
        CountingStore::new(Vec::new(), queue()),
        UtmToolkit::default(),
        config(),
    );

    let outcome = dispatcher.tick().unwrap();

    assert_eq!(outcome, TickOutcome::Skipped(SkipReason::NoVehicles));
    assert_eq!(provider.calls(), 0);
    assert_eq!(dispatcher.store().commits(), 0);
    assert_eq!(dispatcher.store().get_entities().unwrap().incidents.len(), queue().len());
}

#[test]
fn empty_world_never_requests_a_matrix() {
    let provider = CountingProvider::default();
    let mut dispatcher = Dispatcher::new(
        Borrowed(&provider),
        LocalSearchSolver::default(),
        CountingStore::new(Vec::new(), Vec::new()),
        UtmToolkit::default(),
        config(),
    );

    let summary = dispatcher.run_ticks(3).unwrap();

    assert_eq!(summary, RunSummary { ticks: 3, committed: 0 });
    assert_eq!(provider.calls(), 0);
    assert_eq!(dispatcher.ticks(), 3);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn solver_failure_skips_tick_without_commit() {
    let mut dispatcher = dispatcher(
        CountingProvider::default(),
        FailingSolver,
        CountingStore::new(fleet(), queue()),
        config(),
    );
    let before = dispatcher.store().get_entities().unwrap();

    let outcome = dispatcher.tick().unwrap();

    match outcome {
        TickOutcome::Skipped(SkipReason::Unsolved(failure)) => {
            assert_eq!(failure.status, SolveStatus::TimedOut)
        }
        other => panic!("expected an unsolved tick, got {other:?}"),
    }
    assert_eq!(dispatcher.store().commits(), 0);
    assert_eq!(dispatcher.store().get_entities().unwrap(), before);
    assert_eq!(dispatcher.phase(), TickPhase::Idle);
}

#[test]
fn infeasible_routes_skip_tick() {
    let config = EngineConfig {
        max_route_cost: 1,
        ..config()
    };
    let mut dispatcher = dispatcher(
        CountingProvider::default(),
        LocalSearchSolver::default(),
        CountingStore::new(fleet(), queue()),
        config,
    );

    let outcome = dispatcher.tick().unwrap();

    assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::Unsolved(_))));
    assert_eq!(dispatcher.store().commits(), 0);
}

#[test]
fn matrix_failure_aborts_tick() {
    let mut dispatcher = dispatcher(
        CountingProvider::failing(),
        LocalSearchSolver::default(),
        CountingStore::new(fleet(), queue()),
        config(),
    );

    let err = dispatcher.tick().unwrap_err();

    assert!(matches!(err, DispatchError::Matrix(MatrixError::Malformed(_))));
    assert_eq!(dispatcher.store().commits(), 0);
    assert_eq!(dispatcher.phase(), TickPhase::Idle);
}

#[test]
fn failed_commit_leaves_pre_tick_state() {
    let mut dispatcher = dispatcher(
        CountingProvider::default(),
        LocalSearchSolver::default(),
        CountingStore::corrupting(fleet(), queue()),
        config(),
    );
    let before = dispatcher.store().get_entities().unwrap();

    let err = dispatcher.tick().unwrap_err();

    assert!(matches!(err, DispatchError::Store(StoreError::UnknownVehicle(999))));
    assert_eq!(dispatcher.store().commits(), 1);
    assert_eq!(dispatcher.store().get_entities().unwrap(), before);
    assert!(dispatcher.store().inner.plans().unwrap().is_empty());
}

// ============================================================================
// Full runs
// ============================================================================

#[test]
fn committed_tick_plans_every_incident() {
    let mut dispatcher = dispatcher(
        CountingProvider::default(),
        LocalSearchSolver::default(),
        CountingStore::new(fleet(), queue()),
        config(),
    );

    let outcome = dispatcher.tick().unwrap();

    let TickOutcome::Committed(summary) = outcome else {
        panic!("expected a committed tick, got {outcome:?}");
    };
    assert_eq!(summary.plans + summary.completed, queue().len());
    assert_eq!(dispatcher.store().commits(), 1);

    let snapshot = dispatcher.store().get_entities().unwrap();
    let plans = dispatcher.store().inner.plans().unwrap();
    for plan in &plans {
        assert!(snapshot.incidents.iter().any(|i| i.id == plan.incident_id));
    }
}

#[test]
fn simulation_resolves_every_incident() {
    let config = EngineConfig {
        travel_budget_m: 1_000.0,
        ..config()
    };
    let mut dispatcher = dispatcher(
        CountingProvider::default(),
        LocalSearchSolver::new(config.solver.clone()),
        CountingStore::new(fleet(), queue()),
        config,
    );

    let mut resolved = false;
    for _ in 0..200 {
        if dispatcher.tick().unwrap() == TickOutcome::Skipped(SkipReason::NoIncidents) {
            resolved = true;
            break;
        }
    }

    assert!(resolved, "incidents left after {} ticks", dispatcher.ticks());
    assert!(dispatcher.store().inner.plans().unwrap().is_empty());
}

#[test]
fn huge_tick_count_runs_until_the_store_fails() {
    let store = ExhaustedStore {
        inner: InMemoryStore::new(fleet(), Vec::new()),
        fetches: AtomicUsize::new(0),
        limit: 3,
    };
    let mut dispatcher = Dispatcher::new(
        CountingProvider::default(),
        LocalSearchSolver::default(),
        store,
        UtmToolkit::default(),
        config(),
    );

    let err = dispatcher.run_ticks(u64::MAX / 2).unwrap_err();

    assert!(matches!(err, DispatchError::Store(StoreError::Corrupt(_))));
    assert_eq!(dispatcher.ticks(), 4);
}

#[test]
fn run_counts_committed_ticks() {
    let mut dispatcher = dispatcher(
        CountingProvider::default(),
        LocalSearchSolver::default(),
        CountingStore::new(fleet(), queue()),
        config(),
    );

    let summary = dispatcher.run_ticks(2).unwrap();

    assert_eq!(summary.ticks, 2);
    assert_eq!(summary.committed, dispatcher.store().commits() as u64);
    assert!(summary.committed >= 1);
}

#[test]
fn raised_stop_flag_prevents_any_tick() {
    let mut dispatcher = dispatcher(
        CountingProvider::default(),
        LocalSearchSolver::default(),
        CountingStore::new(fleet(), queue()),
        config(),
    );
    let stop = AtomicBool::new(true);

    let summary = dispatcher.run(&stop).unwrap();

    assert_eq!(summary, RunSummary::default());
    assert_eq!(dispatcher.ticks(), 0);
    assert_eq!(dispatcher.store().commits(), 0);
}
