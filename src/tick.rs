//! The dispatch loop: fetch, solve, process, commit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::config::EngineConfig;
use crate::error::DispatchResult;
use crate::matrix::{LocationLayout, locations_for};
use crate::optimizer::RouteOptimizer;
use crate::processor::PlanProcessor;
use crate::solver::{RouteSolver, SolveFailure};
use crate::traits::{GeometryToolkit, MatrixProvider, StateStore};

/// Where the dispatcher is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Fetching,
    MatrixRequested,
    Solving,
    Processing,
    Committing,
}

/// Why a tick ended without touching the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoIncidents,
    NoVehicles,
    Unsolved(SolveFailure),
}

/// Counts from a committed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub plans: usize,
    pub completed: usize,
    pub moved: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Committed(TickSummary),
}

impl TickOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TickOutcome::Committed(_))
    }
}

/// Tick counts over a run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub committed: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        if outcome.is_committed() {
            self.committed += 1;
        }
    }
}

/// Owns every collaborator a tick needs. Built once and reused for the life
/// of the loop.
pub struct Dispatcher<M, S, St, G> {
    provider: M,
    optimizer: RouteOptimizer<S>,
    processor: PlanProcessor<G>,
    store: St,
    config: EngineConfig,
    phase: TickPhase,
    ticks: u64,
}

impl<M, S, St, G> Dispatcher<M, S, St, G>
where
    M: MatrixProvider,
    S: RouteSolver,
    St: StateStore,
    G: GeometryToolkit,
{
    pub fn new(provider: M, solver: S, store: St, geometry: G, config: EngineConfig) -> Self {
        let optimizer = RouteOptimizer::from_config(solver, &config);
        let processor = PlanProcessor::new(geometry, config.travel_budget_m, config.completion_radius_m);
        Self {
            provider,
            optimizer,
            processor,
            store,
            config,
            phase: TickPhase::Idle,
            ticks: 0,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    /// Number of ticks started so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn enter(&mut self, phase: TickPhase) {
        debug!(from = ?self.phase, to = ?phase, "tick phase");
        self.phase = phase;
    }

    /// Runs one full pass. Matrix and store failures abort the tick and are
    /// returned; an unsolvable routing problem skips it.
    pub fn tick(&mut self) -> DispatchResult<TickOutcome> {
        self.ticks += 1;
        let span = info_span!("tick", tick = self.ticks);
        let _guard = span.enter();

        let result = self.run_phases();
        self.enter(TickPhase::Idle);
        result
    }

    fn run_phases(&mut self) -> DispatchResult<TickOutcome> {
        let now = Utc::now();

        self.enter(TickPhase::Fetching);
        let snapshot = self.store.get_entities()?;
        if snapshot.incidents.is_empty() {
            info!("no incidents, nothing to do");
            return Ok(TickOutcome::Skipped(SkipReason::NoIncidents));
        }
        if snapshot.vehicles.is_empty() {
            info!("no vehicles, nothing to do");
            return Ok(TickOutcome::Skipped(SkipReason::NoVehicles));
        }

        self.enter(TickPhase::MatrixRequested);
        let layout = LocationLayout::new(snapshot.incidents.len(), snapshot.vehicles.len());
        let (locations, priorities) = locations_for(&snapshot.incidents, &snapshot.vehicles);
        let matrix = self.provider.get_matrix(&locations, &priorities)?;

        self.enter(TickPhase::Solving);
        let routes = match self
            .optimizer
            .solve(&matrix, layout, self.config.solver_time_budget(), now)
        {
            Ok(routes) => routes,
            Err(failure) => {
                warn!(status = %failure.status, "skipping tick without a routing solution");
                return Ok(TickOutcome::Skipped(SkipReason::Unsolved(failure)));
            }
        };

        self.enter(TickPhase::Processing);
        let changes = self
            .processor
            .process(&routes, &snapshot.vehicles, &snapshot.incidents, &matrix);
        let summary = TickSummary {
            plans: changes.plans.len(),
            completed: changes.completed.len(),
            moved: changes.vehicle_updates.len(),
        };

        self.enter(TickPhase::Committing);
        self.store.commit(&changes)?;
        info!(
            plans = summary.plans,
            completed = summary.completed,
            moved = summary.moved,
            "tick committed"
        );

        Ok(TickOutcome::Committed(summary))
    }

    /// Runs `count` ticks back to back, honouring the tick interval.
    pub fn run_ticks(&mut self, count: u64) -> DispatchResult<RunSummary> {
        let mut summary = RunSummary::default();
        for i in 0..count {
            if i > 0 {
                self.pause();
            }
            summary.record(&self.tick()?);
        }
        Ok(summary)
    }

    /// Loops until `stop` is raised. The flag is only checked between ticks.
    pub fn run(&mut self, stop: &AtomicBool) -> DispatchResult<RunSummary> {
        let mut summary = RunSummary::default();
        while !stop.load(Ordering::Relaxed) {
            summary.record(&self.tick()?);
            self.pause();
        }
        info!(ticks = self.ticks, "dispatch loop stopped");
        Ok(summary)
    }

    fn pause(&self) {
        let interval = self.config.tick_interval();
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
}
