use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use responder_dispatch::config::{EngineConfig, MatrixSettings};
use responder_dispatch::error::{DispatchResult, MatrixResult};
use responder_dispatch::geometry::UtmToolkit;
use responder_dispatch::haversine::HaversineMatrix;
use responder_dispatch::matrix::Matrix;
use responder_dispatch::model::{GeoPoint, Priority};
use responder_dispatch::projection::UtmZone;
use responder_dispatch::solver::LocalSearchSolver;
use responder_dispatch::sqlite::SqliteStore;
use responder_dispatch::store::{InMemoryStore, Scenario};
use responder_dispatch::tick::Dispatcher;
use responder_dispatch::traits::{MatrixProvider, StateStore};
use responder_dispatch::valhalla::{ValhallaClient, ValhallaConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run the response-fleet dispatch simulation", long_about = None)]
struct Cli {
    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Scenario file with the initial vehicles and incidents.
    #[arg(long, default_value = "scenarios/berlin.json")]
    scenario: PathBuf,
    /// SQLite database to persist state in. A new database is seeded from the
    /// scenario; an existing one resumes where it left off. Keeps state in
    /// memory when omitted.
    #[arg(long)]
    database: Option<PathBuf>,
    /// Stop after this many ticks instead of running until interrupted.
    #[arg(long)]
    ticks: Option<u64>,
}

/// Matrix backend picked at runtime from the configuration.
enum Provider {
    Valhalla(ValhallaClient),
    Haversine(HaversineMatrix),
}

impl Provider {
    fn from_settings(settings: &MatrixSettings) -> MatrixResult<Self> {
        Ok(match settings {
            MatrixSettings::Valhalla {
                base_url,
                costing,
                timeout_secs,
            } => Provider::Valhalla(ValhallaClient::new(ValhallaConfig {
                base_url: base_url.clone(),
                costing: costing.clone(),
                timeout_secs: *timeout_secs,
            })?),
            MatrixSettings::Haversine { speed_kmh } => Provider::Haversine(HaversineMatrix::new(*speed_kmh)),
        })
    }
}

impl MatrixProvider for Provider {
    fn get_matrix(&self, locations: &[GeoPoint], priorities: &[Priority]) -> MatrixResult<Matrix> {
        match self {
            Provider::Valhalla(client) => client.get_matrix(locations, priorities),
            Provider::Haversine(haversine) => haversine.get_matrix(locations, priorities),
        }
    }
}

fn drive<St: StateStore>(provider: Provider, store: St, config: EngineConfig, ticks: Option<u64>) -> DispatchResult<()> {
    let solver = LocalSearchSolver::new(config.solver.clone());
    let geometry = UtmToolkit::new(UtmZone::north(config.utm_zone));
    let mut dispatcher = Dispatcher::new(provider, solver, store, geometry, config);

    match ticks {
        Some(count) => {
            let summary = dispatcher.run_ticks(count)?;
            info!(ticks = summary.ticks, committed = summary.committed, "simulation finished");
            Ok(())
        }
        None => {
            // Nothing raises the flag yet; the process is stopped externally.
            let stop = AtomicBool::new(false);
            dispatcher.run(&stop).map(|_| ())
        }
    }
}

fn main() -> DispatchResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("responder_dispatch=info,dispatch_sim=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let scenario = Scenario::from_file(&cli.scenario)?;
    info!(
        vehicles = scenario.vehicles.len(),
        incidents = scenario.incidents.len(),
        scenario = %cli.scenario.display(),
        "loaded scenario"
    );

    let provider = Provider::from_settings(&config.matrix)?;

    match &cli.database {
        Some(path) => {
            let store = SqliteStore::open(path)?;
            store.seed_if_empty(&scenario)?;
            drive(provider, store, config, cli.ticks)
        }
        None => drive(provider, InMemoryStore::from_scenario(scenario), config, cli.ticks),
    }
}
