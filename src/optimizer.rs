//! Builds the open vehicle routing model from a travel matrix and turns the
//! solver's answer into per-vehicle routes with arrival estimates.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::config::{EngineConfig, Goal, PriorityPolicy};
use crate::matrix::{LocationLayout, Matrix};
use crate::solver::{Dimension, RouteSolver, RoutingModel, SolveFailure};

pub const POSITION_DIMENSION: &str = "Position";

/// Distances are scaled to integer centi-kilometres for the solver.
const DISTANCE_SCALE: f64 = 100.0;

/// One vehicle's assignment for the current tick.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRoute {
    /// Position of the vehicle in the tick's snapshot.
    pub vehicle: usize,
    /// Matrix index of the vehicle's current position.
    pub start_node: usize,
    /// Incident indices in visiting order.
    pub stops: Vec<usize>,
    /// `etas[i]` is the estimated arrival at `stops[i]`.
    pub etas: Vec<DateTime<Utc>>,
}

impl VehicleRoute {
    /// Start node followed by the stops.
    pub fn nodes(&self) -> Vec<usize> {
        std::iter::once(self.start_node).chain(self.stops.iter().copied()).collect()
    }
}

pub struct RouteOptimizer<S> {
    solver: S,
    goal: Goal,
    policy: PriorityPolicy,
    max_route_cost: i64,
}

impl<S: RouteSolver> RouteOptimizer<S> {
    pub fn new(solver: S, goal: Goal, policy: PriorityPolicy, max_route_cost: i64) -> Self {
        Self {
            solver,
            goal,
            policy,
            max_route_cost,
        }
    }

    pub fn from_config(solver: S, config: &EngineConfig) -> Self {
        Self::new(solver, config.goal, config.priority_policy.clone(), config.max_route_cost)
    }

    /// Arc cost of the optimization goal between two model nodes. Arcs into or
    /// out of a virtual terminal are free.
    fn goal_cost(&self, matrix: &Matrix, layout: LocationLayout, from: usize, to: usize) -> i64 {
        if from >= layout.locations() || to >= layout.locations() {
            return 0;
        }
        let Some(entry) = matrix.entry(from, to) else {
            return 0;
        };
        match self.goal {
            Goal::Time => entry.time_s.round() as i64,
            Goal::Distance => (entry.distance_km * DISTANCE_SCALE).round() as i64,
        }
    }

    pub fn build_model(&self, matrix: &Matrix, layout: LocationLayout) -> RoutingModel {
        let size = layout.model_size();
        let cost = |from: usize, to: usize| self.goal_cost(matrix, layout, from, to);

        let mut model = RoutingModel::new(size, layout.start_nodes(), layout.terminal_nodes(), cost);

        let goal_dimension = match self.goal {
            Goal::Time => "Time",
            Goal::Distance => "Distance",
        };
        model.add_dimension(Dimension::from_fn(goal_dimension, size, self.max_route_cost, cost));

        let increment = |_from: usize, to: usize| {
            if layout.is_incident(to) {
                self.policy.rule(matrix.priority(to)).increment
            } else {
                self.policy.default_increment
            }
        };
        let mut position = Dimension::from_fn(POSITION_DIMENSION, size, self.policy.position_capacity, increment);
        for node in 0..layout.incidents {
            if let Some(soft) = self.policy.rule(matrix.priority(node)).soft_target {
                position.set_soft_upper_bound(node, soft.target, soft.penalty);
            }
        }
        model.add_dimension(position);

        model
    }

    /// Solves the tick's routing problem. `now` anchors the arrival estimates.
    pub fn solve(
        &self,
        matrix: &Matrix,
        layout: LocationLayout,
        budget: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<VehicleRoute>, SolveFailure> {
        let model = self.build_model(matrix, layout);
        info!(
            size = model.size(),
            vehicles = layout.vehicles,
            time_limit_ms = budget.as_millis() as u64,
            "solving routing problem"
        );

        let solution = match self.solver.solve(&model, budget) {
            Ok(solution) => solution,
            Err(failure) => {
                warn!(status = %failure.status, detail = %failure.detail, "solver found no solution");
                return Err(failure);
            }
        };
        info!(objective = solution.objective, "solver found a solution");

        let routes = solution
            .routes
            .iter()
            .enumerate()
            .map(|(vehicle, nodes)| {
                let start_node = layout.start_node(vehicle);
                let stops: Vec<usize> = nodes.iter().copied().filter(|&n| layout.is_incident(n)).collect();
                let etas = arrival_estimates(matrix, start_node, &stops, now);
                VehicleRoute {
                    vehicle,
                    start_node,
                    stops,
                    etas,
                }
            })
            .collect();

        Ok(routes)
    }
}

/// Cumulative matrix travel time along `start -> stops`, offset from `now`.
pub fn arrival_estimates(matrix: &Matrix, start: usize, stops: &[usize], now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut elapsed_s = 0.0;
    let mut from = start;
    stops
        .iter()
        .map(|&to| {
            let leg = matrix.entry(from, to).map(|e| e.time_s).unwrap_or(0.0);
            elapsed_s += leg.max(0.0);
            from = to;
            now + TimeDelta::milliseconds((elapsed_s * 1000.0).round() as i64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixEntry;
    use crate::model::Priority;
    use crate::solver::LocalSearchSolver;

    fn matrix(times: &[&[f64]], priorities: Vec<Priority>) -> Matrix {
        let rows = times
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&t| MatrixEntry {
                        distance_km: t / 100.0,
                        time_s: t,
                        ..MatrixEntry::default()
                    })
                    .collect()
            })
            .collect();
        Matrix::from_rows(rows, priorities).unwrap()
    }

    fn optimizer() -> RouteOptimizer<LocalSearchSolver> {
        RouteOptimizer::new(LocalSearchSolver::default(), Goal::Time, PriorityPolicy::default(), 10_000)
    }

    #[test]
    fn model_has_terminals_and_position_bounds() {
        let m = matrix(
            &[&[0.0, 5.0, 10.0], &[5.0, 0.0, 20.0], &[10.0, 20.0, 0.0]],
            vec![Priority::High, Priority::Low, Priority::Medium],
        );
        let layout = LocationLayout::new(2, 1);
        let model = optimizer().build_model(&m, layout);

        assert_eq!(model.size(), 4);
        assert_eq!(model.start(0), 2);
        assert_eq!(model.end(0), 3);
        assert_eq!(model.arc_cost(2, 0), 10);
        assert_eq!(model.arc_cost(0, 3), 0);

        let position = model.dimension(POSITION_DIMENSION).unwrap();
        assert_eq!(position.capacity(), 30);
        assert_eq!(position.soft_upper_bound(0).map(|s| (s.bound, s.coefficient)), Some((1, 50_000)));
        assert!(position.soft_upper_bound(1).is_none());
    }

    #[test]
    fn arrival_estimates_accumulate() {
        let m = matrix(
            &[&[0.0, 5.0, 10.0], &[5.0, 0.0, 20.0], &[10.0, 20.0, 0.0]],
            vec![Priority::High, Priority::Low, Priority::Medium],
        );
        let now = Utc::now();
        let etas = arrival_estimates(&m, 2, &[0, 1], now);
        assert_eq!(etas, vec![now + TimeDelta::seconds(10), now + TimeDelta::seconds(15)]);
    }

    #[test]
    fn distance_goal_scales_kilometres() {
        let m = matrix(&[&[0.0, 250.0], &[250.0, 0.0]], vec![Priority::High, Priority::Medium]);
        let optimizer = RouteOptimizer::new(
            LocalSearchSolver::default(),
            Goal::Distance,
            PriorityPolicy::default(),
            10_000,
        );
        let model = optimizer.build_model(&m, LocationLayout::new(1, 1));
        // 2.5 km -> 250 centi-kilometres
        assert_eq!(model.arc_cost(1, 0), 250);
        assert!(model.dimension("Distance").is_some());
    }
}
