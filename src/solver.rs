//! Open vehicle routing solver.
//!
//! [`RoutingModel`] describes the problem: one start and one end node per
//! vehicle, an arc cost matrix, and cumulative dimensions with hard capacities
//! and per-node soft upper bounds. Every node that is neither a start nor an
//! end must be visited exactly once.
//!
//! [`LocalSearchSolver`] builds a first solution by cheapest-arc extension and
//! improves it with guided local search until the wall-clock budget or the
//! iteration cap runs out.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::config::SolverSettings;

/// Why a solve produced no routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The search never started.
    NotSolved,
    /// No feasible assignment exists under the hard constraints.
    Failed,
    /// The budget ran out before a first solution was found.
    TimedOut,
    /// The model itself is inconsistent.
    InvalidInput,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SolveStatus::NotSolved => "NOT_SOLVED",
            SolveStatus::Failed => "FAIL",
            SolveStatus::TimedOut => "FAIL_TIMEOUT",
            SolveStatus::InvalidInput => "INVALID",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no solution found, status {status}: {detail}")]
pub struct SolveFailure {
    pub status: SolveStatus,
    pub detail: String,
}

impl SolveFailure {
    pub fn new(status: SolveStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftBound {
    pub bound: i64,
    pub coefficient: i64,
}

/// A quantity accumulated along each route, starting from zero at the start
/// node.
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    size: usize,
    transits: Vec<i64>,
    capacity: i64,
    soft_bounds: Vec<Option<SoftBound>>,
}

impl Dimension {
    pub fn from_fn(name: impl Into<String>, size: usize, capacity: i64, transit: impl Fn(usize, usize) -> i64) -> Self {
        let mut transits = Vec::with_capacity(size * size);
        for from in 0..size {
            for to in 0..size {
                transits.push(transit(from, to));
            }
        }
        Self {
            name: name.into(),
            size,
            transits,
            capacity,
            soft_bounds: vec![None; size],
        }
    }

    /// Penalizes `coefficient * (cumul - bound)` when the cumul at `node`
    /// exceeds `bound`.
    pub fn set_soft_upper_bound(&mut self, node: usize, bound: i64, coefficient: i64) {
        if let Some(slot) = self.soft_bounds.get_mut(node) {
            *slot = Some(SoftBound { bound, coefficient });
        }
    }

    pub fn soft_upper_bound(&self, node: usize) -> Option<SoftBound> {
        self.soft_bounds.get(node).copied().flatten()
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    fn transit(&self, from: usize, to: usize) -> i64 {
        self.transits[from * self.size + to]
    }
}

#[derive(Debug, Clone)]
pub struct RoutingModel {
    size: usize,
    starts: Vec<usize>,
    ends: Vec<usize>,
    arc_costs: Vec<i64>,
    dimensions: Vec<Dimension>,
}

impl RoutingModel {
    pub fn new(size: usize, starts: Vec<usize>, ends: Vec<usize>, arc_cost: impl Fn(usize, usize) -> i64) -> Self {
        let mut arc_costs = Vec::with_capacity(size * size);
        for from in 0..size {
            for to in 0..size {
                arc_costs.push(arc_cost(from, to));
            }
        }
        Self {
            size,
            starts,
            ends,
            arc_costs,
            dimensions: Vec::new(),
        }
    }

    pub fn add_dimension(&mut self, dimension: Dimension) {
        self.dimensions.push(dimension);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn vehicle_count(&self) -> usize {
        self.starts.len()
    }

    pub fn start(&self, vehicle: usize) -> usize {
        self.starts[vehicle]
    }

    pub fn end(&self, vehicle: usize) -> usize {
        self.ends[vehicle]
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn arc_cost(&self, from: usize, to: usize) -> i64 {
        self.arc_costs[from * self.size + to]
    }

    /// Nodes every solution must visit: everything but starts and ends.
    pub fn visit_nodes(&self) -> Vec<usize> {
        (0..self.size)
            .filter(|n| !self.starts.contains(n) && !self.ends.contains(n))
            .collect()
    }

    fn validate(&self) -> Result<(), SolveFailure> {
        let invalid = |detail: String| Err(SolveFailure::new(SolveStatus::InvalidInput, detail));

        if self.starts.is_empty() {
            return invalid("model has no vehicles".to_string());
        }
        if self.starts.len() != self.ends.len() {
            return invalid(format!(
                "{} start nodes but {} end nodes",
                self.starts.len(),
                self.ends.len()
            ));
        }
        if self.arc_costs.len() != self.size * self.size {
            return invalid("arc cost matrix does not match model size".to_string());
        }
        let mut seen = vec![false; self.size];
        for &node in self.starts.iter().chain(&self.ends) {
            if node >= self.size {
                return invalid(format!("depot node {node} outside model of size {}", self.size));
            }
            if seen[node] {
                return invalid(format!("depot node {node} is shared"));
            }
            seen[node] = true;
        }
        for dimension in &self.dimensions {
            if dimension.size != self.size {
                return invalid(format!("dimension {} does not match model size", dimension.name));
            }
        }
        Ok(())
    }

    /// Cost of one vehicle visiting `nodes` in order, including soft-bound
    /// penalties. `None` when a hard capacity is exceeded.
    pub fn route_cost(&self, vehicle: usize, nodes: &[usize]) -> Option<i64> {
        let start = self.starts[vehicle];
        let end = self.ends[vehicle];
        let mut cost = 0;
        let mut from = start;
        for &to in nodes.iter().chain(std::iter::once(&end)) {
            cost += self.arc_cost(from, to);
            from = to;
        }
        for dimension in &self.dimensions {
            let mut cumul = 0;
            let mut from = start;
            for &to in nodes.iter().chain(std::iter::once(&end)) {
                cumul += dimension.transit(from, to);
                if cumul > dimension.capacity {
                    return None;
                }
                if let Some(soft) = dimension.soft_upper_bound(to) {
                    cost += soft.coefficient * (cumul - soft.bound).max(0);
                }
                from = to;
            }
        }
        Some(cost)
    }

    fn arcs<'a>(&'a self, vehicle: usize, nodes: &'a [usize]) -> impl Iterator<Item = (usize, usize)> + 'a {
        let path = std::iter::once(self.starts[vehicle])
            .chain(nodes.iter().copied())
            .chain(std::iter::once(self.ends[vehicle]));
        path.clone().zip(path.skip(1))
    }
}

/// Per-vehicle visiting order, start and end nodes excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub routes: Vec<Vec<usize>>,
    pub objective: i64,
}

/// A pluggable routing back end.
pub trait RouteSolver {
    /// Returns the best solution found within `budget`, or why none was.
    fn solve(&self, model: &RoutingModel, budget: Duration) -> Result<Solution, SolveFailure>;
}

#[derive(Debug, Clone, Default)]
pub struct LocalSearchSolver {
    settings: SolverSettings,
}

impl LocalSearchSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }
}

impl RouteSolver for LocalSearchSolver {
    fn solve(&self, model: &RoutingModel, budget: Duration) -> Result<Solution, SolveFailure> {
        model.validate()?;
        if budget.is_zero() {
            return Err(SolveFailure::new(SolveStatus::NotSolved, "zero time budget"));
        }
        let deadline = Instant::now() + budget;

        let mut routes = cheapest_arc_construction(model, deadline)?;
        let objective = total_cost(model, &routes).ok_or_else(|| {
            SolveFailure::new(SolveStatus::Failed, "construction produced an infeasible route")
        })?;
        debug!(objective, "first solution constructed");

        let mut best = Solution {
            routes: routes.clone(),
            objective,
        };
        if model.visit_nodes().is_empty() {
            return Ok(best);
        }

        let mut search = GuidedSearch::new(model, &routes, self.settings.gls_lambda_coefficient);
        let mut iterations = 0;
        while iterations < self.settings.max_iterations {
            iterations += 1;
            match search.improve(&mut routes, deadline) {
                Step::Improved => {
                    if let Some(cost) = total_cost(model, &routes) {
                        if cost < best.objective {
                            best = Solution {
                                routes: routes.clone(),
                                objective: cost,
                            };
                        }
                    }
                }
                Step::LocalOptimum => search.penalize(&routes),
                Step::OutOfTime => break,
            }
        }

        debug!(iterations, objective = best.objective, "local search finished");
        Ok(best)
    }
}

fn total_cost(model: &RoutingModel, routes: &[Vec<usize>]) -> Option<i64> {
    routes
        .iter()
        .enumerate()
        .map(|(vehicle, nodes)| model.route_cost(vehicle, nodes))
        .sum()
}

/// Extends all routes at once, always taking the globally cheapest arc from a
/// route tail to an unvisited node that keeps the route feasible.
fn cheapest_arc_construction(model: &RoutingModel, deadline: Instant) -> Result<Vec<Vec<usize>>, SolveFailure> {
    let mut routes: Vec<Vec<usize>> = vec![Vec::new(); model.vehicle_count()];
    let mut unvisited = model.visit_nodes();

    while !unvisited.is_empty() {
        if Instant::now() >= deadline {
            return Err(SolveFailure::new(
                SolveStatus::TimedOut,
                format!("{} nodes left unassigned", unvisited.len()),
            ));
        }

        let mut best: Option<(i64, usize, usize)> = None;
        for (vehicle, route) in routes.iter().enumerate() {
            let tail = route.last().copied().unwrap_or(model.start(vehicle));
            for (slot, &node) in unvisited.iter().enumerate() {
                let cost = model.arc_cost(tail, node);
                if best.is_some_and(|(best_cost, _, _)| cost >= best_cost) {
                    continue;
                }
                let mut candidate = route.clone();
                candidate.push(node);
                if model.route_cost(vehicle, &candidate).is_some() {
                    best = Some((cost, vehicle, slot));
                }
            }
        }

        let Some((_, vehicle, slot)) = best else {
            return Err(SolveFailure::new(
                SolveStatus::Failed,
                format!("{} nodes cannot be placed on any route", unvisited.len()),
            ));
        };
        routes[vehicle].push(unvisited.remove(slot));
    }

    Ok(routes)
}

enum Step {
    Improved,
    LocalOptimum,
    OutOfTime,
}

const EPSILON: f64 = 1e-9;

/// Guided local search over relocate, exchange and 2-opt moves. Arcs are the
/// features: each local optimum penalizes its highest-utility arcs, pushing
/// the search elsewhere.
struct GuidedSearch<'a> {
    model: &'a RoutingModel,
    penalties: Vec<u32>,
    lambda: f64,
}

impl<'a> GuidedSearch<'a> {
    fn new(model: &'a RoutingModel, routes: &[Vec<usize>], coefficient: f64) -> Self {
        let (cost, arcs) = routes
            .iter()
            .enumerate()
            .flat_map(|(vehicle, nodes)| model.arcs(vehicle, nodes))
            .fold((0i64, 0usize), |(cost, count), (from, to)| {
                (cost + model.arc_cost(from, to), count + 1)
            });
        let lambda = coefficient * cost as f64 / arcs.max(1) as f64;
        Self {
            model,
            penalties: vec![0; model.size() * model.size()],
            lambda,
        }
    }

    fn augmented(&self, vehicle: usize, nodes: &[usize]) -> Option<f64> {
        let cost = self.model.route_cost(vehicle, nodes)?;
        let penalty: u32 = self
            .model
            .arcs(vehicle, nodes)
            .map(|(from, to)| self.penalties[from * self.model.size() + to])
            .sum();
        Some(cost as f64 + self.lambda * f64::from(penalty))
    }

    fn improve(&self, routes: &mut [Vec<usize>], deadline: Instant) -> Step {
        let current: Vec<f64> = routes
            .iter()
            .enumerate()
            .map(|(vehicle, nodes)| self.augmented(vehicle, nodes).unwrap_or(f64::INFINITY))
            .collect();
        let vehicles = routes.len();

        // Relocate one node, within its route or onto another.
        for from in 0..vehicles {
            if Instant::now() >= deadline {
                return Step::OutOfTime;
            }
            for i in 0..routes[from].len() {
                let node = routes[from][i];
                let mut reduced = routes[from].clone();
                reduced.remove(i);

                for to in 0..vehicles {
                    if to == from {
                        for j in 0..=reduced.len() {
                            if j == i {
                                continue;
                            }
                            let mut candidate = reduced.clone();
                            candidate.insert(j, node);
                            if let Some(cost) = self.augmented(from, &candidate) {
                                if cost < current[from] - EPSILON {
                                    routes[from] = candidate;
                                    return Step::Improved;
                                }
                            }
                        }
                        continue;
                    }

                    let Some(reduced_cost) = self.augmented(from, &reduced) else {
                        continue;
                    };
                    for j in 0..=routes[to].len() {
                        let mut candidate = routes[to].clone();
                        candidate.insert(j, node);
                        if let Some(cost) = self.augmented(to, &candidate) {
                            if reduced_cost + cost < current[from] + current[to] - EPSILON {
                                routes[from] = reduced;
                                routes[to] = candidate;
                                return Step::Improved;
                            }
                        }
                    }
                }
            }
        }

        // Exchange two nodes on different routes.
        for a in 0..vehicles {
            for b in a + 1..vehicles {
                if Instant::now() >= deadline {
                    return Step::OutOfTime;
                }
                for i in 0..routes[a].len() {
                    for j in 0..routes[b].len() {
                        let mut left = routes[a].clone();
                        let mut right = routes[b].clone();
                        std::mem::swap(&mut left[i], &mut right[j]);
                        let (Some(left_cost), Some(right_cost)) =
                            (self.augmented(a, &left), self.augmented(b, &right))
                        else {
                            continue;
                        };
                        if left_cost + right_cost < current[a] + current[b] - EPSILON {
                            routes[a] = left;
                            routes[b] = right;
                            return Step::Improved;
                        }
                    }
                }
            }
        }

        // 2-opt: reverse a segment of one route.
        for vehicle in 0..vehicles {
            if Instant::now() >= deadline {
                return Step::OutOfTime;
            }
            let len = routes[vehicle].len();
            for i in 0..len {
                for j in i + 1..len {
                    let mut candidate = routes[vehicle].clone();
                    candidate[i..=j].reverse();
                    if let Some(cost) = self.augmented(vehicle, &candidate) {
                        if cost < current[vehicle] - EPSILON {
                            routes[vehicle] = candidate;
                            return Step::Improved;
                        }
                    }
                }
            }
        }

        Step::LocalOptimum
    }

    fn penalize(&mut self, routes: &[Vec<usize>]) {
        let size = self.model.size();
        let mut best_utility = f64::NEG_INFINITY;
        let mut chosen: Vec<usize> = Vec::new();

        for (vehicle, nodes) in routes.iter().enumerate() {
            for (from, to) in self.model.arcs(vehicle, nodes) {
                let slot = from * size + to;
                let utility = self.model.arc_cost(from, to) as f64 / (1.0 + f64::from(self.penalties[slot]));
                if utility > best_utility + EPSILON {
                    best_utility = utility;
                    chosen.clear();
                    chosen.push(slot);
                } else if (utility - best_utility).abs() <= EPSILON {
                    chosen.push(slot);
                }
            }
        }

        for slot in chosen {
            self.penalties[slot] = self.penalties[slot].saturating_add(1);
        }
    }
}
