//! Turns optimizer routes into persisted plans, incident completions and
//! vehicle moves for one tick.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::geometry::{Advance, advance_along};
use crate::matrix::{LocationLayout, Matrix};
use crate::model::{Changeset, Incident, IncidentId, Plan, Vehicle, VehicleUpdate};
use crate::optimizer::VehicleRoute;
use crate::polyline::Polyline;
use crate::traits::GeometryToolkit;

/// Everything one vehicle's route contributes to the changeset.
#[derive(Debug, Default)]
struct RouteOutcome {
    plans: Vec<Plan>,
    completed: Option<IncidentId>,
    update: Option<VehicleUpdate>,
}

pub struct PlanProcessor<G> {
    geometry: G,
    travel_budget_m: f64,
    completion_radius_m: f64,
}

impl<G: GeometryToolkit> PlanProcessor<G> {
    pub fn new(geometry: G, travel_budget_m: f64, completion_radius_m: f64) -> Self {
        Self {
            geometry,
            travel_budget_m,
            completion_radius_m,
        }
    }

    /// Advances every routed vehicle and collects the resulting changes.
    ///
    /// Vehicles are independent, so routes are processed in parallel; the
    /// output keeps route order.
    pub fn process(
        &self,
        routes: &[VehicleRoute],
        vehicles: &[Vehicle],
        incidents: &[Incident],
        matrix: &Matrix,
    ) -> Changeset {
        let layout = LocationLayout::new(incidents.len(), vehicles.len());
        let outcomes: Vec<RouteOutcome> = routes
            .par_iter()
            .filter_map(|route| self.process_route(route, layout, vehicles, incidents, matrix))
            .collect();

        let mut changes = Changeset::default();
        for outcome in outcomes {
            changes.plans.extend(outcome.plans);
            if let Some(id) = outcome.completed {
                if !changes.completed.contains(&id) {
                    changes.completed.push(id);
                }
            }
            changes.vehicle_updates.extend(outcome.update);
        }
        changes
    }

    fn process_route(
        &self,
        route: &VehicleRoute,
        layout: LocationLayout,
        vehicles: &[Vehicle],
        incidents: &[Incident],
        matrix: &Matrix,
    ) -> Option<RouteOutcome> {
        let Some(vehicle) = layout
            .vehicle_for_start(route.start_node)
            .and_then(|index| vehicles.get(index))
        else {
            warn!(start_node = route.start_node, "route references an unknown vehicle, skipping it");
            return None;
        };

        let Some(&first_stop) = route.stops.first() else {
            info!(vehicle_id = vehicle.id, "vehicle has no tasks, position unchanged");
            return None;
        };

        let Some(first_leg) = matrix.entry(route.start_node, first_stop) else {
            warn!(vehicle_id = vehicle.id, first_stop, "no matrix entry for first leg, skipping route");
            return None;
        };
        info!(
            vehicle_id = vehicle.id,
            next_stop = first_stop,
            distance_km = first_leg.distance_km,
            "vehicle assigned route"
        );

        let advance = self.advance(&first_leg.shape);
        let mut outcome = RouteOutcome::default();

        if let Some(advance) = &advance {
            match self.geometry.unproject(advance.waypoint) {
                Ok(position) => {
                    outcome.update = Some(VehicleUpdate {
                        vehicle_id: vehicle.id,
                        position,
                    })
                }
                Err(err) => warn!(vehicle_id = vehicle.id, %err, "cannot unproject waypoint"),
            }
        }

        for (i, &stop) in route.stops.iter().enumerate() {
            let Some(incident) = incidents.get(stop) else {
                warn!(vehicle_id = vehicle.id, stop, "route stop is not an incident, skipping leg");
                continue;
            };
            let Some(&eta) = route.etas.get(i) else {
                warn!(vehicle_id = vehicle.id, stop, "route has no arrival estimate for leg");
                continue;
            };

            let path = if i == 0 {
                if let Some(advance) = &advance {
                    if self.is_completed(advance, incident) {
                        info!(vehicle_id = vehicle.id, incident_id = incident.id, "incident completed");
                        outcome.completed = Some(incident.id);
                        continue;
                    }
                }
                self.remaining_path(advance.as_ref(), &first_leg.shape)
            } else {
                matrix
                    .entry(route.stops[i - 1], stop)
                    .map(|entry| entry.shape.clone())
                    .unwrap_or_default()
            };

            outcome.plans.push(Plan {
                vehicle_id: vehicle.id,
                incident_id: incident.id,
                order: (i + 1) as u32,
                path,
                eta,
            });
        }

        Some(outcome)
    }

    /// Projects, simplifies and densifies `shape`, then walks one tick's
    /// budget along it. Simplification problems fall back to the plain
    /// projected path; a path that cannot be projected yields no advance.
    fn advance(&self, shape: &Polyline) -> Option<Advance> {
        let projected = match self.geometry.project_path(shape) {
            Ok(projected) => projected,
            Err(err) => {
                warn!(%err, "cannot project leg geometry");
                return None;
            }
        };

        let prepared = self
            .geometry
            .simplify(&projected, self.travel_budget_m / 1000.0)
            .and_then(|simplified| self.geometry.segmentize(&simplified, self.travel_budget_m / 10.0))
            .unwrap_or_else(|err| {
                debug!(%err, "falling back to unsimplified leg geometry");
                projected.clone()
            });

        advance_along(&prepared, self.travel_budget_m)
    }

    fn is_completed(&self, advance: &Advance, incident: &Incident) -> bool {
        match self.geometry.project(incident.position) {
            Ok(target) => self.geometry.distance(advance.waypoint, target) < self.completion_radius_m,
            Err(err) => {
                warn!(incident_id = incident.id, %err, "cannot project incident position");
                false
            }
        }
    }

    fn remaining_path(&self, advance: Option<&Advance>, shape: &Polyline) -> Polyline {
        let Some(advance) = advance else {
            return shape.clone();
        };
        self.geometry
            .unproject_path(&advance.remaining)
            .unwrap_or_else(|err| {
                warn!(%err, "cannot unproject trimmed leg, keeping full geometry");
                shape.clone()
            })
    }
}
