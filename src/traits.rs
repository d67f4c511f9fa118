//! Seams between the dispatch engine and its collaborators.
//!
//! The engine never talks to a routing service, a database or a geometry
//! library directly; it goes through these traits.

use crate::error::{GeometryResult, MatrixResult, StoreResult};
use crate::geometry::PlanarPoint;
use crate::matrix::Matrix;
use crate::model::{Changeset, GeoPoint, Priority, Snapshot};
use crate::polyline::Polyline;

/// Provides a pairwise distance/time/geometry matrix for a set of locations.
///
/// Locations are used as both sources and targets, in the given order.
/// `priorities[i]` is attached to target `i`.
pub trait MatrixProvider {
    fn get_matrix(&self, locations: &[GeoPoint], priorities: &[Priority]) -> MatrixResult<Matrix>;
}

/// Durable entity storage.
pub trait StateStore {
    fn get_entities(&self) -> StoreResult<Snapshot>;

    /// Replaces all plans, removes completed incidents and moves vehicles,
    /// all together or not at all.
    fn commit(&self, changes: &Changeset) -> StoreResult<()>;
}

/// Planar geometry operations needed to advance vehicles along paths.
pub trait GeometryToolkit: Sync {
    fn project(&self, point: GeoPoint) -> GeometryResult<PlanarPoint>;

    fn unproject(&self, point: PlanarPoint) -> GeometryResult<GeoPoint>;

    /// Douglas-Peucker simplification with `tolerance` in metres.
    fn simplify(&self, path: &[PlanarPoint], tolerance: f64) -> GeometryResult<Vec<PlanarPoint>>;

    /// Inserts coordinates so no segment is longer than `max_segment` metres.
    fn segmentize(&self, path: &[PlanarPoint], max_segment: f64) -> GeometryResult<Vec<PlanarPoint>>;

    fn distance(&self, a: PlanarPoint, b: PlanarPoint) -> f64;

    fn project_path(&self, path: &Polyline) -> GeometryResult<Vec<PlanarPoint>> {
        path.points().iter().map(|p| self.project(*p)).collect()
    }

    fn unproject_path(&self, path: &[PlanarPoint]) -> GeometryResult<Polyline> {
        let points = path
            .iter()
            .map(|p| self.unproject(*p))
            .collect::<GeometryResult<Vec<_>>>()?;
        Ok(Polyline::new(points))
    }
}
