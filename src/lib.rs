//! responder-dispatch core
//!
//! Re-plans a fleet of response vehicles against an incident queue once per
//! tick: build a travel matrix, solve an open multi-vehicle routing problem
//! with priority-biased ordering, advance each vehicle along its next leg and
//! commit the resulting world state atomically.

pub mod config;
pub mod error;
pub mod model;
pub mod polyline;
pub mod matrix;
pub mod traits;
pub mod projection;
pub mod geometry;
pub mod solver;
pub mod optimizer;
pub mod processor;
pub mod tick;
pub mod store;
pub mod sqlite;
pub mod valhalla;
pub mod haversine;
