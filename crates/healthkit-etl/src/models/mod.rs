//! Data models for one export run
//!
//! `HealthRecord` and `Workout` are the two source kinds; both are projected
//! into the single `OutputRow` relation that the storage layer persists.

mod record;
mod route;

pub use record::{HealthRecord, OutputRow, Workout};
pub use route::{Coordinate, RouteReference};
