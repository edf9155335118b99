//! Workout route resolution
//!
//! An export links a workout to its GPS track indirectly: the `<Workout>`
//! carries a `<WorkoutRoute><FileReference path="..."/></WorkoutRoute>` child
//! whose path shape differs between export versions. This module finds the
//! route file for each reference and extracts its starting coordinate.
//!
//! ## Pieces
//!
//! - [`RouteCatalog`]: the route files found under the route directory
//! - [`MatchStrategy`]: one way of pairing a reference with catalog files;
//!   strategies are tried in order and the first one producing candidates decides
//! - [`RouteIndex`]: reference → file and file → first coordinate, both cached
//!   so every route file is opened at most once per run
//! - [`coordinates`]: the streaming first-trackpoint reader

mod catalog;
pub mod coordinates;
mod index;
mod strategy;

pub use catalog::{RouteCatalog, RouteFile};
pub use index::{Resolution, RouteIndex, RouteStats};
pub use strategy::{
    default_strategies, ExactFileName, ExtensionSubstitution, MatchStrategy, MatchStrategyKind,
    SubstringMatch,
};
