//! Route join models

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A geographic sample, in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Build a coordinate only if both parts are finite and within WGS84 bounds
    pub fn checked(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

/// A workout's pointer to an external route file
///
/// The export has no workout primary key, so the owning workout is identified
/// by its start time and source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteReference {
    pub workout_start: NaiveDateTime,
    pub source_name: String,
    /// The reference exactly as written in the export, e.g. `/workout-routes/route_2024-01-15_8.30am.gpx`
    pub reference: String,
}

impl RouteReference {
    /// Last path component of the reference, accepting both separators
    pub fn file_name(&self) -> &str {
        self.reference
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.reference)
    }

    /// File name without its extension
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }
}
