//! Row models for point measurements, workouts and the unified output row

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Coordinate;

/// One point-in-time or interval measurement (`<Record>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Canonical (prefix-stripped) type, e.g. `HeartRate`
    pub record_type: String,
    /// Numeric value; `None` only for category-style records
    pub value: Option<f64>,
    /// Normalized category value for non-numeric records, e.g. `AsleepCore`
    pub value_category: Option<String>,
    pub unit: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub source_name: String,
}

/// One exercise session (`<Workout>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    /// Canonical type, always prefixed with `Workout`, e.g. `WorkoutRunning`
    pub workout_type: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub duration_min: Option<f64>,
    pub distance_km: Option<f64>,
    pub energy_kcal: Option<f64>,
    pub source_name: String,
    /// First trackpoint of the resolved route file, if any
    pub start: Option<Coordinate>,
}

/// The flat, analytics-ready row shared by every record kind
///
/// Column order and nullability match `storage::schema()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub row_type: String,
    pub value: Option<f64>,
    pub value_category: Option<String>,
    pub unit: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub duration_min: Option<f64>,
    pub distance_km: Option<f64>,
    pub energy_kcal: Option<f64>,
    pub source_name: String,
    pub start_lat: Option<f64>,
    pub start_lon: Option<f64>,
}

impl OutputRow {
    /// Whether this row came from a `<Workout>` element
    pub fn is_workout(&self) -> bool {
        self.row_type.starts_with("Workout")
    }
}

impl From<HealthRecord> for OutputRow {
    fn from(record: HealthRecord) -> Self {
        Self {
            row_type: record.record_type,
            value: record.value,
            value_category: record.value_category,
            unit: record.unit,
            start_date: record.start_date,
            end_date: record.end_date,
            duration_min: None,
            distance_km: None,
            energy_kcal: None,
            source_name: record.source_name,
            start_lat: None,
            start_lon: None,
        }
    }
}

impl From<Workout> for OutputRow {
    fn from(workout: Workout) -> Self {
        // Latitude and longitude are populated together or not at all
        let (start_lat, start_lon) = match workout.start {
            Some(c) => (Some(c.lat), Some(c.lon)),
            None => (None, None),
        };
        Self {
            row_type: workout.workout_type,
            value: None,
            value_category: None,
            unit: None,
            start_date: workout.start_date,
            end_date: workout.end_date,
            duration_min: workout.duration_min,
            distance_km: workout.distance_km,
            energy_kcal: workout.energy_kcal,
            source_name: workout.source_name,
            start_lat,
            start_lon,
        }
    }
}
