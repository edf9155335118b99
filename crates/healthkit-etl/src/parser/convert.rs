//! Conversion of materialized elements into typed records

use std::fmt;

use chrono::NaiveDateTime;

use super::fields::{
    distance_to_km, duration_to_minutes, energy_to_kcal, parse_instant, parse_number,
};
use super::reader::SourceElement;
use crate::models::{HealthRecord, RouteReference, Workout};
use crate::normalize::{normalize_category_value, normalize_type, normalize_workout_type};

const WORKOUT_ROUTE: &str = "WorkoutRoute";
const FILE_REFERENCE: &str = "FileReference";
const WORKOUT_STATISTICS: &str = "WorkoutStatistics";
const ACTIVE_ENERGY_TYPE: &str = "HKQuantityTypeIdentifierActiveEnergyBurned";

/// Why an element was skipped instead of emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingAttribute(&'static str),
    InvalidTimestamp(&'static str),
    InvalidNumber(&'static str),
    /// `endDate` earlier than `startDate`
    EndBeforeStart,
    /// A quantity record without a value
    MissingValue,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingAttribute(a) => write!(f, "missing {}", a),
            SkipReason::InvalidTimestamp(a) => write!(f, "invalid timestamp in {}", a),
            SkipReason::InvalidNumber(a) => write!(f, "invalid number in {}", a),
            SkipReason::EndBeforeStart => write!(f, "endDate before startDate"),
            SkipReason::MissingValue => write!(f, "quantity without value"),
        }
    }
}

/// A converted record plus whether its type had a known prefix
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub record: HealthRecord,
    pub recognized_type: bool,
}

/// A converted workout, its route reference (if any), and whether its type had a known prefix
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedWorkout {
    pub workout: Workout,
    pub route: Option<RouteReference>,
    pub recognized_type: bool,
}

fn required<'a>(element: &'a SourceElement, key: &'static str) -> Result<&'a str, SkipReason> {
    match element.attr(key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SkipReason::MissingAttribute(key)),
    }
}

fn optional_number(element: &SourceElement, key: &'static str) -> Result<Option<f64>, SkipReason> {
    match element.attr(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_number(raw)
            .map(Some)
            .ok_or(SkipReason::InvalidNumber(key)),
    }
}

fn interval(element: &SourceElement) -> Result<(NaiveDateTime, NaiveDateTime), SkipReason> {
    let start = parse_instant(required(element, "startDate")?)
        .ok_or(SkipReason::InvalidTimestamp("startDate"))?;
    let end = parse_instant(required(element, "endDate")?)
        .ok_or(SkipReason::InvalidTimestamp("endDate"))?;
    if end.is_before(&start) {
        return Err(SkipReason::EndBeforeStart);
    }
    Ok((start.local, end.local))
}

/// Convert a `<Record>` element
pub fn parse_record(element: &SourceElement) -> Result<ParsedRecord, SkipReason> {
    let normalized = normalize_type(required(element, "type")?);
    let (start_date, end_date) = interval(element)?;
    let source_name = required(element, "sourceName")?.to_string();

    let (value, value_category) = match element.attr("value").map(str::trim) {
        None | Some("") => (None, None),
        Some(raw) => match parse_number(raw) {
            Some(v) => (Some(v), None),
            None if normalized.kind.is_quantitative() => {
                return Err(SkipReason::InvalidNumber("value"))
            }
            None => (None, normalize_category_value(raw)),
        },
    };
    if value.is_none() && normalized.kind.is_quantitative() {
        return Err(SkipReason::MissingValue);
    }

    Ok(ParsedRecord {
        recognized_type: normalized.is_recognized(),
        record: HealthRecord {
            record_type: normalized.name,
            value,
            value_category,
            unit: element.attr("unit").map(str::to_string),
            start_date,
            end_date,
            source_name,
        },
    })
}

/// Convert a `<Workout>` element. Coordinates are left empty for the caller to resolve.
pub fn parse_workout(element: &SourceElement) -> Result<ParsedWorkout, SkipReason> {
    let normalized = normalize_workout_type(required(element, "workoutActivityType")?);
    let (start_date, end_date) = interval(element)?;
    let source_name = required(element, "sourceName")?.to_string();

    let duration_min = optional_number(element, "duration")?
        .map(|d| duration_to_minutes(d, element.attr("durationUnit")));

    let distance_km = match optional_number(element, "totalDistance")? {
        Some(d) => Some(distance_to_km(d, element.attr("totalDistanceUnit"))),
        None => statistic(element, |t| t.contains("Distance"))?
            .map(|(sum, unit)| distance_to_km(sum, unit)),
    };

    let energy_kcal = match optional_number(element, "totalEnergyBurned")? {
        Some(e) => Some(energy_to_kcal(e, element.attr("totalEnergyBurnedUnit"))),
        None => statistic(element, |t| t == ACTIVE_ENERGY_TYPE)?
            .map(|(sum, unit)| energy_to_kcal(sum, unit)),
    };

    let route = route_reference(element).map(|reference| RouteReference {
        workout_start: start_date,
        source_name: source_name.clone(),
        reference,
    });

    Ok(ParsedWorkout {
        recognized_type: normalized.is_recognized(),
        route,
        workout: Workout {
            workout_type: normalized.name,
            start_date,
            end_date,
            duration_min,
            distance_km,
            energy_kcal,
            source_name,
            start: None,
        },
    })
}

/// `sum` and `unit` of the first `<WorkoutStatistics>` child whose type matches
fn statistic<'a>(
    element: &'a SourceElement,
    type_matches: impl Fn(&str) -> bool,
) -> Result<Option<(f64, Option<&'a str>)>, SkipReason> {
    let Some(stat) = element
        .children_named(WORKOUT_STATISTICS)
        .find(|s| s.attr("type").is_some_and(&type_matches))
    else {
        return Ok(None);
    };
    Ok(optional_number(stat, "sum")?.map(|sum| (sum, stat.attr("unit"))))
}

/// The route file reference, from `<WorkoutRoute><FileReference path>` or a bare `<FileReference>`
fn route_reference(element: &SourceElement) -> Option<String> {
    let nested = element
        .children_named(WORKOUT_ROUTE)
        .flat_map(|route| route.children_named(FILE_REFERENCE));
    nested
        .chain(element.children_named(FILE_REFERENCE))
        .filter_map(|f| f.attr("path"))
        .map(str::trim)
        .find(|p| !p.is_empty())
        .map(str::to_string)
}
