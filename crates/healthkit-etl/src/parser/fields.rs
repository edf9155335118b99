//! Attribute parsing and unit conversion for export elements

use chrono::{DateTime, FixedOffset, NaiveDateTime};

const TIMESTAMP_WITH_OFFSET: &str = "%Y-%m-%d %H:%M:%S %z";
const TIMESTAMP_NAIVE: &str = "%Y-%m-%d %H:%M:%S";

const KM_PER_MILE: f64 = 1.609344;
const KM_PER_YARD: f64 = 0.0009144;
const KJ_PER_KCAL: f64 = 4.184;

/// An export timestamp: the wall-clock time that gets stored, plus the
/// absolute instant when the source carried an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub local: NaiveDateTime,
    pub instant: Option<DateTime<FixedOffset>>,
}

impl Timestamp {
    /// Whether `self` is earlier than `other`. Instants are compared when both
    /// sides have an offset, so an interval across a DST change is not reversed.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        match (self.instant, other.instant) {
            (Some(a), Some(b)) => a < b,
            _ => self.local < other.local,
        }
    }
}

/// Parse an export timestamp such as `2024-01-15 08:30:00 -0600`
pub fn parse_instant(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_str(raw, TIMESTAMP_WITH_OFFSET) {
        return Some(Timestamp {
            local: dt.naive_local(),
            instant: Some(dt),
        });
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_NAIVE)
        .ok()
        .map(|local| Timestamp {
            local,
            instant: None,
        })
}

/// The local wall-clock time of an export timestamp.
///
/// The offset is dropped, so a reading taken at 08:30 stays at 08:30
/// regardless of where it was recorded.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    parse_instant(raw).map(|t| t.local)
}

/// Parse a finite number; `NaN` and infinities are not numbers here
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a workout duration to minutes. Unknown units are taken as minutes.
pub fn duration_to_minutes(value: f64, unit: Option<&str>) -> f64 {
    match unit.map(|u| u.trim().to_lowercase()).as_deref() {
        Some("s") | Some("sec") | Some("secs") | Some("second") | Some("seconds") => value / 60.0,
        Some("h") | Some("hr") | Some("hrs") | Some("hour") | Some("hours") => value * 60.0,
        _ => value,
    }
}

/// Convert a distance to kilometers. Unknown units are taken as kilometers.
pub fn distance_to_km(value: f64, unit: Option<&str>) -> f64 {
    match unit.map(|u| u.trim().to_lowercase()).as_deref() {
        Some("mi") => value * KM_PER_MILE,
        Some("m") => value / 1000.0,
        Some("yd") => value * KM_PER_YARD,
        _ => value,
    }
}

/// Convert energy to kilocalories. `Cal` is a kilocalorie; unknown units are taken as kcal.
pub fn energy_to_kcal(value: f64, unit: Option<&str>) -> f64 {
    match unit.map(str::trim) {
        Some(u) if u.eq_ignore_ascii_case("kj") => value / KJ_PER_KCAL,
        _ => value,
    }
}
