//! Type and category-value normalization
//!
//! Apple identifiers carry long prefixes (`HKQuantityTypeIdentifierHeartRate`).
//! The output keeps only the meaningful suffix so downstream queries can use
//! `type = 'HeartRate'`.

/// Which family of identifier a raw type belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Quantity,
    Category,
    Correlation,
    DataType,
    WorkoutActivity,
    /// No known prefix matched; the raw value was kept
    Unrecognized,
}

impl TypeKind {
    /// Quantity types must carry a numeric value
    pub fn is_quantitative(&self) -> bool {
        matches!(self, TypeKind::Quantity)
    }
}

/// Result of normalizing one raw type identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedType {
    pub name: String,
    pub kind: TypeKind,
}

impl NormalizedType {
    pub fn is_recognized(&self) -> bool {
        self.kind != TypeKind::Unrecognized
    }
}

const TYPE_PREFIXES: &[(&str, TypeKind)] = &[
    ("HKQuantityTypeIdentifier", TypeKind::Quantity),
    ("HKCategoryTypeIdentifier", TypeKind::Category),
    ("HKCorrelationTypeIdentifier", TypeKind::Correlation),
    ("HKDataType", TypeKind::DataType),
    ("HKWorkoutActivityType", TypeKind::WorkoutActivity),
];

/// Prefix given to every workout type so workouts never collide with point types
pub const WORKOUT_PREFIX: &str = "Workout";

// Longer prefixes first: the generic `HKCategoryValue` must not win over the specific ones
const CATEGORY_VALUE_PREFIXES: &[&str] = &[
    "HKCategoryValueSleepAnalysis",
    "HKCategoryValueAppleStandHour",
    "HKCategoryValueEnvironmentalAudioExposureEvent",
    "HKCategoryValue",
];

/// Strip the first recognized prefix from a raw type identifier.
///
/// Workout activity types become `Workout<suffix>`. When nothing matches (or
/// the identifier is only a prefix) the input is returned unchanged and
/// flagged as [`TypeKind::Unrecognized`].
pub fn normalize_type(raw: &str) -> NormalizedType {
    for (prefix, kind) in TYPE_PREFIXES {
        if let Some(suffix) = raw.strip_prefix(prefix) {
            if suffix.is_empty() {
                break;
            }
            let name = match kind {
                TypeKind::WorkoutActivity => format!("{WORKOUT_PREFIX}{suffix}"),
                _ => suffix.to_string(),
            };
            return NormalizedType { name, kind: *kind };
        }
    }
    NormalizedType {
        name: raw.to_string(),
        kind: TypeKind::Unrecognized,
    }
}

/// Normalize a workout activity type, guaranteeing the `Workout` prefix even
/// for identifiers outside the known families.
pub fn normalize_workout_type(raw: &str) -> NormalizedType {
    let normalized = normalize_type(raw);
    if normalized.name.starts_with(WORKOUT_PREFIX) {
        return normalized;
    }
    NormalizedType {
        name: format!("{WORKOUT_PREFIX}{}", normalized.name),
        kind: normalized.kind,
    }
}

/// Strip Apple's prefixes from a category value, e.g.
/// `HKCategoryValueSleepAnalysisAsleepCore` becomes `AsleepCore`.
pub fn normalize_category_value(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let stripped = CATEGORY_VALUE_PREFIXES
        .iter()
        .find_map(|prefix| raw.strip_prefix(prefix).filter(|s| !s.is_empty()))
        .unwrap_or(raw);
    Some(stripped.to_string())
}
