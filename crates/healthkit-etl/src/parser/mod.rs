//! Streaming parser for Apple Health `export.xml`
//!
//! [`RecordStream`] reads the export one top-level element at a time and
//! yields an [`OutputRow`] for every valid `<Record>` and `<Workout>`, in
//! document order. Malformed elements are counted and skipped; only a broken
//! document structure ends the stream with an error.
//!
//! Memory is bounded by one element's subtree plus the route index, so the
//! stream is safe to run over multi-gigabyte exports.

mod convert;
pub mod fields;
mod reader;

use std::collections::{BTreeMap, HashSet};
use std::io::Read;

use serde::Serialize;

pub use convert::{parse_record, parse_workout, ParsedRecord, ParsedWorkout, SkipReason};
pub use reader::{ExportReader, SourceElement, RECORD_ELEMENT, ROOT_ELEMENT, WORKOUT_ELEMENT};

use crate::error::Result;
use crate::models::{OutputRow, RouteReference};
use crate::routes::RouteIndex;

/// Top-level elements that are expected in an export but carry no rows
const KNOWN_IGNORED: &[&str] = &[
    "ExportDate",
    "Me",
    "ActivitySummary",
    "Correlation",
    "ClinicalRecord",
    "Audiogram",
    "VisionPrescription",
];

/// Counters for one pass over the export
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseStats {
    /// `<Record>` elements seen (emitted or skipped)
    pub records_seen: u64,
    /// `<Workout>` elements seen (emitted or skipped)
    pub workouts_seen: u64,
    pub records_emitted: u64,
    pub workouts_emitted: u64,
    pub skipped: u64,
    /// Other top-level elements (`ActivitySummary`, `Correlation`, ...), never emitted
    pub ignored: u64,
    /// Emitted rows whose type had no recognized prefix
    pub unrecognized_types: u64,
    pub workouts_with_route: u64,
    pub workouts_with_coordinates: u64,
    pub workouts_without_coordinates: u64,
    /// Route references that did not produce a coordinate
    pub unresolved_routes: u64,
    pub skip_reasons: BTreeMap<String, u64>,
}

impl ParseStats {
    /// Point and workout elements seen; always `rows_emitted() + skipped`
    pub fn elements_seen(&self) -> u64 {
        self.records_seen + self.workouts_seen
    }

    pub fn rows_emitted(&self) -> u64 {
        self.records_emitted + self.workouts_emitted
    }

    fn skip(&mut self, element: &SourceElement, reason: SkipReason) {
        self.skipped += 1;
        *self.skip_reasons.entry(reason.to_string()).or_default() += 1;
        tracing::debug!("Skipping <{}> #{}: {}", element.name, element.index, reason);
    }
}

/// Lazy, forward-only sequence of output rows
pub struct RecordStream<R: Read> {
    reader: ExportReader<R>,
    routes: RouteIndex,
    stats: ParseStats,
    unknown_elements: HashSet<String>,
    done: bool,
}

impl<R: Read> RecordStream<R> {
    /// Open the stream, validating the document root before any row is produced
    pub fn new(reader: R, routes: RouteIndex) -> Result<Self> {
        Ok(Self {
            reader: ExportReader::new(reader)?,
            routes,
            stats: ParseStats::default(),
            unknown_elements: HashSet::new(),
            done: false,
        })
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    pub fn routes(&self) -> &RouteIndex {
        &self.routes
    }

    /// Consume the stream, returning the route index and final counters
    pub fn into_parts(self) -> (RouteIndex, ParseStats) {
        (self.routes, self.stats)
    }

    fn convert(&mut self, element: SourceElement) -> Option<OutputRow> {
        match element.name.as_str() {
            RECORD_ELEMENT => {
                self.stats.records_seen += 1;
                match parse_record(&element) {
                    Ok(parsed) => {
                        self.stats.records_emitted += 1;
                        if !parsed.recognized_type {
                            self.stats.unrecognized_types += 1;
                        }
                        Some(parsed.record.into())
                    }
                    Err(reason) => {
                        self.stats.skip(&element, reason);
                        None
                    }
                }
            }
            WORKOUT_ELEMENT => {
                self.stats.workouts_seen += 1;
                match parse_workout(&element) {
                    Ok(parsed) => {
                        let ParsedWorkout {
                            mut workout,
                            route,
                            recognized_type,
                        } = parsed;
                        if let Some(route) = route {
                            workout.start = self.resolve(&route);
                        }
                        self.stats.workouts_emitted += 1;
                        if !recognized_type {
                            self.stats.unrecognized_types += 1;
                        }
                        if workout.start.is_some() {
                            self.stats.workouts_with_coordinates += 1;
                        } else {
                            self.stats.workouts_without_coordinates += 1;
                        }
                        Some(workout.into())
                    }
                    Err(reason) => {
                        self.stats.skip(&element, reason);
                        None
                    }
                }
            }
            other => {
                self.stats.ignored += 1;
                if !KNOWN_IGNORED.contains(&other) && self.unknown_elements.insert(other.to_string()) {
                    tracing::warn!("Ignoring unknown top-level element <{}>", other);
                }
                None
            }
        }
    }

    fn resolve(&mut self, route: &RouteReference) -> Option<crate::models::Coordinate> {
        self.stats.workouts_with_route += 1;
        let resolution = self.routes.resolve(route);
        if !resolution.is_resolved() {
            self.stats.unresolved_routes += 1;
        }
        resolution.coordinate()
    }
}

impl<R: Read> Iterator for RecordStream<R> {
    type Item = Result<OutputRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let element = match self.reader.next_element() {
                Ok(Some(element)) => element,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if let Some(row) = self.convert(element) {
                return Some(Ok(row));
            }
        }
    }
}
