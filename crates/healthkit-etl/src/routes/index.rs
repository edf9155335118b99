//! Route index: reference → file → first coordinate

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::catalog::RouteCatalog;
use super::coordinates::first_trackpoint_in_file;
use super::strategy::{default_strategies, MatchStrategy};
use crate::models::{Coordinate, RouteReference};

/// Outcome of matching one reference against the catalog
#[derive(Debug, Clone, PartialEq)]
enum FileMatch {
    Unique { path: PathBuf, strategy: &'static str },
    Ambiguous { strategy: &'static str, candidates: usize },
    NotFound,
}

/// Outcome of resolving a workout's route reference to a coordinate
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A unique file matched and yielded a first trackpoint
    Resolved {
        path: PathBuf,
        coordinate: Coordinate,
        strategy: &'static str,
    },
    /// A unique file matched but could not be opened or had no trackpoint
    Unusable { path: PathBuf, strategy: &'static str },
    /// The first strategy with candidates found more than one; nothing is guessed
    Ambiguous { strategy: &'static str, candidates: usize },
    /// No strategy found a candidate
    NotFound,
}

impl Resolution {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Resolution::Resolved { coordinate, .. } => Some(*coordinate),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }
}

/// Per-reference resolution counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    pub resolved: u64,
    pub not_found: u64,
    pub ambiguous: u64,
    pub unusable: u64,
    /// Route files actually opened; never exceeds the number of distinct matched files
    pub files_opened: u64,
}

impl RouteStats {
    /// References that did not produce a coordinate, for any reason
    pub fn unresolved(&self) -> u64 {
        self.not_found + self.ambiguous + self.unusable
    }
}

/// Lookup tables built once per run and shared by every workout
///
/// Both maps grow with the number of distinct route references and files,
/// never with the number of records in the export.
pub struct RouteIndex {
    catalog: RouteCatalog,
    strategies: Vec<Box<dyn MatchStrategy>>,
    matches: HashMap<String, FileMatch>,
    coordinates: HashMap<PathBuf, Coordinate>,
    unusable: HashSet<PathBuf>,
    stats: RouteStats,
}

impl RouteIndex {
    pub fn new(catalog: RouteCatalog, strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self {
            catalog,
            strategies,
            matches: HashMap::new(),
            coordinates: HashMap::new(),
            unusable: HashSet::new(),
            stats: RouteStats::default(),
        }
    }

    /// Index over `catalog` using the default exact → extension → substring chain
    pub fn with_default_strategies(catalog: RouteCatalog) -> Self {
        Self::new(catalog, default_strategies())
    }

    /// An index with no route files; every reference resolves to `NotFound`
    pub fn empty() -> Self {
        Self::with_default_strategies(RouteCatalog::default())
    }

    /// Resolve a workout's route reference, opening the route file only the
    /// first time its path is seen.
    pub fn resolve(&mut self, reference: &RouteReference) -> Resolution {
        let file_match = match self.matches.get(&reference.reference) {
            Some(m) => m.clone(),
            None => {
                let m = self.match_reference(reference);
                self.matches.insert(reference.reference.clone(), m.clone());
                m
            }
        };

        let resolution = match file_match {
            FileMatch::NotFound => Resolution::NotFound,
            FileMatch::Ambiguous {
                strategy,
                candidates,
            } => Resolution::Ambiguous {
                strategy,
                candidates,
            },
            FileMatch::Unique { path, strategy } => match self.coordinate_for(&path) {
                Some(coordinate) => Resolution::Resolved {
                    path,
                    coordinate,
                    strategy,
                },
                None => Resolution::Unusable { path, strategy },
            },
        };

        match &resolution {
            Resolution::Resolved { .. } => self.stats.resolved += 1,
            Resolution::Unusable { .. } => self.stats.unusable += 1,
            Resolution::Ambiguous { .. } => self.stats.ambiguous += 1,
            Resolution::NotFound => self.stats.not_found += 1,
        }
        tracing::debug!(
            "Route {} ({} from {}): {:?}",
            reference.reference,
            reference.workout_start,
            reference.source_name,
            resolution
        );
        resolution
    }

    /// The resolved file for a reference string, if it has been resolved uniquely
    pub fn path_for(&self, reference: &str) -> Option<&Path> {
        match self.matches.get(reference) {
            Some(FileMatch::Unique { path, .. }) => Some(path.as_path()),
            _ => None,
        }
    }

    /// The cached first coordinate of a route file
    pub fn coordinate_at(&self, path: &Path) -> Option<Coordinate> {
        self.coordinates.get(path).copied()
    }

    pub fn stats(&self) -> RouteStats {
        self.stats
    }

    pub fn catalog(&self) -> &RouteCatalog {
        &self.catalog
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn match_reference(&self, reference: &RouteReference) -> FileMatch {
        for strategy in &self.strategies {
            let candidates: Vec<&Path> = self
                .catalog
                .files()
                .iter()
                .filter(|f| strategy.matches(reference, f))
                .map(|f| f.path.as_path())
                .collect();

            match candidates.as_slice() {
                [] => continue,
                [path] => {
                    return FileMatch::Unique {
                        path: path.to_path_buf(),
                        strategy: strategy.name(),
                    }
                }
                many => {
                    return FileMatch::Ambiguous {
                        strategy: strategy.name(),
                        candidates: many.len(),
                    }
                }
            }
        }
        FileMatch::NotFound
    }

    fn coordinate_for(&mut self, path: &Path) -> Option<Coordinate> {
        if let Some(coordinate) = self.coordinates.get(path) {
            return Some(*coordinate);
        }
        if self.unusable.contains(path) {
            return None;
        }

        self.stats.files_opened += 1;
        match first_trackpoint_in_file(path) {
            Ok(Some(coordinate)) => {
                self.coordinates.insert(path.to_path_buf(), coordinate);
                Some(coordinate)
            }
            Ok(None) => {
                tracing::warn!("Route file {} has no usable trackpoint", path.display());
                self.unusable.insert(path.to_path_buf());
                None
            }
            Err(e) => {
                tracing::warn!("Could not open route file {}: {}", path.display(), e);
                self.unusable.insert(path.to_path_buf());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{ExactFileName, MatchStrategyKind};
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn gpx(points: &[(f64, f64)]) -> String {
        let pts: String = points
            .iter()
            .map(|(lat, lon)| format!(r#"<trkpt lat="{lat}" lon="{lon}"><ele>1.0</ele></trkpt>"#))
            .collect();
        format!(r#"<?xml version="1.0"?><gpx version="1.1" creator="test"><trk><trkseg>{pts}</trkseg></trk></gpx>"#)
    }

    fn reference(s: &str) -> RouteReference {
        RouteReference {
            workout_start: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
            source_name: "Apple Watch".to_string(),
            reference: s.to_string(),
        }
    }

    fn index_over(temp: &TempDir) -> RouteIndex {
        RouteIndex::with_default_strategies(RouteCatalog::scan(temp.path()).unwrap())
    }

    #[test]
    fn test_resolves_exact_file() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("route_123.gpx"),
            gpx(&[(37.1, -122.1), (37.2, -122.2)]),
        )
        .unwrap();

        let mut index = index_over(&temp);
        let resolution = index.resolve(&reference("/workout-routes/route_123.gpx"));

        assert_eq!(resolution.coordinate(), Some(Coordinate::new(37.1, -122.1)));
        assert!(matches!(resolution, Resolution::Resolved { strategy: "exact", .. }));

        let path = index.path_for("/workout-routes/route_123.gpx").unwrap().to_path_buf();
        assert_eq!(path, temp.path().join("route_123.gpx"));
        assert_eq!(index.coordinate_at(&path), Some(Coordinate::new(37.1, -122.1)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("route_123.gpx"), gpx(&[(1.0, 2.0)])).unwrap();

        let mut index = index_over(&temp);
        let resolution = index.resolve(&reference("route_999.gpx"));

        assert_eq!(resolution, Resolution::NotFound);
        assert_eq!(index.stats().not_found, 1);
        assert_eq!(index.stats().unresolved(), 1);
    }

    #[test]
    fn test_falls_back_through_strategies() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("route_2024-01-15.gpx"), gpx(&[(10.0, 20.0)])).unwrap();
        fs::write(temp.path().join("route_42.gpx"), gpx(&[(30.0, 40.0)])).unwrap();

        let mut index = index_over(&temp);

        let by_extension = index.resolve(&reference("/workout-routes/route_2024-01-15.xml"));
        assert!(matches!(by_extension, Resolution::Resolved { strategy: "extension", .. }));

        let by_substring = index.resolve(&reference("workout_route_42"));
        assert!(matches!(by_substring, Resolution::Resolved { strategy: "substring", .. }));
        assert_eq!(by_substring.coordinate(), Some(Coordinate::new(30.0, 40.0)));
    }

    #[test]
    fn test_same_hour_routes_resolve_by_substring() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("route_2024-01-12_7.00am.gpx"), gpx(&[(5.0, 6.0)])).unwrap();
        fs::write(temp.path().join("route_2024-01-12_7.45am.gpx"), gpx(&[(7.0, 8.0)])).unwrap();

        let mut index = index_over(&temp);
        let resolution = index.resolve(&reference("2024-01-12_7.00am"));

        assert!(matches!(resolution, Resolution::Resolved { strategy: "substring", .. }));
        assert_eq!(resolution.coordinate(), Some(Coordinate::new(5.0, 6.0)));
        assert_eq!(index.stats().ambiguous, 0);
    }

    #[test]
    fn test_multiple_candidates_are_not_guessed() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("route_123.gpx"), gpx(&[(1.0, 1.0)])).unwrap();
        fs::write(temp.path().join("route_1234.gpx"), gpx(&[(2.0, 2.0)])).unwrap();

        let mut index = index_over(&temp);
        let resolution = index.resolve(&reference("123"));

        assert_eq!(
            resolution,
            Resolution::Ambiguous {
                strategy: "substring",
                candidates: 2
            }
        );
        assert!(resolution.coordinate().is_none());
        assert_eq!(index.stats().ambiguous, 1);
        assert_eq!(index.stats().files_opened, 0);
    }

    #[test]
    fn test_single_strategy_misses_other_reference_shapes() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("route_123.gpx"), gpx(&[(1.0, 1.0)])).unwrap();

        let catalog = RouteCatalog::scan(temp.path()).unwrap();
        let mut exact_only = RouteIndex::new(catalog.clone(), vec![Box::new(ExactFileName)]);
        assert_eq!(exact_only.resolve(&reference("route_123")), Resolution::NotFound);

        let chain = MatchStrategyKind::ALL.iter().map(|k| k.build()).collect();
        let mut full = RouteIndex::new(catalog, chain);
        assert!(full.resolve(&reference("route_123")).is_resolved());
    }

    #[test]
    fn test_route_file_opened_once() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("route_123.gpx"), gpx(&[(1.0, 1.0)])).unwrap();
        fs::write(temp.path().join("empty.gpx"), "").unwrap();

        let mut index = index_over(&temp);
        for _ in 0..3 {
            assert!(index.resolve(&reference("route_123.gpx")).is_resolved());
            // Two reference spellings, same file
            assert!(index.resolve(&reference("/workout-routes/route_123.gpx")).is_resolved());
        }
        for _ in 0..3 {
            assert!(matches!(
                index.resolve(&reference("empty.gpx")),
                Resolution::Unusable { .. }
            ));
        }

        let stats = index.stats();
        assert_eq!(stats.files_opened, 2);
        assert_eq!(stats.resolved, 6);
        assert_eq!(stats.unusable, 3);
    }

    #[test]
    fn test_empty_index() {
        let mut index = RouteIndex::empty();
        assert_eq!(index.resolve(&reference("route_1.gpx")), Resolution::NotFound);
        assert!(index.catalog().is_empty());
    }
}
