//! Route diagnostics: how every workout's route reference resolves

use std::fs::File;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::cli::{print_json, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::models::RouteReference;
use crate::parser::{parse_workout, ExportReader, WORKOUT_ELEMENT};
use crate::routes::{Resolution, RouteCatalog, RouteIndex, RouteStats};

/// One workout's route reference and what it resolved to
#[derive(Debug, Clone, Serialize)]
pub struct RouteDiagnostic {
    pub workout_start: NaiveDateTime,
    pub source_name: String,
    pub reference: String,
    pub outcome: &'static str,
    pub strategy: Option<&'static str>,
    pub path: Option<PathBuf>,
    pub candidates: Option<usize>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl RouteDiagnostic {
    fn new(reference: RouteReference, resolution: Resolution) -> Self {
        let mut diag = Self {
            workout_start: reference.workout_start,
            source_name: reference.source_name,
            reference: reference.reference,
            outcome: "not found",
            strategy: None,
            path: None,
            candidates: None,
            lat: None,
            lon: None,
        };
        match resolution {
            Resolution::Resolved {
                path,
                coordinate,
                strategy,
            } => {
                diag.outcome = "resolved";
                diag.strategy = Some(strategy);
                diag.path = Some(path);
                diag.lat = Some(coordinate.lat);
                diag.lon = Some(coordinate.lon);
            }
            Resolution::Unusable { path, strategy } => {
                diag.outcome = "unusable";
                diag.strategy = Some(strategy);
                diag.path = Some(path);
            }
            Resolution::Ambiguous {
                strategy,
                candidates,
            } => {
                diag.outcome = "ambiguous";
                diag.strategy = Some(strategy);
                diag.candidates = Some(candidates);
            }
            Resolution::NotFound => {}
        }
        diag
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome == "resolved"
    }
}

/// Diagnostics for a whole export
#[derive(Debug, Clone, Serialize)]
pub struct RouteReport {
    pub route_dir: PathBuf,
    pub route_files: usize,
    pub strategies: Vec<&'static str>,
    pub stats: RouteStats,
    pub references: Vec<RouteDiagnostic>,
}

/// Stream the export and resolve every route reference, without writing output
pub fn collect(config: &PipelineConfig) -> Result<RouteReport> {
    config.validate()?;
    if !config.export_path.is_file() {
        return Err(EtlError::ExportNotFound(config.export_path.clone()));
    }

    let catalog = RouteCatalog::scan(&config.route_dir)?;
    let route_files = catalog.len();
    let mut index = RouteIndex::new(catalog, config.build_strategies());

    let mut reader = ExportReader::new(File::open(&config.export_path)?)?;
    let mut references = Vec::new();
    while let Some(element) = reader.next_element()? {
        if element.name != WORKOUT_ELEMENT {
            continue;
        }
        // Workouts that would be skipped produce no row, so their routes do not matter
        let Ok(parsed) = parse_workout(&element) else {
            continue;
        };
        if let Some(reference) = parsed.route {
            let resolution = index.resolve(&reference);
            references.push(RouteDiagnostic::new(reference, resolution));
        }
    }

    Ok(RouteReport {
        route_dir: config.route_dir.clone(),
        route_files,
        strategies: index.strategy_names(),
        stats: index.stats(),
        references,
    })
}

/// Print how each route reference resolves
pub fn diagnose(config: &PipelineConfig, unresolved_only: bool, format: OutputFormat) -> Result<()> {
    let mut report = collect(config)?;
    if unresolved_only {
        report.references.retain(|r| !r.is_resolved());
    }

    if format == OutputFormat::Json {
        return print_json(&report);
    }

    println!(
        "Route directory: {} ({} files)",
        report.route_dir.display(),
        report.route_files
    );
    println!("Strategies: {}", report.strategies.join(" -> "));
    println!();

    if report.references.is_empty() {
        println!("No route references to show.");
    } else {
        println!(
            "{:<19} {:<32} {:<10} {:<10} {:>10} {:>11}",
            "Workout", "Reference", "Outcome", "Strategy", "Lat", "Lon"
        );
        println!("{}", "-".repeat(97));
        for r in &report.references {
            println!(
                "{:<19} {:<32} {:<10} {:<10} {:>10} {:>11}",
                r.workout_start.format("%Y-%m-%d %H:%M:%S"),
                truncate(&r.reference, 32),
                r.outcome,
                r.strategy.unwrap_or("-"),
                r.lat.map(|v| format!("{:.5}", v)).unwrap_or_else(|| "-".to_string()),
                r.lon.map(|v| format!("{:.5}", v)).unwrap_or_else(|| "-".to_string()),
            );
        }
    }

    let s = &report.stats;
    println!(
        "\n{} resolved, {} not found, {} ambiguous, {} unusable ({} files opened)",
        s.resolved, s.not_found, s.ambiguous, s.unusable, s.files_opened
    );
    Ok(())
}

/// Keep the tail of long references; the file name is the useful part
fn truncate(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(len - (max_len - 3)).collect();
        format!("...{}", tail)
    }
}
