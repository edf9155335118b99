//! End-to-end conversion: export.xml + route files -> one Parquet dataset
//!
//! The run is strictly sequential. Route files are catalogued up front, the
//! export is streamed once, each emitted row goes into the chunked writer, and
//! the segments are merged when the stream ends.

mod progress;

pub use progress::{format_elapsed, format_eta, ConvertProgress, CountingReader};

use std::fmt;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::parser::{ParseStats, RecordStream};
use crate::routes::{RouteCatalog, RouteIndex, RouteStats};
use crate::storage::ChunkedWriter;

/// Cooperative cancellation flag, checked between elements
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Output file written
    Completed,
    /// Cancelled; segments were kept and no output was written
    Interrupted,
}

/// Statistics from a conversion run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub export_path: PathBuf,
    pub output_path: PathBuf,
    /// Segment directory left behind by an interrupted run
    pub segment_dir: Option<PathBuf>,
    pub rows_written: u64,
    pub segments: usize,
    pub route_files: usize,
    pub parse: ParseStats,
    pub routes: RouteStats,
    pub export_bytes: u64,
    pub output_bytes: Option<u64>,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.parse;
        match self.status {
            RunStatus::Completed => writeln!(f, "Wrote {}", self.output_path.display())?,
            RunStatus::Interrupted => writeln!(f, "Interrupted before the output was written")?,
        }
        writeln!(f, "{:<22} {}", "Rows", self.rows_written)?;
        writeln!(f, "{:<22} {}", "  Records", p.records_emitted)?;
        writeln!(f, "{:<22} {}", "  Workouts", p.workouts_emitted)?;
        writeln!(f, "{:<22} {}", "Skipped", p.skipped)?;
        for (reason, count) in &p.skip_reasons {
            writeln!(f, "  {:<20} {}", reason, count)?;
        }
        writeln!(f, "{:<22} {}", "Ignored elements", p.ignored)?;
        if p.unrecognized_types > 0 {
            writeln!(f, "{:<22} {}", "Unrecognized types", p.unrecognized_types)?;
        }
        writeln!(f, "{:<22} {}", "Route files", self.route_files)?;
        writeln!(
            f,
            "{:<22} {} resolved, {} unresolved ({} not found, {} ambiguous, {} unusable)",
            "Routes",
            self.routes.resolved,
            self.routes.unresolved(),
            self.routes.not_found,
            self.routes.ambiguous,
            self.routes.unusable
        )?;
        writeln!(
            f,
            "{:<22} {} with, {} without",
            "Workout coordinates", p.workouts_with_coordinates, p.workouts_without_coordinates
        )?;
        writeln!(f, "{:<22} {}", "Segments", self.segments)?;
        if let Some(dir) = &self.segment_dir {
            writeln!(f, "{:<22} {}", "Segment directory", dir.display())?;
        }
        if let Some(bytes) = self.output_bytes {
            writeln!(f, "{:<22} {}", "Output size", format_bytes(bytes))?;
        }
        write!(
            f,
            "{:<22} {}",
            "Elapsed",
            format_elapsed(std::time::Duration::from_secs_f64(self.elapsed_secs))
        )
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Convert the export described by `config`.
///
/// Fatal errors (missing export, broken document, failed segment write) abort
/// the run; segments already written are kept for `merge`. Cancellation flushes
/// the current batch and returns an `Interrupted` summary.
pub fn run(config: &PipelineConfig, cancel: &CancelToken) -> Result<RunSummary> {
    config.validate()?;
    if !config.export_path.is_file() {
        return Err(EtlError::ExportNotFound(config.export_path.clone()));
    }

    let catalog = RouteCatalog::scan(&config.route_dir)?;
    let route_files = catalog.len();
    let index = RouteIndex::new(catalog, config.build_strategies());

    let file = File::open(&config.export_path)?;
    let export_bytes = file.metadata()?.len();
    let progress = ConvertProgress::new(export_bytes, config.progress_interval);

    tracing::info!(
        "Converting {} ({}) with {} route file(s)",
        config.export_path.display(),
        format_bytes(export_bytes),
        route_files
    );

    let mut stream = RecordStream::new(progress.reader(file), index)?;
    let mut writer = ChunkedWriter::create(&config.output_path, config.batch_size)?;

    let mut interrupted = false;
    loop {
        if cancel.is_cancelled() {
            interrupted = true;
            break;
        }
        match stream.next() {
            Some(row) => writer.push(row?)?,
            None => break,
        }
        progress.maybe_report(stream.stats());
    }

    let (index, parse) = stream.into_parts();
    let rows_written = parse.rows_emitted();

    let (status, segments, segment_dir, output_bytes) = if interrupted {
        let segments = writer.segments_written() + usize::from(writer.buffered() > 0);
        let dir = writer.abandon()?;
        (RunStatus::Interrupted, segments, dir, None)
    } else {
        let outcome = writer.finish()?;
        let size = fs::metadata(&config.output_path)?.len();
        (RunStatus::Completed, outcome.segments, None, Some(size))
    };

    let summary = RunSummary {
        status,
        export_path: config.export_path.clone(),
        output_path: config.output_path.clone(),
        segment_dir,
        rows_written,
        segments,
        route_files,
        parse,
        routes: index.stats(),
        export_bytes,
        output_bytes,
        elapsed_secs: progress.elapsed().as_secs_f64(),
    };
    tracing::info!(
        "Finished: {} rows, {} skipped, {} of {} route reference(s) resolved in {}",
        summary.rows_written,
        summary.parse.skipped,
        summary.routes.resolved,
        summary.parse.workouts_with_route,
        progress.elapsed_str()
    );
    Ok(summary)
}
