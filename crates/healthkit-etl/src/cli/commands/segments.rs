//! Recovery commands for segments left by an interrupted or failed run

use std::path::Path;

use serde::Serialize;

use crate::cli::{print_json, OutputFormat};
use crate::error::{EtlError, Result};
use crate::storage::{clean_segments, count_rows, list_segments, merge_segments, segment_dir_for};

#[derive(Debug, Serialize)]
struct MergeReport<'a> {
    output: &'a Path,
    segments: usize,
    rows: u64,
}

/// Merge leftover segments into `output`
pub fn merge(output: &Path, batch_size: usize, format: OutputFormat) -> Result<()> {
    let segment_dir = segment_dir_for(output);
    if list_segments(&segment_dir)?.is_empty() {
        return Err(EtlError::invalid_param(format!(
            "No segments to merge in {}",
            segment_dir.display()
        )));
    }

    let outcome = merge_segments(&segment_dir, output, batch_size)?;
    let report = MergeReport {
        output,
        segments: outcome.segments,
        rows: count_rows(output)?,
    };

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            println!(
                "Merged {} segment(s) into {} ({} rows)",
                report.segments,
                output.display(),
                report.rows
            );
            Ok(())
        }
    }
}

/// Discard leftover segments for `output`
pub fn clean(output: &Path) -> Result<()> {
    let segment_dir = segment_dir_for(output);
    if !segment_dir.exists() {
        println!("Nothing to clean for {}", output.display());
        return Ok(());
    }
    let removed = clean_segments(&segment_dir)?;
    println!("Removed {} segment(s) from {}", removed, segment_dir.display());
    Ok(())
}
