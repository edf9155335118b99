//! Run configuration for the conversion pipeline

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{EtlError, Result};
use crate::routes::{MatchStrategy, MatchStrategyKind};
use crate::storage::segment_dir_for;

/// Rows buffered before a segment is flushed
pub const DEFAULT_BATCH_SIZE: usize = 500_000;

/// Top-level elements between progress log lines
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 500_000;

/// Output file name used when none is given
pub const DEFAULT_OUTPUT: &str = "health.parquet";

/// Route directory name inside an Apple Health export
pub const ROUTE_DIR_NAME: &str = "workout-routes";

/// Everything a conversion run needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub export_path: PathBuf,
    pub route_dir: PathBuf,
    pub output_path: PathBuf,
    pub batch_size: usize,
    /// Log progress every this many top-level elements; 0 disables it
    pub progress_interval: u64,
    /// Route matching strategies, tried in order
    pub strategies: Vec<MatchStrategyKind>,
}

impl PipelineConfig {
    /// Configuration with defaults for everything but the export path
    pub fn new(export_path: impl Into<PathBuf>) -> Self {
        let export_path = export_path.into();
        Self {
            route_dir: default_route_dir(&export_path),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            strategies: MatchStrategyKind::ALL.to_vec(),
            export_path,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output_path = output.into();
        self
    }

    pub fn with_route_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.route_dir = dir.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<MatchStrategyKind>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Where in-progress segments for this output live
    pub fn segment_dir(&self) -> PathBuf {
        segment_dir_for(&self.output_path)
    }

    /// Instantiate the configured strategies in order
    pub fn build_strategies(&self) -> Vec<Box<dyn MatchStrategy>> {
        self.strategies.iter().map(|kind| kind.build()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EtlError::config("batch size must be at least 1"));
        }
        if self.strategies.is_empty() {
            return Err(EtlError::config("at least one route matching strategy is required"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(EtlError::config("output path is empty"));
        }
        if self.output_path == self.export_path {
            return Err(EtlError::config("output path would overwrite the export"));
        }
        Ok(())
    }
}

/// `<export dir>/workout-routes`
pub fn default_route_dir(export_path: &Path) -> PathBuf {
    export_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(ROUTE_DIR_NAME)
}
