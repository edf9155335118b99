//! Convert command for healthkit

use crate::cli::{print_json, OutputFormat};
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result};
use crate::pipeline::{self, CancelToken, RunSummary};

/// Run a conversion, stopping cleanly on Ctrl-C
pub async fn run(config: PipelineConfig, format: OutputFormat) -> Result<()> {
    let cancel = CancelToken::new();

    let signal_token = cancel.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, flushing the current batch");
            signal_token.cancel();
        }
    });

    let result = tokio::task::spawn_blocking(move || pipeline::run(&config, &cancel))
        .await
        .map_err(|e| EtlError::storage(format!("Conversion task failed: {}", e)))?;
    signal.abort();

    let summary = result?;
    print_summary(&summary, format)?;

    if summary.is_complete() {
        return Ok(());
    }
    match summary.segment_dir {
        Some(dir) => Err(EtlError::Interrupted(dir)),
        None => Err(EtlError::Cancelled),
    }
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            println!("{}", summary);
            Ok(())
        }
    }
}
