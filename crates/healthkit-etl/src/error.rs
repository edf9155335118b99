use std::path::PathBuf;

use thiserror::Error;

/// Main error type for healthkit-etl
///
/// Only fatal conditions live here. A malformed `Record` or an unresolvable
/// route is counted in the run statistics and never becomes an `EtlError`.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Export document not found: {}", .0.display())]
    ExportNotFound(PathBuf),

    #[error("Malformed export document at element {element}: {message}")]
    MalformedDocument { element: u64, message: String },

    #[error("Failed to write segment {segment}: {message}")]
    BatchWrite { segment: usize, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Segments from a previous run exist in {}", .0.display())]
    StaleSegments(PathBuf),

    #[error("Interrupted; completed segments kept in {}", .0.display())]
    Interrupted(PathBuf),

    #[error("Interrupted before any rows were written")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, EtlError>;

impl EtlError {
    /// Create a structural error for the top-level element at `element`
    pub fn malformed(element: u64, msg: impl Into<String>) -> Self {
        Self::MalformedDocument {
            element,
            message: msg.into(),
        }
    }

    /// Create a batch write error for segment number `segment`
    pub fn batch_write(segment: usize, msg: impl Into<String>) -> Self {
        Self::BatchWrite {
            segment,
            message: msg.into(),
        }
    }

    /// Create a storage error from a message
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid parameter error from a message
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Render an error for the terminal, with a hint on how to recover where one exists
pub fn format_user_error(err: &EtlError) -> String {
    match err {
        EtlError::StaleSegments(dir) => format!(
            "{}\n  Run 'healthkit merge' to combine them into the output, or \
             'healthkit clean' to discard them ({})",
            err,
            dir.display()
        ),
        EtlError::Interrupted(_) => format!(
            "{}\n  Run 'healthkit merge' to write the rows converted so far, or \
             'healthkit clean' before converting again",
            err
        ),
        EtlError::BatchWrite { .. } => format!(
            "{}\n  Segments written before the failure were kept; \
             'healthkit merge' can combine them once the cause is fixed",
            err
        ),
        EtlError::ExportNotFound(_) => format!(
            "{}\n  Pass the export.xml from an Apple Health export (Health app > Profile > Export All Health Data)",
            err
        ),
        _ => err.to_string(),
    }
}
