//! Storage layer for the unified health dataset
//!
//! Rows are written in bounded batches to numbered segment files and merged
//! into a single Parquet file at the end of a run.
//!
//! ## Storage Layout
//!
//! ```text
//! out/
//! ├── health.parquet                 # Final dataset (appears only on success)
//! └── .health.parquet.segments/      # Present while a run is in progress
//!     ├── segment-000000.parquet
//!     ├── segment-000001.parquet
//!     └── ...
//! ```
//!
//! ## Atomic Writes
//!
//! Every file is written to a `.tmp` sibling, synced, and renamed into place,
//! so readers never see a partially written segment or output. External tools
//! can query the result directly, e.g. with DuckDB:
//!
//! ```sql
//! SELECT type, count(*) FROM 'health.parquet' GROUP BY type;
//! ```

mod parquet;
mod writer;

pub use parquet::{
    batch_to_rows, count_rows, open_batches, read_rows, rows_to_batch, schema, write_batches,
    writer_properties,
};
pub use writer::{
    clean_segments, list_segments, merge_segments, segment_dir_for, ChunkedWriter, MergeOutcome,
};
