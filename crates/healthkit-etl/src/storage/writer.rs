//! Bounded-memory writer: rows are buffered into batches, each batch is
//! flushed to a numbered segment file, and segments are merged into the final
//! output once the stream ends.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EtlError, Result};
use crate::models::OutputRow;

use super::parquet::{open_batches, rows_to_batch, temp_path_for, write_batches, writer_properties};

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".parquet";

/// Segment directory for an output file: `<dir>/.<file name>.segments`
pub fn segment_dir_for(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!(".{}.segments", name))
}

fn segment_path(dir: &Path, number: usize) -> PathBuf {
    dir.join(format!("{}{:06}{}", SEGMENT_PREFIX, number, SEGMENT_SUFFIX))
}

/// Completed segments in `dir`, in write order. Temp files are ignored.
pub fn list_segments(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_segment = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(SEGMENT_PREFIX) && n.ends_with(SEGMENT_SUFFIX));
        if is_segment && path.is_file() {
            segments.push(path);
        }
    }
    // Zero-padded numbers sort in write order
    segments.sort();
    Ok(segments)
}

/// Outcome of merging segments into the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub segments: usize,
    /// The single segment was renamed into place without re-encoding
    pub renamed: bool,
}

/// Combine every segment in `segment_dir` into `output`, preserving order.
///
/// The output is replaced atomically and the segment directory is removed
/// afterwards. With no segments an empty file carrying the schema is written.
pub fn merge_segments(segment_dir: &Path, output: &Path, row_group_size: usize) -> Result<MergeOutcome> {
    let segments = list_segments(segment_dir)?;

    let renamed = match segments.as_slice() {
        [] => {
            write_batches(output, std::iter::empty(), writer_properties(row_group_size))?;
            false
        }
        [single] => {
            fs::rename(single, output).map_err(|e| {
                EtlError::storage(format!("Failed to move {:?} into place: {}", single, e))
            })?;
            true
        }
        many => {
            merge_many(many, output, row_group_size)?;
            false
        }
    };

    remove_segment_dir(segment_dir)?;
    tracing::info!(
        "Merged {} segment(s) into {}",
        segments.len(),
        output.display()
    );
    Ok(MergeOutcome {
        segments: segments.len(),
        renamed,
    })
}

fn merge_many(segments: &[PathBuf], output: &Path, row_group_size: usize) -> Result<()> {
    use parquet::arrow::ArrowWriter;

    let temp_path = temp_path_for(output);
    let file = fs::File::create(&temp_path)
        .map_err(|e| EtlError::storage(format!("Failed to create temp file: {}", e)))?;
    let sync_handle = file
        .try_clone()
        .map_err(|e| EtlError::storage(format!("Failed to open temp file: {}", e)))?;

    let mut writer = ArrowWriter::try_new(
        file,
        super::parquet::schema(),
        Some(writer_properties(row_group_size)),
    )
    .map_err(|e| EtlError::storage(format!("Failed to create Parquet writer: {}", e)))?;

    // One batch in memory at a time
    for segment in segments {
        tracing::debug!("Merging {}", segment.display());
        for batch in open_batches(segment)? {
            writer
                .write(&batch?)
                .map_err(|e| EtlError::storage(format!("Failed to write batch: {}", e)))?;
        }
    }
    writer
        .close()
        .map_err(|e| EtlError::storage(format!("Failed to close writer: {}", e)))?;
    sync_handle
        .sync_all()
        .map_err(|e| EtlError::storage(format!("Failed to sync temp file: {}", e)))?;

    fs::rename(&temp_path, output)
        .map_err(|e| EtlError::storage(format!("Failed to rename temp file: {}", e)))?;

    for segment in segments {
        fs::remove_file(segment)?;
    }
    Ok(())
}

fn remove_segment_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| {
            EtlError::storage(format!("Failed to remove segment directory {:?}: {}", dir, e))
        })?;
    }
    Ok(())
}

/// Delete leftover segments without merging them. Returns how many were removed.
pub fn clean_segments(segment_dir: &Path) -> Result<usize> {
    let count = list_segments(segment_dir)?.len();
    remove_segment_dir(segment_dir)?;
    Ok(count)
}

/// Buffers rows and flushes each full batch to its own segment file
pub struct ChunkedWriter {
    output: PathBuf,
    segment_dir: PathBuf,
    batch_size: usize,
    buffer: Vec<OutputRow>,
    segments_written: usize,
    rows_written: u64,
}

impl ChunkedWriter {
    /// Prepare to write `output`. Fails if segments from an earlier run remain.
    pub fn create(output: &Path, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(EtlError::invalid_param("batch size must be at least 1"));
        }
        let segment_dir = segment_dir_for(output);
        if !list_segments(&segment_dir)?.is_empty() {
            return Err(EtlError::StaleSegments(segment_dir));
        }
        // Only temp files can be left here; they are never part of a result
        remove_segment_dir(&segment_dir)?;
        fs::create_dir_all(&segment_dir).map_err(|e| {
            EtlError::storage(format!("Failed to create directory {:?}: {}", segment_dir, e))
        })?;

        Ok(Self {
            output: output.to_path_buf(),
            segment_dir,
            batch_size,
            buffer: Vec::with_capacity(batch_size.min(65_536)),
            segments_written: 0,
            rows_written: 0,
        })
    }

    /// Add a row, flushing first if the buffer is full
    pub fn push(&mut self, row: OutputRow) -> Result<()> {
        self.buffer.push(row);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write buffered rows as the next segment. Does nothing when empty.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let number = self.segments_written;
        let path = segment_path(&self.segment_dir, number);

        let batch = rows_to_batch(&self.buffer).map_err(|e| EtlError::batch_write(number, e.to_string()))?;
        write_batches(&path, [&batch], writer_properties(self.batch_size))
            .map_err(|e| EtlError::batch_write(number, e.to_string()))?;

        tracing::debug!("Wrote segment {} ({} rows)", number, self.buffer.len());
        self.rows_written += self.buffer.len() as u64;
        self.segments_written += 1;
        self.buffer.clear();
        Ok(())
    }

    pub fn segments_written(&self) -> usize {
        self.segments_written
    }

    /// Rows already persisted to segments
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn segment_dir(&self) -> &Path {
        &self.segment_dir
    }

    /// Flush the last batch and merge every segment into the output file
    pub fn finish(mut self) -> Result<MergeOutcome> {
        self.flush()?;
        merge_segments(&self.segment_dir, &self.output, self.batch_size)
    }

    /// Flush the last batch and stop without merging. Segments stay on disk and
    /// their directory is returned; with no segments the directory is removed.
    pub fn abandon(mut self) -> Result<Option<PathBuf>> {
        self.flush()?;
        if self.segments_written == 0 {
            fs::remove_dir_all(&self.segment_dir)?;
            tracing::warn!("Stopped before any rows were written");
            return Ok(None);
        }
        tracing::warn!(
            "Stopped after {} segment(s); left in {}",
            self.segments_written,
            self.segment_dir.display()
        );
        Ok(Some(self.segment_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::parquet::read_rows;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn row(n: u32) -> OutputRow {
        let t = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::minutes(n as i64);
        OutputRow {
            row_type: "StepCount".to_string(),
            value: Some(n as f64),
            value_category: None,
            unit: Some("count".to_string()),
            start_date: t,
            end_date: t,
            duration_min: None,
            distance_km: None,
            energy_kcal: None,
            source_name: "Phone".to_string(),
            start_lat: None,
            start_lon: None,
        }
    }

    #[test]
    fn test_segment_dir_naming() {
        assert_eq!(
            segment_dir_for(Path::new("/data/health.parquet")),
            Path::new("/data/.health.parquet.segments")
        );
        assert_eq!(
            segment_dir_for(Path::new("health.parquet")),
            Path::new(".health.parquet.segments")
        );
    }

    #[test]
    fn test_batches_become_ordered_segments() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("health.parquet");

        let mut writer = ChunkedWriter::create(&output, 3).unwrap();
        for n in 0..8 {
            writer.push(row(n)).unwrap();
        }
        assert_eq!(writer.segments_written(), 2);
        assert_eq!(writer.buffered(), 2);
        let segment_dir = writer.segment_dir().to_path_buf();

        let outcome = writer.finish().unwrap();
        assert_eq!(outcome.segments, 3);
        assert!(!outcome.renamed);
        assert!(!segment_dir.exists());

        let values: Vec<f64> = read_rows(&output)
            .unwrap()
            .iter()
            .map(|r| r.value.unwrap())
            .collect();
        assert_eq!(values, (0..8).map(|n| n as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_segment_is_renamed() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("health.parquet");

        let mut writer = ChunkedWriter::create(&output, 100).unwrap();
        writer.push(row(1)).unwrap();
        let outcome = writer.finish().unwrap();

        assert_eq!(outcome, MergeOutcome { segments: 1, renamed: true });
        assert_eq!(read_rows(&output).unwrap().len(), 1);
    }

    #[test]
    fn test_no_rows_still_produces_a_file() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("health.parquet");

        let outcome = ChunkedWriter::create(&output, 10).unwrap().finish().unwrap();
        assert_eq!(outcome.segments, 0);
        assert!(read_rows(&output).unwrap().is_empty());
    }

    #[test]
    fn test_abandon_keeps_segments_and_blocks_next_run() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("health.parquet");

        let mut writer = ChunkedWriter::create(&output, 2).unwrap();
        for n in 0..3 {
            writer.push(row(n)).unwrap();
        }
        let dir = writer.abandon().unwrap().unwrap();
        assert_eq!(list_segments(&dir).unwrap().len(), 2);
        assert!(!output.exists());

        let err = ChunkedWriter::create(&output, 2).err().unwrap();
        assert!(matches!(err, EtlError::StaleSegments(_)));

        merge_segments(&dir, &output, 2).unwrap();
        assert_eq!(read_rows(&output).unwrap().len(), 3);
    }

    #[test]
    fn test_abandon_without_rows_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("health.parquet");

        let writer = ChunkedWriter::create(&output, 2).unwrap();
        let dir = writer.segment_dir().to_path_buf();
        assert_eq!(writer.abandon().unwrap(), None);
        assert!(!dir.exists());
        assert!(ChunkedWriter::create(&output, 2).is_ok());
    }

    #[test]
    fn test_clean_discards_segments() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("health.parquet");

        let mut writer = ChunkedWriter::create(&output, 1).unwrap();
        writer.push(row(0)).unwrap();
        let dir = writer.abandon().unwrap().unwrap();

        assert_eq!(clean_segments(&dir).unwrap(), 1);
        assert!(!dir.exists());
        assert!(ChunkedWriter::create(&output, 1).is_ok());
    }

    #[test]
    fn test_leftover_temp_files_are_not_segments() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".health.parquet.segments");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("segment-000000.parquet.tmp"), b"partial").unwrap();

        assert!(list_segments(&dir).unwrap().is_empty());
        assert!(ChunkedWriter::create(&temp.path().join("health.parquet"), 5).is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(ChunkedWriter::create(&temp.path().join("h.parquet"), 0).is_err());
    }
}
