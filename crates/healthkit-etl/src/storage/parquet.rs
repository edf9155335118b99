//! Parquet encoding of output rows
//!
//! Uses Arrow record batches for columnar storage. Every file written by this
//! crate (segments and the merged output) shares [`schema()`].

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::{EtlError, Result};
use crate::models::OutputRow;

/// The fixed output schema, identical for every run
pub fn schema() -> SchemaRef {
    let timestamp = DataType::Timestamp(TimeUnit::Microsecond, None);
    Arc::new(Schema::new(vec![
        Field::new("type", DataType::Utf8, false),
        Field::new("value", DataType::Float64, true),
        Field::new("value_category", DataType::Utf8, true),
        Field::new("unit", DataType::Utf8, true),
        Field::new("start_date", timestamp.clone(), false),
        Field::new("end_date", timestamp, false),
        Field::new("duration_min", DataType::Float64, true),
        Field::new("distance_km", DataType::Float64, true),
        Field::new("energy_kcal", DataType::Float64, true),
        Field::new("source_name", DataType::Utf8, false),
        Field::new("start_lat", DataType::Float64, true),
        Field::new("start_lon", DataType::Float64, true),
    ]))
}

/// Writer settings shared by segments and the merged file
pub fn writer_properties(row_group_size: usize) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .set_max_row_group_size(row_group_size.max(1))
        .build()
}

fn micros(t: &NaiveDateTime) -> i64 {
    t.and_utc().timestamp_micros()
}

pub fn rows_to_batch(rows: &[OutputRow]) -> Result<RecordBatch> {
    let row_type: StringArray = rows.iter().map(|r| Some(r.row_type.as_str())).collect();
    let value: Float64Array = rows.iter().map(|r| r.value).collect();
    let value_category: StringArray = rows.iter().map(|r| r.value_category.as_deref()).collect();
    let unit: StringArray = rows.iter().map(|r| r.unit.as_deref()).collect();
    let start_date: TimestampMicrosecondArray =
        rows.iter().map(|r| Some(micros(&r.start_date))).collect();
    let end_date: TimestampMicrosecondArray =
        rows.iter().map(|r| Some(micros(&r.end_date))).collect();
    let duration_min: Float64Array = rows.iter().map(|r| r.duration_min).collect();
    let distance_km: Float64Array = rows.iter().map(|r| r.distance_km).collect();
    let energy_kcal: Float64Array = rows.iter().map(|r| r.energy_kcal).collect();
    let source_name: StringArray = rows.iter().map(|r| Some(r.source_name.as_str())).collect();
    let start_lat: Float64Array = rows.iter().map(|r| r.start_lat).collect();
    let start_lon: Float64Array = rows.iter().map(|r| r.start_lon).collect();

    RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(row_type),
            Arc::new(value),
            Arc::new(value_category),
            Arc::new(unit),
            Arc::new(start_date),
            Arc::new(end_date),
            Arc::new(duration_min),
            Arc::new(distance_km),
            Arc::new(energy_kcal),
            Arc::new(source_name),
            Arc::new(start_lat),
            Arc::new(start_lon),
        ],
    )
    .map_err(|e| EtlError::storage(format!("Failed to create record batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, index: usize) -> Result<&'a T> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            EtlError::storage(format!(
                "Unexpected type for column '{}'",
                batch.schema().field(index).name()
            ))
        })
}

fn timestamp(array: &TimestampMicrosecondArray, i: usize) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_micros(array.value(i))
        .map(|t| t.naive_utc())
        .ok_or_else(|| EtlError::storage(format!("Timestamp out of range: {}", array.value(i))))
}

pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<OutputRow>> {
    if batch.num_columns() != schema().fields().len() {
        return Err(EtlError::storage(format!(
            "Expected {} columns, found {}",
            schema().fields().len(),
            batch.num_columns()
        )));
    }

    let row_type = column::<StringArray>(batch, 0)?;
    let value = column::<Float64Array>(batch, 1)?;
    let value_category = column::<StringArray>(batch, 2)?;
    let unit = column::<StringArray>(batch, 3)?;
    let start_date = column::<TimestampMicrosecondArray>(batch, 4)?;
    let end_date = column::<TimestampMicrosecondArray>(batch, 5)?;
    let duration_min = column::<Float64Array>(batch, 6)?;
    let distance_km = column::<Float64Array>(batch, 7)?;
    let energy_kcal = column::<Float64Array>(batch, 8)?;
    let source_name = column::<StringArray>(batch, 9)?;
    let start_lat = column::<Float64Array>(batch, 10)?;
    let start_lon = column::<Float64Array>(batch, 11)?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        rows.push(OutputRow {
            row_type: row_type.value(i).to_string(),
            value: value.is_valid(i).then(|| value.value(i)),
            value_category: value_category
                .is_valid(i)
                .then(|| value_category.value(i).to_string()),
            unit: unit.is_valid(i).then(|| unit.value(i).to_string()),
            start_date: timestamp(start_date, i)?,
            end_date: timestamp(end_date, i)?,
            duration_min: duration_min.is_valid(i).then(|| duration_min.value(i)),
            distance_km: distance_km.is_valid(i).then(|| distance_km.value(i)),
            energy_kcal: energy_kcal.is_valid(i).then(|| energy_kcal.value(i)),
            source_name: source_name.value(i).to_string(),
            start_lat: start_lat.is_valid(i).then(|| start_lat.value(i)),
            start_lon: start_lon.is_valid(i).then(|| start_lon.value(i)),
        });
    }
    Ok(rows)
}

/// Write batches to `path` atomically (temp file, fsync, rename)
pub fn write_batches<'a>(
    path: &Path,
    batches: impl IntoIterator<Item = &'a RecordBatch>,
    props: WriterProperties,
) -> Result<()> {
    let temp_path = temp_path_for(path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            EtlError::storage(format!("Failed to create directory {:?}: {}", parent, e))
        })?;
    }

    let file = File::create(&temp_path)
        .map_err(|e| EtlError::storage(format!("Failed to create temp file: {}", e)))?;
    let sync_handle = file
        .try_clone()
        .map_err(|e| EtlError::storage(format!("Failed to open temp file: {}", e)))?;

    let mut writer = ArrowWriter::try_new(file, schema(), Some(props))
        .map_err(|e| EtlError::storage(format!("Failed to create Parquet writer: {}", e)))?;
    for batch in batches {
        writer
            .write(batch)
            .map_err(|e| EtlError::storage(format!("Failed to write batch: {}", e)))?;
    }
    writer
        .close()
        .map_err(|e| EtlError::storage(format!("Failed to close writer: {}", e)))?;

    sync_handle
        .sync_all()
        .map_err(|e| EtlError::storage(format!("Failed to sync temp file: {}", e)))?;

    fs::rename(&temp_path, path)
        .map_err(|e| EtlError::storage(format!("Failed to rename temp file: {}", e)))?;

    Ok(())
}

/// `health.parquet` -> `health.parquet.tmp`
pub(crate) fn temp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    name.into()
}

/// Open a reader over every record batch in a Parquet file
pub fn open_batches(path: &Path) -> Result<impl Iterator<Item = Result<RecordBatch>>> {
    let file = File::open(path)
        .map_err(|e| EtlError::storage(format!("Failed to open {:?}: {}", path, e)))?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| EtlError::storage(format!("Failed to create reader: {}", e)))?
        .build()
        .map_err(|e| EtlError::storage(format!("Failed to build reader: {}", e)))?;

    Ok(reader.map(|batch| {
        batch.map_err(|e| EtlError::storage(format!("Failed to read batch: {}", e)))
    }))
}

/// Read a whole file back as rows
pub fn read_rows(path: &Path) -> Result<Vec<OutputRow>> {
    let mut rows = Vec::new();
    for batch in open_batches(path)? {
        rows.extend(batch_to_rows(&batch?)?);
    }
    Ok(rows)
}

/// Row count from the file footer, without decoding any data
pub fn count_rows(path: &Path) -> Result<u64> {
    let file = File::open(path)
        .map_err(|e| EtlError::storage(format!("Failed to open {:?}: {}", path, e)))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| EtlError::storage(format!("Failed to read footer: {}", e)))?;
    Ok(builder.metadata().file_metadata().num_rows().max(0) as u64)
}
