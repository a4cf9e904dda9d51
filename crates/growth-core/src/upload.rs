//! Warehouse upload collaborator. The pipeline never owns an ambient
//! warehouse handle: the caller constructs an uploader once and passes
//! it in explicitly. Cleaning success and upload success are
//! independent signals; the cleaned artifact on disk survives a failed
//! upload.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use polars::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::schema::{self, WAREHOUSE_COLUMN_MAP};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("warehouse rejected chunk: {0}")]
    Rejected(String),

    #[error("upload retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// External upload collaborator: receives one prepared chunk at a time
/// and reports the number of rows accepted.
pub trait WarehouseUploader {
    fn upload(&self, frame: &DataFrame, table: &str) -> Result<usize, UploadError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Renames cleaned columns to the warehouse schema and flattens the
/// boolean tracking flags to 0/1 integers. Columns outside the static
/// map stay behind.
pub fn prepare_for_warehouse(df: &DataFrame) -> Result<DataFrame, UploadError> {
    let mut selected: Vec<Column> = Vec::new();

    for (cleaned, warehouse) in WAREHOUSE_COLUMN_MAP {
        if !schema::has_column(df, cleaned) {
            continue;
        }
        let mut column = df.column(cleaned)?.clone();
        if column.dtype() == &DataType::Boolean {
            column = column.cast(&DataType::Int32)?;
        }
        column.rename(warehouse.into());
        selected.push(column);
    }

    Ok(DataFrame::new(selected)?)
}

/// Splits the prepared table into `chunk_size`-row slices and pushes
/// each through the collaborator, retrying with exponential backoff.
pub fn upload_with_retry(
    uploader: &dyn WarehouseUploader,
    df: &DataFrame,
    table: &str,
    chunk_size: usize,
    policy: &RetryPolicy,
) -> Result<usize, UploadError> {
    let prepared = prepare_for_warehouse(df)?;
    let total_rows = prepared.height();
    let chunk_size = chunk_size.max(1);
    let mut uploaded = 0usize;
    let mut offset = 0usize;

    while offset < total_rows {
        let len = chunk_size.min(total_rows - offset);
        let chunk = prepared.slice(offset as i64, len);
        uploaded += upload_chunk_with_retry(uploader, &chunk, table, policy)?;
        offset += len;
    }

    info!(table, rows = uploaded, "warehouse upload complete");
    Ok(uploaded)
}

fn upload_chunk_with_retry(
    uploader: &dyn WarehouseUploader,
    chunk: &DataFrame,
    table: &str,
    policy: &RetryPolicy,
) -> Result<usize, UploadError> {
    let mut last_error = String::new();

    for attempt in 0..policy.max_attempts {
        match uploader.upload(chunk, table) {
            Ok(rows) => return Ok(rows),
            Err(err) => {
                last_error = err.to_string();
                let remaining = policy.max_attempts - attempt - 1;
                warn!(
                    table,
                    attempt = attempt + 1,
                    remaining,
                    error = last_error.as_str(),
                    "chunk upload failed"
                );
                if remaining > 0 {
                    std::thread::sleep(policy.base_delay * 2u32.pow(attempt));
                }
            }
        }
    }

    Err(UploadError::Exhausted {
        attempts: policy.max_attempts,
        last: last_error,
    })
}

/// File-based stand-in for a live warehouse: each chunk lands as a CSV
/// file under `<dir>/<table>/chunk_NNNN.csv`.
pub struct DirectoryStageUploader {
    dir: PathBuf,
    counter: AtomicUsize,
}

impl DirectoryStageUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicUsize::new(0),
        }
    }
}

impl WarehouseUploader for DirectoryStageUploader {
    fn upload(&self, frame: &DataFrame, table: &str) -> Result<usize, UploadError> {
        let table_dir = self.dir.join(table);
        std::fs::create_dir_all(&table_dir)?;

        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = table_dir.join(format!("chunk_{index:04}.csv"));
        let mut file = std::fs::File::create(&path)?;
        let mut chunk = frame.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut chunk)?;

        info!(path = %path.display(), rows = frame.height(), "staged warehouse chunk");
        Ok(frame.height())
    }
}
