// crates/growth-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage}: missing required columns: {missing:?}")]
    Schema {
        stage: &'static str,
        missing: Vec<String>,
    },

    #[error("column-wide type conversion failed for '{column}': {source}")]
    TypeConversion {
        column: String,
        #[source]
        source: polars::error::PolarsError,
    },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Warehouse upload failed after {attempts} attempts: {message}")]
    Upload { attempts: u32, message: String },

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
