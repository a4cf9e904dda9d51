//! Raw-table loading and cleaned-table writing. The header row is
//! sniffed with the csv crate before the bulk polars read so a
//! structurally unusable file fails fast with the full list of missing
//! columns.

use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::schema::{RAW_HEADER_ALIASES, REQUIRED_SOURCE_COLUMNS};

const STAGE: &str = "ingest";

/// Canonical name for a raw header cell, if the alias table knows it.
fn canonicalize_header(raw: &str) -> Option<&'static str> {
    let trimmed = raw.trim();
    RAW_HEADER_ALIASES
        .iter()
        .find(|(alias, canonical)| *alias == trimmed || *canonical == trimmed)
        .map(|(_, canonical)| *canonical)
}

fn validate_raw_header(path: &Path) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(File::open(path)?);

    let mut records = reader.records();
    // A file without a header row is missing every required column.
    let Some(header) = records.next().transpose()? else {
        return Err(PipelineError::Schema {
            stage: STAGE,
            missing: REQUIRED_SOURCE_COLUMNS
                .iter()
                .map(|required| required.to_string())
                .collect(),
        });
    };

    let present: Vec<&'static str> = header
        .iter()
        .filter_map(canonicalize_header)
        .collect();

    let missing: Vec<String> = REQUIRED_SOURCE_COLUMNS
        .iter()
        .filter(|required| !present.contains(required))
        .map(|required| required.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Schema {
            stage: STAGE,
            missing,
        })
    }
}

/// Reads the raw export and renames aliased headers to canonical
/// snake_case names. Cell typing stays whatever the reader inferred;
/// the type normalizer owns coercion.
pub fn read_raw_table(path: &Path) -> Result<DataFrame> {
    validate_raw_header(path)?;

    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(500))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    apply_header_aliases(&mut df)?;

    info!(path = %path.display(), rows = df.height(), columns = df.width(), "raw table loaded");
    Ok(df)
}

pub fn apply_header_aliases(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    for name in names {
        if let Some(canonical) = canonicalize_header(&name) {
            if name != canonical {
                df.rename(&name, canonical.into())?;
            }
        }
    }
    Ok(())
}

/// Reads back a cleaned artifact. No header validation or aliasing:
/// cleaned tables already carry canonical names.
pub fn read_cleaned_table(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(500))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

pub fn write_cleaned_table(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(path)?;
    let mut out = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut out)?;

    info!(path = %path.display(), rows = df.height(), "cleaned table written");
    Ok(())
}
