//! Missing-critical-field removal. Before filtering, string columns go
//! through an explicit null-token normalization so that `""`,
//! whitespace and the literal tokens "nan"/"None"/"null"/"NULL" all
//! count as missing, whatever the upstream export produced.

use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::schema::{self, CRITICAL_COLUMNS};

const STAGE: &str = "completeness filter";

/// Literal tokens treated as missing values after trimming.
const NULL_TOKENS: [&str; 4] = ["nan", "None", "null", "NULL"];

#[derive(Debug, Clone)]
pub struct CompletenessStats {
    pub rows_in: usize,
    pub rows_out: usize,
    pub missing_by_field: BTreeMap<&'static str, usize>,
    /// Nulls still present in required fields after filtering. Non-zero
    /// means the token normalization missed a representation.
    pub residual_missing: usize,
}

impl CompletenessStats {
    pub fn removed(&self) -> usize {
        self.rows_in - self.rows_out
    }

    pub fn removal_percentage(&self) -> f64 {
        if self.rows_in == 0 {
            0.0
        } else {
            self.removed() as f64 / self.rows_in as f64 * 100.0
        }
    }
}

/// Whether a raw cell string encodes a missing value.
pub fn is_null_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || NULL_TOKENS.contains(&trimmed)
}

pub fn drop_incomplete_records(df: &DataFrame) -> Result<(DataFrame, CompletenessStats)> {
    let missing = schema::missing_columns(df, &CRITICAL_COLUMNS);
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            stage: STAGE,
            missing,
        });
    }

    let rows_in = df.height();
    if rows_in == 0 {
        warn!("input table is empty, nothing to filter");
        return Ok((
            df.clone(),
            CompletenessStats {
                rows_in: 0,
                rows_out: 0,
                missing_by_field: BTreeMap::new(),
                residual_missing: 0,
            },
        ));
    }

    let scrubbed = scrub_null_tokens(df, &CRITICAL_COLUMNS)?;

    let mut keep = vec![true; rows_in];
    let mut missing_by_field: BTreeMap<&'static str, usize> = BTreeMap::new();

    for name in CRITICAL_COLUMNS {
        let column = scrubbed.column(name)?;
        let null_mask = column.is_null();
        let mut field_missing = 0usize;
        for (idx, is_null) in null_mask.into_iter().enumerate() {
            if is_null.unwrap_or(true) {
                field_missing += 1;
                keep[idx] = false;
            }
        }
        if field_missing > 0 {
            info!(field = name, missing = field_missing, "records missing required field");
        }
        missing_by_field.insert(name, field_missing);
    }

    let mask = BooleanChunked::new("keep".into(), keep);
    let filtered = scrubbed.filter(&mask)?;

    let mut residual_missing = 0usize;
    for name in CRITICAL_COLUMNS {
        let nulls = filtered.column(name)?.null_count();
        if nulls > 0 {
            warn!(
                field = name,
                nulls, "required field still has missing values after filtering"
            );
            residual_missing += nulls;
        }
    }

    let stats = CompletenessStats {
        rows_in,
        rows_out: filtered.height(),
        missing_by_field,
        residual_missing,
    };
    info!(
        rows_in,
        rows_out = stats.rows_out,
        removed = stats.removed(),
        percentage = format!("{:.1}", stats.removal_percentage()),
        "completeness filtering complete"
    );

    Ok((filtered, stats))
}

/// Replaces null-token strings with true nulls in the listed columns.
/// Non-string columns already carry typed nulls and pass through.
pub fn scrub_null_tokens(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let mut out = df.clone();

    for name in columns {
        if !schema::has_column(&out, name) {
            continue;
        }
        let column = out.column(name)?;
        if column.dtype() != &DataType::String {
            continue;
        }

        let values = column.str()?;
        let mut scrubbed: Vec<Option<String>> = Vec::with_capacity(values.len());
        for idx in 0..values.len() {
            match values.get(idx) {
                Some(raw) if !is_null_token(raw) => scrubbed.push(Some(raw.trim().to_string())),
                _ => scrubbed.push(None),
            }
        }
        out.with_column(Series::new((*name).into(), scrubbed))?;
    }

    Ok(out)
}
