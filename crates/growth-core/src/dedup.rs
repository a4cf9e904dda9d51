//! Exact-duplicate removal over the composite measurement key
//! (child_id, measurement_kind, value, capture_date, site). The first
//! occurrence in original row order wins.

use std::collections::HashSet;

use polars::prelude::*;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::report::REMOVAL_WARN_THRESHOLD;
use crate::schema::{self, columns, DEDUP_KEY_COLUMNS};

const STAGE: &str = "duplicate resolver";

#[derive(Debug, Clone)]
pub struct DedupStats {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Duplicate keys still present after filtering. Anything non-zero
    /// is a key-construction defect, reported but not fatal.
    pub residual_keys: usize,
}

impl DedupStats {
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

/// One row's composite key, canonicalized for comparison. Float values
/// compare by bit pattern so that a key survives the trip through f64.
type DedupKey<'a> = (
    Option<i64>,
    Option<&'a str>,
    Option<u64>,
    Option<i32>,
    Option<&'a str>,
);

pub fn resolve_duplicates(df: &DataFrame) -> Result<(DataFrame, DedupStats)> {
    let missing = schema::missing_columns(df, &DEDUP_KEY_COLUMNS);
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            stage: STAGE,
            missing,
        });
    }

    let rows_in = df.height();
    if rows_in == 0 {
        warn!("input table is empty, nothing to deduplicate");
        return Ok((
            df.clone(),
            DedupStats {
                rows_in: 0,
                rows_out: 0,
                residual_keys: 0,
            },
        ));
    }

    // Key columns are canonicalized before comparison so the stage can
    // run against any upstream snapshot, typed or not.
    let child = df.column(columns::CHILD_ID)?.cast(&DataType::Int64)?;
    let child = child.i64()?;
    let kind = df.column(columns::MEASUREMENT_KIND)?.cast(&DataType::String)?;
    let kind = kind.str()?;
    let value = df.column(columns::VALUE)?.cast(&DataType::Float64)?;
    let value = value.f64()?;
    let date = df.column(columns::CAPTURE_DATE)?.cast(&DataType::Date)?;
    let date = date.date()?;
    let site = df.column(columns::SITE)?.cast(&DataType::String)?;
    let site = site.str()?;

    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(rows_in);
    let mut keep: Vec<bool> = Vec::with_capacity(rows_in);

    for idx in 0..rows_in {
        let key: DedupKey = (
            child.get(idx),
            kind.get(idx),
            value.get(idx).map(f64::to_bits),
            date.get(idx),
            site.get(idx),
        );
        keep.push(seen.insert(key));
    }

    let mask = BooleanChunked::new("keep".into(), keep);
    let filtered = df.filter(&mask)?;
    let rows_out = filtered.height();

    let residual_keys = count_duplicate_keys(&filtered)?;
    if residual_keys > 0 {
        error!(
            residual_keys,
            "duplicate keys remain after filtering; the composite key construction is defective"
        );
    }

    let stats = DedupStats {
        rows_in,
        rows_out,
        residual_keys,
    };
    info!(
        rows_in,
        rows_out,
        removed = stats.removed(),
        percentage = format!("{:.1}", stats.removal_percentage()),
        "duplicate removal complete"
    );
    if stats.removal_percentage() > REMOVAL_WARN_THRESHOLD {
        warn!(
            percentage = format!("{:.1}", stats.removal_percentage()),
            "unusually high duplicate share"
        );
    }

    Ok((filtered, stats))
}

fn count_duplicate_keys(df: &DataFrame) -> Result<usize> {
    let child = df.column(columns::CHILD_ID)?.cast(&DataType::Int64)?;
    let child = child.i64()?;
    let kind = df.column(columns::MEASUREMENT_KIND)?.cast(&DataType::String)?;
    let kind = kind.str()?;
    let value = df.column(columns::VALUE)?.cast(&DataType::Float64)?;
    let value = value.f64()?;
    let date = df.column(columns::CAPTURE_DATE)?.cast(&DataType::Date)?;
    let date = date.date()?;
    let site = df.column(columns::SITE)?.cast(&DataType::String)?;
    let site = site.str()?;

    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(df.height());
    let mut collisions = 0usize;
    for idx in 0..df.height() {
        let key: DedupKey = (
            child.get(idx),
            kind.get(idx),
            value.get(idx).map(f64::to_bits),
            date.get(idx),
            site.get(idx),
        );
        if !seen.insert(key) {
            collisions += 1;
        }
    }
    Ok(collisions)
}
