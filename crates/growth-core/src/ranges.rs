//! Physiological range filtering: rows whose measurement value falls
//! outside the plausible interval for their kind are dropped. Nulls are
//! someone else's problem (the completeness filter); the mask here only
//! fires on present numeric values.

use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::report::REMOVAL_WARN_THRESHOLD;
use crate::schema::{self, columns, valid_range};

const STAGE: &str = "range validator";

#[derive(Debug, Clone)]
pub struct RangeStats {
    pub rows_in: usize,
    pub rows_out: usize,
    pub removed_by_kind: BTreeMap<String, usize>,
}

impl RangeStats {
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

pub fn filter_measurement_ranges(df: &DataFrame) -> Result<(DataFrame, RangeStats)> {
    let required = [columns::MEASUREMENT_KIND, columns::VALUE];
    let missing = schema::missing_columns(df, &required);
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            stage: STAGE,
            missing,
        });
    }

    let rows_in = df.height();
    if rows_in == 0 {
        warn!("input table is empty, nothing to range-check");
        return Ok((
            df.clone(),
            RangeStats {
                rows_in: 0,
                rows_out: 0,
                removed_by_kind: BTreeMap::new(),
            },
        ));
    }

    let kinds = df.column(columns::MEASUREMENT_KIND)?.cast(&DataType::String)?;
    let kinds = kinds.str()?;
    let values = df.column(columns::VALUE)?.cast(&DataType::Float64)?;
    let values = values.f64()?;

    let mut keep: Vec<bool> = Vec::with_capacity(rows_in);
    let mut removed_by_kind: BTreeMap<String, usize> = BTreeMap::new();

    for idx in 0..rows_in {
        let (Some(kind), Some(value)) = (kinds.get(idx), values.get(idx)) else {
            keep.push(true);
            continue;
        };

        let (min, max) = valid_range(kind);
        if value < min || value > max {
            *removed_by_kind.entry(kind.to_string()).or_insert(0) += 1;
            keep.push(false);
        } else {
            keep.push(true);
        }
    }

    let mask = BooleanChunked::new("keep".into(), keep);
    let filtered = df.filter(&mask)?;

    let stats = RangeStats {
        rows_in,
        rows_out: filtered.height(),
        removed_by_kind,
    };

    for (kind, count) in &stats.removed_by_kind {
        info!(kind = kind.as_str(), removed = count, "out-of-range values removed");
    }
    info!(
        rows_in,
        rows_out = stats.rows_out,
        removed = stats.removed(),
        percentage = format!("{:.1}", stats.removal_percentage()),
        "range validation complete"
    );
    if stats.removal_percentage() > REMOVAL_WARN_THRESHOLD {
        warn!(
            percentage = format!("{:.1}", stats.removal_percentage()),
            "unusually high out-of-range share"
        );
    }

    Ok((filtered, stats))
}
