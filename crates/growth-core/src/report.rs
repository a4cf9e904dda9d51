//! Run-level reporting: per-stage counts, the serializable run summary
//! and the human-readable quality report.

use std::collections::{BTreeMap, HashSet};

use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::normalize::days_to_date;
use crate::schema::{self, columns};

/// Removal share above which a stage logs a warning instead of info.
pub const REMOVAL_WARN_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct StageStats {
    pub stage: &'static str,
    pub rows_in: usize,
    pub rows_out: usize,
}

impl StageStats {
    pub fn new(stage: &'static str, rows_in: usize, rows_out: usize) -> Self {
        Self {
            stage,
            rows_in,
            rows_out,
        }
    }

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

    pub fn log(&self) {
        info!(
            stage = self.stage,
            rows_in = self.rows_in,
            rows_out = self.rows_out,
            removed = self.removed(),
            percentage = format!("{:.1}", self.removal_percentage()),
            "stage complete"
        );
        if self.removal_percentage() > REMOVAL_WARN_THRESHOLD {
            warn!(
                stage = self.stage,
                percentage = format!("{:.1}", self.removal_percentage()),
                "removal share above threshold"
            );
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub run_id: Uuid,
    pub raw_rows: usize,
    pub cleaned_rows: usize,
    pub stages: Vec<StageStats>,
    pub coercion_failures: BTreeMap<String, usize>,
    pub derivation_passed: bool,
    pub uploaded_rows: Option<usize>,
}

impl PipelineSummary {
    pub fn removed(&self) -> usize {
        self.raw_rows.saturating_sub(self.cleaned_rows)
    }

    pub fn removal_percentage(&self) -> f64 {
        if self.raw_rows == 0 {
            0.0
        } else {
            self.removed() as f64 / self.raw_rows as f64 * 100.0
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Renders a plain-text quality report over a cleaned table: totals,
/// distinct children, capture-date range and remaining null counts.
pub fn quality_report(df: &DataFrame) -> Result<String> {
    let mut lines: Vec<String> = Vec::new();
    lines.push("=".repeat(70));
    lines.push("CHILD GROWTH DATA QUALITY REPORT".to_string());
    lines.push("=".repeat(70));
    lines.push(format!("Total records: {}", df.height()));

    if schema::has_column(df, columns::CHILD_ID) {
        let child = df.column(columns::CHILD_ID)?.cast(&DataType::Int64)?;
        let child = child.i64()?;
        let mut children: HashSet<i64> = HashSet::new();
        for idx in 0..child.len() {
            if let Some(id) = child.get(idx) {
                children.insert(id);
            }
        }
        lines.push(format!("Unique children: {}", children.len()));
    }

    if schema::has_column(df, columns::CAPTURE_DATE) {
        let date = df.column(columns::CAPTURE_DATE)?.cast(&DataType::Date)?;
        let date = date.date()?;
        let mut min_day: Option<i32> = None;
        let mut max_day: Option<i32> = None;
        for idx in 0..date.len() {
            if let Some(day) = date.get(idx) {
                min_day = Some(min_day.map_or(day, |m| m.min(day)));
                max_day = Some(max_day.map_or(day, |m| m.max(day)));
            }
        }
        if let (Some(min), Some(max)) = (min_day, max_day) {
            if let (Some(start), Some(end)) = (days_to_date(min), days_to_date(max)) {
                lines.push(format!("Date range: {start} to {end}"));
            }
        }
    }

    lines.push(String::new());
    lines.push("Missing data:".to_string());
    let mut any_missing = false;
    for column in df.get_columns() {
        let nulls = column.null_count();
        if nulls > 0 {
            any_missing = true;
            let pct = nulls as f64 / df.height().max(1) as f64 * 100.0;
            lines.push(format!("  {}: {} ({:.1}%)", column.name(), nulls, pct));
        }
    }
    if !any_missing {
        lines.push("  none".to_string());
    }

    Ok(lines.join("\n"))
}
