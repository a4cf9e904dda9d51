//! Type normalization: coerces raw spreadsheet cell values into the
//! canonical dtypes the downstream stages rely on. Single bad cells
//! become nulls and are counted; only a structurally broken column
//! (or a missing one) aborts the run.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use polars::prelude::*;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::schema::{self, columns, BINARY_COLUMNS, DATE_COLUMNS, REQUIRED_SOURCE_COLUMNS};

const STAGE: &str = "type normalizer";

/// Numeric date cells at or below this are counters or garbage, not
/// spreadsheet serial dates.
const SERIAL_DATE_FLOOR: f64 = 1000.0;

static DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
];

static UNIX_EPOCH_DATE: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch"));

/// Day 0 of the spreadsheet serial calendar, chosen so that serial 1
/// lands on 1900-01-01.
static SHEET_EPOCH: Lazy<NaiveDate> =
    Lazy::new(|| NaiveDate::from_ymd_opt(1899, 12, 31).expect("valid epoch"));

/// Per-column coercion outcome. Failures are observability data, not
/// errors: the failing cells have already been nulled.
#[derive(Debug, Default, Clone)]
pub struct CoercionReport {
    pub failures: BTreeMap<String, usize>,
    pub serial_date_columns: Vec<String>,
}

impl CoercionReport {
    pub fn total_failures(&self) -> usize {
        self.failures.values().sum()
    }

    fn record(&mut self, column: &str, failed: usize) {
        if failed > 0 {
            *self.failures.entry(column.to_string()).or_insert(0) += failed;
        }
    }
}

/// Coerces date, numeric and binary columns to canonical dtypes.
/// Returns a new table plus the per-column failure counts.
pub fn normalize_types(df: &DataFrame) -> Result<(DataFrame, CoercionReport)> {
    let missing = schema::missing_columns(df, &REQUIRED_SOURCE_COLUMNS);
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            stage: STAGE,
            missing,
        });
    }

    let mut report = CoercionReport::default();
    if df.is_empty() {
        warn!("input table is empty, nothing to normalize");
        return Ok((df.clone(), report));
    }

    let mut out = df.clone();

    for name in DATE_COLUMNS {
        if schema::has_column(&out, name) {
            let coerced = coerce_date_column(out.column(name)?, &mut report)?;
            out.with_column(coerced)?;
        }
    }

    for name in [columns::VALUE, columns::WHO_INDEX] {
        if schema::has_column(&out, name) {
            let coerced = coerce_float_column(out.column(name)?, &mut report)?;
            out.with_column(coerced)?;
        }
    }

    let id = coerce_id_column(out.column(columns::CHILD_ID)?, &mut report)?;
    out.with_column(id)?;

    for name in BINARY_COLUMNS {
        if schema::has_column(&out, name) {
            let coerced = coerce_binary_column(out.column(name)?, &mut report)?;
            out.with_column(coerced)?;
        }
    }

    for name in [columns::MEASUREMENT_KIND, columns::SITE, columns::SITE_GROUP] {
        if schema::has_column(&out, name) {
            let coerced = coerce_string_column(out.column(name)?)?;
            out.with_column(coerced)?;
        }
    }

    for (column, failed) in &report.failures {
        warn!(column = column.as_str(), failed, "cells failed coercion and were nulled");
    }
    info!(
        rows = out.height(),
        total_failures = report.total_failures(),
        "type normalization complete"
    );

    Ok((out, report))
}

/// Converts a spreadsheet serial number to a calendar date. Serial 1 is
/// 1900-01-01; serials past 59 are shifted down by one so the phantom
/// 1900-02-29 the spreadsheet engine believes in never materializes.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let mut days = serial.trunc() as i64;
    if days > 59 {
        days -= 1;
    }
    SHEET_EPOCH.checked_add_signed(chrono::Duration::days(days))
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(*UNIX_EPOCH_DATE).num_days() as i32
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    UNIX_EPOCH_DATE.checked_add_signed(chrono::Duration::days(i64::from(days)))
}

fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
        // Date strings exported with a time component still parse as
        // plain dates once the clock part is matched.
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }
    None
}

fn non_null(column: &Column) -> usize {
    column.len() - column.null_count()
}

fn conversion_error(column: &Column, source: PolarsError) -> PipelineError {
    PipelineError::TypeConversion {
        column: column.name().to_string(),
        source,
    }
}

fn coerce_date_column(column: &Column, report: &mut CoercionReport) -> Result<Column> {
    let name = column.name().clone();

    match column.dtype() {
        DataType::Date => return Ok(column.clone()),
        DataType::Datetime(_, _) => {
            return column
                .cast(&DataType::Date)
                .map_err(|err| conversion_error(column, err));
        }
        _ => {}
    }

    let is_numeric = matches!(
        column.dtype(),
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    );

    let mut days: Vec<Option<i32>> = Vec::with_capacity(column.len());
    let mut failed = 0usize;

    if is_numeric {
        let values = column
            .cast(&DataType::Float64)
            .map_err(|err| conversion_error(column, err))?;
        let values = values.f64()?;
        let looks_serial = values.min().is_some_and(|min| min > SERIAL_DATE_FLOOR);

        if looks_serial {
            report.serial_date_columns.push(name.to_string());
            info!(column = name.as_str(), "converting spreadsheet serial dates");
        }

        for idx in 0..values.len() {
            match values.get(idx) {
                Some(serial) if looks_serial => match serial_to_date(serial) {
                    Some(date) => days.push(Some(date_to_days(date))),
                    None => {
                        failed += 1;
                        days.push(None);
                    }
                },
                Some(_) => {
                    // Small numerics in a date column cannot be dates.
                    failed += 1;
                    days.push(None);
                }
                None => days.push(None),
            }
        }
    } else {
        let values = column
            .cast(&DataType::String)
            .map_err(|err| conversion_error(column, err))?;
        let values = values.str()?;

        for idx in 0..values.len() {
            match values.get(idx) {
                Some(raw) if !raw.trim().is_empty() => match parse_date_str(raw) {
                    Some(date) => days.push(Some(date_to_days(date))),
                    None => {
                        failed += 1;
                        days.push(None);
                    }
                },
                _ => days.push(None),
            }
        }
    }

    report.record(name.as_str(), failed);
    let series = Series::new(name, days)
        .cast(&DataType::Date)
        .map_err(|err| conversion_error(column, err))?;
    Ok(series.into())
}

fn coerce_float_column(column: &Column, report: &mut CoercionReport) -> Result<Column> {
    let before = non_null(column);
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|err| conversion_error(column, err))?;
    report.record(column.name().as_str(), before.saturating_sub(non_null(&casted)));
    Ok(casted)
}

fn coerce_id_column(column: &Column, report: &mut CoercionReport) -> Result<Column> {
    let before = non_null(column);
    // Via Float64 so textual ids like "1024.0" survive the trip.
    let casted = column
        .cast(&DataType::Float64)
        .and_then(|col| col.cast(&DataType::Int64))
        .map_err(|err| conversion_error(column, err))?;
    report.record(column.name().as_str(), before.saturating_sub(non_null(&casted)));
    Ok(casted)
}

fn coerce_binary_column(column: &Column, report: &mut CoercionReport) -> Result<Column> {
    let before = non_null(column);
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|err| conversion_error(column, err))?;
    report.record(column.name().as_str(), before.saturating_sub(non_null(&casted)));

    let values = casted.f64()?;
    let mut flags: Vec<i32> = Vec::with_capacity(values.len());
    for idx in 0..values.len() {
        match values.get(idx) {
            Some(v) if v != 0.0 => flags.push(1),
            _ => flags.push(0),
        }
    }
    Ok(Series::new(column.name().clone(), flags).into())
}

fn coerce_string_column(column: &Column) -> Result<Column> {
    column
        .cast(&DataType::String)
        .map_err(|err| conversion_error(column, err))
}
