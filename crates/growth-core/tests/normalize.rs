use chrono::NaiveDate;
use polars::prelude::*;

use growth_core::error::PipelineError;
use growth_core::normalize::{date_to_days, normalize_types, serial_to_date};

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Serial for a modern date under the day-1-is-1900-01-01 convention.
fn serial_for(date: NaiveDate) -> f64 {
    (date.signed_duration_since(ymd(1899, 12, 31)).num_days() + 1) as f64
}

#[test]
fn serial_conversion_handles_the_1900_leap_bug() {
    assert_eq!(serial_to_date(1.0), Some(ymd(1900, 1, 1)));
    assert_eq!(serial_to_date(59.0), Some(ymd(1900, 2, 28)));
    // The phantom 1900-02-29 collapses instead of shifting March.
    assert_eq!(serial_to_date(61.0), Some(ymd(1900, 3, 1)));
    assert_eq!(serial_to_date(serial_for(ymd(2023, 1, 10))), Some(ymd(2023, 1, 10)));
    assert_eq!(serial_to_date(f64::NAN), None);
}

#[test]
fn numeric_date_column_detected_as_serials() -> PolarsResult<()> {
    let df = df![
        "child_id" => [1i64, 2],
        "measurement_kind" => ["Height", "Height"],
        "value" => [85.0f64, 90.0],
        "capture_date" => [serial_for(ymd(2023, 1, 10)), serial_for(ymd(2023, 3, 10))],
        "site" => ["A", "A"],
    ]?;

    let (out, report) = normalize_types(&df).unwrap();
    assert!(report.serial_date_columns.contains(&"capture_date".to_string()));
    assert_eq!(report.total_failures(), 0);

    let dates = out.column("capture_date")?.date()?;
    assert_eq!(dates.get(0), Some(date_to_days(ymd(2023, 1, 10))));
    assert_eq!(dates.get(1), Some(date_to_days(ymd(2023, 3, 10))));
    Ok(())
}

#[test]
fn string_dates_parse_and_bad_cells_become_counted_nulls() -> PolarsResult<()> {
    let df = df![
        "child_id" => [1i64, 2, 3],
        "measurement_kind" => ["Height", "Height", "Height"],
        "value" => [85.0f64, 90.0, 95.0],
        "capture_date" => ["2023-01-10", "not a date", "  "],
        "site" => ["A", "A", "B"],
    ]?;

    let (out, report) = normalize_types(&df).unwrap();
    let dates = out.column("capture_date")?.date()?;
    assert_eq!(dates.get(0), Some(date_to_days(ymd(2023, 1, 10))));
    assert_eq!(dates.get(1), None);
    // Whitespace is missing data, not a parse failure.
    assert_eq!(dates.get(2), None);
    assert_eq!(report.failures.get("capture_date"), Some(&1));
    Ok(())
}

#[test]
fn textual_numerics_coerce_with_failure_counts() -> PolarsResult<()> {
    let df = df![
        "child_id" => ["101", "102", "abc"],
        "measurement_kind" => ["Height", "BMI", "Height"],
        "value" => ["85.5", "not a number", "90"],
        "capture_date" => ["2023-01-10", "2023-01-11", "2023-01-12"],
        "site" => ["A", "A", "A"],
    ]?;

    let (out, report) = normalize_types(&df).unwrap();

    let ids = out.column("child_id")?.i64()?;
    assert_eq!(ids.get(0), Some(101));
    assert_eq!(ids.get(2), None);
    assert_eq!(report.failures.get("child_id"), Some(&1));

    let values = out.column("value")?.f64()?;
    assert_eq!(values.get(0), Some(85.5));
    assert_eq!(values.get(1), None);
    assert_eq!(report.failures.get("value"), Some(&1));
    Ok(())
}

#[test]
fn binary_flags_collapse_to_zero_or_one() -> PolarsResult<()> {
    let df = df![
        "child_id" => [1i64, 2, 3, 4],
        "measurement_kind" => ["Height", "Height", "Height", "Height"],
        "value" => [85.0f64, 86.0, 87.0, 88.0],
        "capture_date" => ["2023-01-10", "2023-01-11", "2023-01-12", "2023-01-13"],
        "site" => ["A", "A", "A", "A"],
        "flagged" => [Some(1.0f64), Some(0.0), None, Some(2.0)],
    ]?;

    let (out, _) = normalize_types(&df).unwrap();
    let flags = out.column("flagged")?.i32()?;
    assert_eq!(flags.get(0), Some(1));
    assert_eq!(flags.get(1), Some(0));
    assert_eq!(flags.get(2), Some(0));
    assert_eq!(flags.get(3), Some(1));
    Ok(())
}

#[test]
fn missing_required_column_is_a_schema_error() -> PolarsResult<()> {
    let df = df![
        "child_id" => [1i64],
        "measurement_kind" => ["Height"],
        "value" => [85.0f64],
        "capture_date" => ["2023-01-10"],
    ]?;

    let err = normalize_types(&df).unwrap_err();
    match err {
        PipelineError::Schema { missing, .. } => {
            assert_eq!(missing, vec!["site".to_string()]);
        }
        other => panic!("expected schema error, got {other}"),
    }
    Ok(())
}

#[test]
fn empty_table_passes_through() -> PolarsResult<()> {
    let df = df![
        "child_id" => Vec::<i64>::new(),
        "measurement_kind" => Vec::<String>::new(),
        "value" => Vec::<f64>::new(),
        "capture_date" => Vec::<String>::new(),
        "site" => Vec::<String>::new(),
    ]?;

    let (out, report) = normalize_types(&df).unwrap();
    assert_eq!(out.height(), 0);
    assert_eq!(report.total_failures(), 0);
    Ok(())
}
