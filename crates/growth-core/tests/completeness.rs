use polars::prelude::*;

use growth_core::completeness::{drop_incomplete_records, is_null_token, scrub_null_tokens};
use growth_core::error::PipelineError;

#[test]
fn token_set_is_explicit_and_case_sensitive() {
    assert!(is_null_token(""));
    assert!(is_null_token("   "));
    assert!(is_null_token("nan"));
    assert!(is_null_token("None"));
    assert!(is_null_token("null"));
    assert!(is_null_token("NULL"));
    assert!(is_null_token("  null  "));

    assert!(!is_null_token("NaN"));
    assert!(!is_null_token("Null"));
    assert!(!is_null_token("0"));
    assert!(!is_null_token("Height"));
}

#[test]
fn string_null_tokens_become_real_nulls() -> PolarsResult<()> {
    let df = df![
        "measurement_kind" => ["Height", "", "nan", "None", "null", "NULL", "  BMI  "],
    ]?;

    let scrubbed = scrub_null_tokens(&df, &["measurement_kind"]).unwrap();
    let kinds = scrubbed.column("measurement_kind")?.str()?;
    assert_eq!(kinds.get(0), Some("Height"));
    for idx in 1..6 {
        assert_eq!(kinds.get(idx), None);
    }
    // Values are trimmed while we are in here.
    assert_eq!(kinds.get(6), Some("BMI"));
    Ok(())
}

#[test]
fn rows_missing_any_critical_field_are_dropped() -> PolarsResult<()> {
    let df = df![
        "child_id" => [Some(1i64), None, Some(3), Some(4), Some(5)],
        "value" => [Some(85.0f64), Some(86.0), None, Some(88.0), Some(89.0)],
        "capture_date" => [Some("2023-01-10"), Some("2023-01-11"), Some("2023-01-12"), None, Some("2023-01-14")],
        "measurement_kind" => ["Height", "Height", "Height", "Height", "null"],
    ]?;

    let (out, stats) = drop_incomplete_records(&df).unwrap();
    assert_eq!(out.height(), 1);
    assert_eq!(stats.removed(), 4);
    assert_eq!(stats.missing_by_field.get("child_id"), Some(&1));
    assert_eq!(stats.missing_by_field.get("value"), Some(&1));
    assert_eq!(stats.missing_by_field.get("measurement_kind"), Some(&1));
    assert_eq!(stats.residual_missing, 0);

    let ids = out.column("child_id")?.i64()?;
    assert_eq!(ids.get(0), Some(1));
    Ok(())
}

#[test]
fn output_has_no_missing_critical_fields() -> PolarsResult<()> {
    let df = df![
        "child_id" => [Some(1i64), None],
        "value" => [Some(85.0f64), Some(90.0)],
        "capture_date" => ["2023-01-10", "nan"],
        "measurement_kind" => ["Height", "Height"],
    ]?;

    let (out, _) = drop_incomplete_records(&df).unwrap();
    for name in ["child_id", "value", "capture_date", "measurement_kind"] {
        assert_eq!(out.column(name)?.null_count(), 0);
    }
    Ok(())
}

#[test]
fn missing_columns_are_a_schema_error() -> PolarsResult<()> {
    let df = df!["child_id" => [1i64]]?;

    let err = drop_incomplete_records(&df).unwrap_err();
    match err {
        PipelineError::Schema { missing, .. } => {
            assert!(missing.contains(&"value".to_string()));
            assert!(missing.contains(&"capture_date".to_string()));
            assert!(missing.contains(&"measurement_kind".to_string()));
        }
        other => panic!("expected schema error, got {other}"),
    }
    Ok(())
}
