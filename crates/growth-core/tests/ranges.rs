use polars::prelude::*;

use growth_core::error::PipelineError;
use growth_core::ranges::filter_measurement_ranges;
use growth_core::schema::valid_range;

#[test]
fn policy_table_matches_contract() {
    assert_eq!(valid_range("Height"), (40.0, 200.0));
    assert_eq!(valid_range("BMI"), (5.0, 50.0));
    assert_eq!(valid_range("Weight"), (0.0, 1000.0));
}

#[test]
fn height_bounds_are_inclusive() -> PolarsResult<()> {
    let df = df![
        "measurement_kind" => ["Height", "Height", "Height", "Height"],
        "value" => [39.9f64, 40.0, 200.0, 200.1],
    ]?;

    let (out, stats) = filter_measurement_ranges(&df).unwrap();
    let values = out.column("value")?.f64()?;
    assert_eq!(out.height(), 2);
    assert_eq!(values.get(0), Some(40.0));
    assert_eq!(values.get(1), Some(200.0));
    assert_eq!(stats.removed_by_kind.get("Height"), Some(&2));
    Ok(())
}

#[test]
fn bmi_and_unknown_kinds_use_their_own_intervals() -> PolarsResult<()> {
    let df = df![
        "measurement_kind" => ["BMI", "BMI", "BMI", "Weight", "Weight", "Weight"],
        "value" => [4.9f64, 5.0, 50.1, -0.1, 999.9, 1000.1],
    ]?;

    let (out, stats) = filter_measurement_ranges(&df).unwrap();
    assert_eq!(out.height(), 2);
    assert_eq!(stats.removed_by_kind.get("BMI"), Some(&2));
    assert_eq!(stats.removed_by_kind.get("Weight"), Some(&2));

    let values = out.column("value")?.f64()?;
    assert_eq!(values.get(0), Some(5.0));
    assert_eq!(values.get(1), Some(999.9));
    Ok(())
}

#[test]
fn null_values_are_not_range_filtered() -> PolarsResult<()> {
    let df = df![
        "measurement_kind" => [Some("Height"), None, Some("Height")],
        "value" => [Some(999.0f64), Some(12.0), None],
    ]?;

    let (out, stats) = filter_measurement_ranges(&df).unwrap();
    // Only the present out-of-range Height goes; nulls are left for the
    // completeness filter.
    assert_eq!(out.height(), 2);
    assert_eq!(stats.removed(), 1);
    Ok(())
}

#[test]
fn missing_columns_are_a_schema_error() -> PolarsResult<()> {
    let df = df!["value" => [1.0f64]]?;

    let err = filter_measurement_ranges(&df).unwrap_err();
    match err {
        PipelineError::Schema { missing, .. } => {
            assert_eq!(missing, vec!["measurement_kind".to_string()]);
        }
        other => panic!("expected schema error, got {other}"),
    }
    Ok(())
}
