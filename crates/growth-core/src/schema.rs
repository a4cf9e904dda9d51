//! Canonical column names and static lookup tables shared by every stage.

use once_cell::sync::Lazy;

pub mod columns {
    pub const CHILD_ID: &str = "child_id";
    pub const MEASUREMENT_KIND: &str = "measurement_kind";
    pub const VALUE: &str = "value";
    pub const CAPTURE_DATE: &str = "capture_date";
    pub const SITE: &str = "site";
    pub const SITE_GROUP: &str = "site_group";
    pub const FLAGGED: &str = "flagged";
    pub const MEASURED: &str = "measured";
    pub const WHO_INDEX: &str = "who_index";
    pub const CREATED_ON: &str = "created_on";

    pub const DAYS_SINCE_PREVIOUS: &str = "days_since_previous_measurement";
    pub const DAYS_SINCE_FIRST: &str = "days_since_first_measurement";
    pub const IS_FIRST: &str = "is_first_measurement";
    pub const IS_LATEST: &str = "is_latest_measurement";
}

/// Columns that must exist in the raw table before any cleaning starts.
pub const REQUIRED_SOURCE_COLUMNS: [&str; 5] = [
    columns::CHILD_ID,
    columns::MEASUREMENT_KIND,
    columns::VALUE,
    columns::CAPTURE_DATE,
    columns::SITE,
];

/// Fields a record cannot survive without.
pub const CRITICAL_COLUMNS: [&str; 4] = [
    columns::CHILD_ID,
    columns::VALUE,
    columns::CAPTURE_DATE,
    columns::MEASUREMENT_KIND,
];

/// Composite key identifying an exact-duplicate measurement event.
pub const DEDUP_KEY_COLUMNS: [&str; 5] = [
    columns::CHILD_ID,
    columns::MEASUREMENT_KIND,
    columns::VALUE,
    columns::CAPTURE_DATE,
    columns::SITE,
];

/// Columns holding calendar dates in the raw export.
pub const DATE_COLUMNS: [&str; 2] = [columns::CAPTURE_DATE, columns::CREATED_ON];

/// Columns coerced to {0,1} quality flags.
pub const BINARY_COLUMNS: [&str; 2] = [columns::FLAGGED, columns::MEASURED];

pub const DERIVED_COLUMNS: [&str; 4] = [
    columns::DAYS_SINCE_PREVIOUS,
    columns::DAYS_SINCE_FIRST,
    columns::IS_FIRST,
    columns::IS_LATEST,
];

/// Header spellings seen in the source spreadsheet export, mapped to
/// canonical names. Unknown headers pass through untouched.
pub const RAW_HEADER_ALIASES: [(&str, &str); 10] = [
    ("BeneficiaryId", columns::CHILD_ID),
    ("DatapointName", columns::MEASUREMENT_KIND),
    ("Answer", columns::VALUE),
    ("Capture Date", columns::CAPTURE_DATE),
    ("Site", columns::SITE),
    ("SiteGroup", columns::SITE_GROUP),
    ("Flagged", columns::FLAGGED),
    ("MEASURED", columns::MEASURED),
    ("WHO Index", columns::WHO_INDEX),
    ("CreatedOn", columns::CREATED_ON),
];

/// Cleaned-table column -> warehouse schema column. Columns absent from
/// this table are not shipped to the warehouse.
pub const WAREHOUSE_COLUMN_MAP: [(&str, &str); 14] = [
    (columns::CHILD_ID, "BENEFICIARY_ID"),
    (columns::MEASUREMENT_KIND, "DATAPOINT_NAME"),
    (columns::VALUE, "ANSWER"),
    (columns::CAPTURE_DATE, "CAPTURE_DATE"),
    (columns::SITE, "SITE"),
    (columns::SITE_GROUP, "SITE_GROUP"),
    (columns::FLAGGED, "FLAGGED"),
    (columns::MEASURED, "MEASURED"),
    (columns::WHO_INDEX, "WHO_INDEX"),
    (columns::CREATED_ON, "CREATED_ON"),
    (columns::DAYS_SINCE_PREVIOUS, "DAYS_SINCE_PREVIOUS_MEASUREMENT"),
    (columns::DAYS_SINCE_FIRST, "DAYS_SINCE_FIRST_MEASUREMENT"),
    (columns::IS_FIRST, "IS_FIRST_MEASUREMENT"),
    (columns::IS_LATEST, "IS_LATEST_MEASUREMENT"),
];

/// Closed interval of physiologically plausible values for one
/// measurement kind.
#[derive(Debug, Clone, Copy)]
pub struct RangePolicy {
    pub kind: &'static str,
    pub min: f64,
    pub max: f64,
}

static RANGE_POLICIES: Lazy<Vec<RangePolicy>> = Lazy::new(|| {
    vec![
        RangePolicy {
            kind: "Height",
            min: 40.0,
            max: 200.0,
        },
        RangePolicy {
            kind: "BMI",
            min: 5.0,
            max: 50.0,
        },
    ]
});

/// Fallback interval for measurement kinds without a dedicated policy.
pub const DEFAULT_RANGE: (f64, f64) = (0.0, 1000.0);

pub fn range_policies() -> &'static [RangePolicy] {
    RANGE_POLICIES.as_slice()
}

/// Valid closed interval for a measurement kind.
pub fn valid_range(kind: &str) -> (f64, f64) {
    RANGE_POLICIES
        .iter()
        .find(|policy| policy.kind == kind)
        .map(|policy| (policy.min, policy.max))
        .unwrap_or(DEFAULT_RANGE)
}

pub fn has_column(df: &polars::prelude::DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|col| col.as_str() == name)
}

/// Names every column from `required` absent in `df`, for schema errors.
pub fn missing_columns(df: &polars::prelude::DataFrame, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !has_column(df, name))
        .map(|name| name.to_string())
        .collect()
}
