//! The orchestrator: fixed stage order, per-stage accounting, no
//! partial writes. Raw rows go normalize -> dedup -> range filter ->
//! completeness filter -> derivation, and the cleaned table is written
//! before any upload is attempted.

use std::path::PathBuf;

use polars::prelude::DataFrame;
use tracing::{error, info};
use uuid::Uuid;

use crate::completeness::drop_incomplete_records;
use crate::config::UploadSettings;
use crate::dedup::resolve_duplicates;
use crate::derive::{derive_longitudinal_fields, validate_derived_fields};
use crate::error::{PipelineError, Result};
use crate::ingest::{read_raw_table, write_cleaned_table};
use crate::normalize::normalize_types;
use crate::ranges::filter_measurement_ranges;
use crate::report::{PipelineSummary, StageStats};
use crate::upload::{upload_with_retry, UploadError, WarehouseUploader};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub upload: Option<UploadSettings>,
}

/// Runs the full cleaning pipeline over one raw export. The uploader is
/// constructed by the caller and passed in; `None` (or an absent upload
/// config) skips the warehouse step.
pub fn run_pipeline(
    config: &PipelineConfig,
    uploader: Option<&dyn WarehouseUploader>,
) -> Result<PipelineSummary> {
    let run_id = Uuid::new_v4();
    info!(%run_id, input = %config.input.display(), "pipeline run starting");

    let raw = read_raw_table(&config.input)?;
    let raw_rows = raw.height();
    let mut stages: Vec<StageStats> = Vec::new();

    let (normalized, coercion) = normalize_types(&raw)?;
    record_stage(&mut stages, "type_normalizer", raw_rows, normalized.height());

    let (deduped, _dedup_stats) = resolve_duplicates(&normalized)?;
    record_stage(&mut stages, "duplicate_resolver", normalized.height(), deduped.height());

    let (ranged, _range_stats) = filter_measurement_ranges(&deduped)?;
    record_stage(&mut stages, "range_validator", deduped.height(), ranged.height());

    let (complete, _completeness_stats) = drop_incomplete_records(&ranged)?;
    record_stage(&mut stages, "completeness_filter", ranged.height(), complete.height());

    let derived = derive_longitudinal_fields(&complete)?;
    record_stage(&mut stages, "longitudinal_deriver", complete.height(), derived.height());

    let check = validate_derived_fields(&derived)?;
    if !check.passed {
        return Err(PipelineError::Validation(check.issues.join("; ")));
    }

    write_cleaned_table(&derived, &config.output)?;

    let uploaded_rows = run_upload(config, uploader, &derived)?;

    let summary = PipelineSummary {
        run_id,
        raw_rows,
        cleaned_rows: derived.height(),
        stages,
        coercion_failures: coercion.failures,
        derivation_passed: check.passed,
        uploaded_rows,
    };
    info!(
        %run_id,
        raw_rows = summary.raw_rows,
        cleaned_rows = summary.cleaned_rows,
        removed = summary.removed(),
        percentage = format!("{:.1}", summary.removal_percentage()),
        "pipeline run finished"
    );
    Ok(summary)
}

fn record_stage(stages: &mut Vec<StageStats>, name: &'static str, rows_in: usize, rows_out: usize) {
    let stats = StageStats::new(name, rows_in, rows_out);
    stats.log();
    stages.push(stats);
}

fn run_upload(
    config: &PipelineConfig,
    uploader: Option<&dyn WarehouseUploader>,
    cleaned: &DataFrame,
) -> Result<Option<usize>> {
    let (Some(settings), Some(uploader)) = (config.upload.as_ref(), uploader) else {
        info!("warehouse upload skipped");
        return Ok(None);
    };

    match upload_with_retry(
        uploader,
        cleaned,
        &settings.table,
        settings.chunk_size,
        &settings.retry_policy(),
    ) {
        Ok(rows) => Ok(Some(rows)),
        Err(err) => {
            // The cleaned artifact is already on disk; only the upload
            // leg failed.
            error!(error = %err, "warehouse upload failed; cleaned output retained");
            // Preparation failures never reach the retry loop, so the
            // attempt count comes from the error, not the settings.
            let attempts = match &err {
                UploadError::Exhausted { attempts, .. } => *attempts,
                _ => 0,
            };
            Err(PipelineError::Upload {
                attempts,
                message: err.to_string(),
            })
        }
    }
}
