// crates/growth-cli/src/main.rs

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use growth_core::config::Settings;
use growth_core::pipeline::{run_pipeline, PipelineConfig};
use growth_core::report::quality_report;
use growth_core::upload::DirectoryStageUploader;

/// Cleans a raw child-growth measurement export into an analysis-ready
/// table and optionally stages it for the warehouse.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Raw measurement export (CSV).
    #[arg(long, default_value = "data/raw/measurements.csv")]
    input: PathBuf,

    /// Destination for the cleaned table.
    #[arg(long, default_value = "data/processed/cleaned_measurements.csv")]
    output: PathBuf,

    /// Optional TOML settings file (upload table, chunk size, retries).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the warehouse upload step (clean data only).
    #[arg(long)]
    no_upload: bool,

    /// Enable verbose logging.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = format!("{err:#}"), "pipeline failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let upload = (!cli.no_upload).then(|| settings.upload.clone());
    let uploader = upload
        .as_ref()
        .map(|settings| DirectoryStageUploader::new(settings.stage_dir.clone()));

    let config = PipelineConfig {
        input: cli.input.clone(),
        output: cli.output.clone(),
        upload,
    };

    let summary = run_pipeline(
        &config,
        uploader
            .as_ref()
            .map(|u| u as &dyn growth_core::upload::WarehouseUploader),
    )?;

    let cleaned = growth_core::ingest::read_cleaned_table(&config.output)?;
    println!("{}", quality_report(&cleaned)?);
    println!(
        "\nRun {}: {} raw -> {} cleaned ({} removed, {:.1}%)",
        summary.run_id,
        summary.raw_rows,
        summary.cleaned_rows,
        summary.removed(),
        summary.removal_percentage()
    );
    if let Some(rows) = summary.uploaded_rows {
        println!("Uploaded {rows} rows to the warehouse stage");
    }

    info!("pipeline completed successfully");
    Ok(())
}
