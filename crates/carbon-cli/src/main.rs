/// carbon-zones: per-class carbon coefficients and a carbon density raster
/// from a land-cover grid and carbon-zone polygons.
///
/// Usage:
///   carbon-zones run --config configs/uga.yaml
///   carbon-zones run --lulc lulc.tif --zones zones.geojson --boundary uga.geojson \
///       --crosswalk crosswalk.csv --coeff-lookup lookup.csv --out-dir out/uga
///   carbon-zones validate --lulc lulc.tif --zones zones.geojson --boundary uga.geojson
mod config;
mod validate;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use carbon_core::{AggregationMethod, CarbonPipeline};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{FileConfig, Overrides, RunSettings};

#[derive(Parser, Debug)]
#[command(name = "carbon-zones", about = "Carbon coefficients from land cover and carbon-zone layers")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full coefficient pipeline.
    Run(RunArgs),
    /// Check input files, CRS agreement and zone attribute fields.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// YAML configuration file; command-line options override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run identifier (e.g. ISO3 country code), used in output names.
    #[arg(long)]
    identifier: Option<String>,

    /// Land-cover GeoTIFF.
    #[arg(long)]
    lulc: Option<String>,

    /// Carbon-zone polygons (GeoJSON).
    #[arg(long)]
    zones: Option<String>,

    /// Boundary polygons (GeoJSON).
    #[arg(long)]
    boundary: Option<String>,

    /// Land-cover → classification crosswalk CSV.
    #[arg(long)]
    crosswalk: Option<String>,

    /// Exploded coefficient lookup CSV.
    #[arg(long)]
    coeff_lookup: Option<String>,

    /// Optional expert overrides CSV (lucode, c_above_override).
    #[arg(long)]
    expert_overrides: Option<String>,

    /// Output directory.
    #[arg(long)]
    out_dir: Option<String>,

    /// Aggregation method: dominant or weighted.
    #[arg(long)]
    aggregation: Option<AggregationMethod>,

    /// Savanna carbon as a fraction of the forest reference.
    #[arg(long)]
    savanna_fraction: Option<f64>,

    /// Replace existing outputs.
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(long)]
    lulc: PathBuf,
    #[arg(long)]
    zones: PathBuf,
    #[arg(long)]
    boundary: PathBuf,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Command::Run(args) => run(args),
        Command::Validate(args) => {
            let report = validate::run_validation(&args.lulc, &args.zones, &args.boundary);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.files_ok() {
                bail!("Validation failed");
            }
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };
    let settings = RunSettings::merge(
        file,
        Overrides {
            identifier: args.identifier,
            lulc: args.lulc,
            zones: args.zones,
            boundary: args.boundary,
            crosswalk: args.crosswalk,
            coeff_lookup: args.coeff_lookup,
            expert_overrides: args.expert_overrides,
            out_dir: args.out_dir,
            aggregation: args.aggregation,
            savanna_fraction: args.savanna_fraction,
            overwrite: args.overwrite,
        },
    )?;

    let report = validate::run_validation(
        &settings.inputs.land_cover,
        &settings.inputs.zones,
        &settings.inputs.boundary,
    );
    eprintln!("{}", serde_json::to_string_pretty(&report)?);
    if !report.files_ok() {
        error!("validation failed; aborting");
        bail!("Validation failed");
    }

    let existing = settings.outputs.existing();
    if !settings.overwrite && !existing.is_empty() {
        bail!(
            "Outputs already exist (use --overwrite): {}",
            existing.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
        );
    }

    eprintln!("Running carbon coefficients for {}", settings.identifier);
    let pipeline = CarbonPipeline::new(settings.pipeline).context("Invalid pipeline configuration")?;
    let summary = pipeline
        .run_files(&settings.identifier, &settings.inputs, &settings.outputs)
        .with_context(|| format!("Run failed for {}", settings.identifier))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    eprintln!(
        "Done: {} coefficient rows, {} defaulted classes, total carbon {:.1} Mg C",
        summary.record_count, summary.defaulted_classes, summary.total_carbon_mass
    );
    Ok(())
}
