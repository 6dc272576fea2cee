//! CCD Vendor Data Ingest CLI
//!
//! Normalizes one vendor delivery: harvests the vendor's summary
//! results into canonical records and translates the raw FITS files
//! into canonically named ones, then emits a JSON report.

use std::fs;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use tracing::info;

use vendor_ingest::config::IngestConfig;
use vendor_ingest::{Vendor, VendorAdapter};

#[derive(Parser)]
#[command(
    name = "vendor-ingest",
    version,
    about = "Normalize CCD vendor test deliveries for the downstream harness"
)]
struct Args {
    /// Top-level directory of the vendor delivery.
    delivery_root: PathBuf,

    /// Delivering vendor (itl or e2v); inferred from the sensor id
    /// prefix when omitted.
    #[arg(long)]
    vendor: Option<Vendor>,

    /// LSST-assigned sensor identifier, e.g. ITL-3800C-089.
    #[arg(long)]
    sensor_id: Option<String>,

    /// Base directory for translated FITS files.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the JSON results report here instead of stdout.
    #[arg(long)]
    report: Option<PathBuf>,

    /// TOML file supplying defaults for the flags above.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match IngestConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                exit(1);
            }
        },
        None => IngestConfig::default(),
    };

    let Some(sensor_id) = args.sensor_id.or(config.sensor_id) else {
        eprintln!("A sensor id is required (--sensor-id or config file)");
        exit(1);
    };
    let vendor = match args
        .vendor
        .or(config.vendor)
        .or_else(|| Vendor::from_sensor_id(&sensor_id))
    {
        Some(vendor) => vendor,
        None => {
            eprintln!(
                "Cannot infer the vendor from sensor id `{sensor_id}`; pass --vendor"
            );
            exit(1);
        }
    };
    let output_base = args
        .output
        .or(config.output_base)
        .unwrap_or_else(|| PathBuf::from("."));

    // A wholly unreadable delivery is the one fatal input condition.
    if let Err(e) = fs::read_dir(&args.delivery_root) {
        eprintln!(
            "Cannot read delivery root {}: {}",
            args.delivery_root.display(),
            e
        );
        exit(1);
    }

    info!(
        version = vendor_ingest::VERSION,
        %vendor,
        sensor_id,
        delivery_root = %args.delivery_root.display(),
        "starting vendor ingest"
    );

    let mut adapter =
        VendorAdapter::new(vendor, sensor_id.as_str(), &args.delivery_root, &output_base);
    let outcome = adapter.run_all();

    info!(
        records = outcome.records.len(),
        failures = outcome.failures.len(),
        translated_files = outcome.outfiles.len(),
        "ingest complete"
    );

    let report = serde_json::json!({
        "sensor_id": sensor_id,
        "vendor": vendor,
        "records": outcome.records,
        "failures": outcome.failures.iter().map(|f| serde_json::json!({
            "category": f.category.name(),
            "error": f.error.to_string(),
        })).collect::<Vec<_>>(),
        "translated_files": outcome.outfiles,
    });
    let rendered = match serde_json::to_string_pretty(&report) {
        Ok(rendered) => rendered,
        Err(e) => {
            eprintln!("Failed to serialize the results report: {e}");
            exit(1);
        }
    };
    match args.report.or(config.report) {
        Some(path) => {
            if let Err(e) = fs::write(&path, rendered) {
                eprintln!("Failed to write report {}: {}", path.display(), e);
                exit(1);
            }
            info!(report = %path.display(), "report written");
        }
        None => println!("{rendered}"),
    }
}
