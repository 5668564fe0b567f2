//! Command line runner: scan a SQLite trip store and write the pair report.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use porto_proximity::report::DEFAULT_REPORT_PATH;
use porto_proximity::{
    write_report, ObservationTime, ProximityConfig, ProximityScanner, ReportFormat,
    SpatialIndexKind, SqliteStore,
};

#[derive(Debug, Parser)]
#[command(
    name = "porto-proximity",
    version,
    about = "Find pairs of taxis that were within a few meters of each other at the same time"
)]
struct Args {
    /// SQLite database holding the trip, point and path tables
    #[arg(long, value_name = "PATH")]
    db: String,

    /// JSON file with scan configuration; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum distance between two taxis, in meters
    #[arg(long, value_name = "METERS")]
    threshold_meters: Option<f64>,

    /// Length of each window, in days
    #[arg(long, value_name = "DAYS")]
    window_days: Option<u32>,

    /// Width of each time bucket, in seconds
    #[arg(long, value_name = "SECONDS")]
    bucket_secs: Option<u32>,

    /// Start windows at the first trip's start time instead of midnight
    #[arg(long)]
    no_align: bool,

    /// Timestamp each fix as trip start + idx * 15s instead of trip start
    #[arg(long)]
    sampled_time: bool,

    /// Compare every pair in a bucket instead of using an R-tree
    #[arg(long)]
    brute_force: bool,

    /// Extra attempts for a failed window fetch
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Search buckets on one thread
    #[arg(long)]
    sequential: bool,

    /// Report output path
    #[arg(long, short, value_name = "PATH", default_value = DEFAULT_REPORT_PATH)]
    output: PathBuf,

    /// Report format: table or csv
    #[arg(long, default_value = "table")]
    format: ReportFormat,

    /// Print scan statistics as JSON after the run
    #[arg(long)]
    stats: bool,
}

impl Args {
    fn load_config(&self) -> porto_proximity::Result<ProximityConfig> {
        let mut config = match &self.config {
            Some(path) => ProximityConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => ProximityConfig::default(),
        };

        if let Some(meters) = self.threshold_meters {
            config.threshold_meters = meters;
        }
        if let Some(days) = self.window_days {
            config.window_span_days = days;
        }
        if let Some(secs) = self.bucket_secs {
            config.bucket_width_secs = secs;
        }
        if let Some(retries) = self.retries {
            config.fetch_retries = retries;
        }
        if self.no_align {
            config.align_to_midnight = false;
        }
        if self.sampled_time {
            config.observation_time = ObservationTime::Sampled;
        }
        if self.brute_force {
            config.index = SpatialIndexKind::BruteForce;
        }

        config.validate()?;
        Ok(config)
    }
}

fn run(args: Args) -> porto_proximity::Result<()> {
    let config = args.load_config()?;

    let mut store = SqliteStore::new(&args.db)?;
    store.set_observation_time(config.observation_time);

    let scanner = ProximityScanner::new(config)?.with_parallel(!args.sequential);
    let outcome = scanner.run(&store)?;

    write_report(&args.output, &outcome.pairs, args.format)?;
    println!(
        "Found {} taxi pairs, full output written to {}",
        outcome.pairs.len(),
        args.output.display()
    );

    if args.stats {
        let json = serde_json::to_string_pretty(&outcome.stats).map_err(|e| {
            porto_proximity::ProximityError::Report {
                message: e.to_string(),
            }
        })?;
        println!("{}", json);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
