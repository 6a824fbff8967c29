//! FleetStream command-line binary.
//!
//! Replays vehicle samples into an in-memory store and answers one fleet
//! query, printing the result as JSON.
//!
//! # Configuration
//!
//! Store settings are read, in order of precedence, from:
//!
//! 1. Command-line arguments (highest precedence)
//! 2. Environment variables (prefixed with `VEHICLESTORE_`)
//! 3. User-specified configuration file (via `--config`)
//! 4. System-wide configuration (`/etc/vehiclestore/config.toml`)
//! 5. Default configuration (embedded in binary)
//!
//! Log verbosity follows `RUST_LOG` (default `info`).
//!
//! # Examples
//!
//! ```bash
//! # Operators running in a window
//! fleetstream --samples pings.jsonl operators 1583971200000000 1584057599999999
//!
//! # Vehicles of an operator that stood still throughout the window
//! fleetstream --samples pings.jsonl vehicles 1583971200000000 1584057599999999 D1 --stopped
//!
//! # GPS trace of one vehicle
//! fleetstream --samples pings.jsonl --max-threads 16 trace 1583971200000000 1584057599999999 33488
//! ```
//!
//! The sample file holds one JSON object per line:
//!
//! ```text
//! {"ts":1583971200000000,"lon":-6.26,"lat":53.34,"vehicleId":"33488","operatorId":"D1","stopId":"","stopped":false}
//! ```

use clap::{Parser, Subcommand};
use fleetstream::{CliArgs, FleetService, FleetServiceImpl, MemoryStore, Settings, VehicleData};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    store: CliArgs,

    /// JSON-lines file of samples to ingest before querying
    #[arg(long, value_name = "FILE")]
    samples: Option<PathBuf>,

    #[command(subcommand)]
    query: Query,
}

#[derive(Subcommand, Debug)]
enum Query {
    /// Operators with samples in the window
    Operators { from: i64, to: i64 },
    /// Vehicles an operator ran in the window
    Vehicles {
        from: i64,
        to: i64,
        operator: String,
        /// Only vehicles stopped throughout the window
        #[arg(long)]
        stopped: bool,
    },
    /// GPS trace of a vehicle in the window
    Trace { from: i64, to: i64, vehicle: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::new(&cli.store)?;
    let service = FleetServiceImpl::from_settings(Arc::new(MemoryStore::new()), &settings);

    if let Some(path) = &cli.samples {
        let ingested = ingest_file(&service, path).await?;
        info!(ingested, file = %path.display(), "samples loaded");
    }

    let output = match cli.query {
        Query::Operators { from, to } => {
            let operators = service.running_operators(from, to).await?;
            serde_json::to_string_pretty(&operators)?
        }
        Query::Vehicles {
            from,
            to,
            operator,
            stopped,
        } => {
            let vehicles = service.vehicles_of_operator(from, to, operator, stopped).await?;
            serde_json::to_string_pretty(&vehicles)?
        }
        Query::Trace { from, to, vehicle } => {
            let trace = service.vehicle_trace(from, to, vehicle).await?;
            serde_json::to_string_pretty(&trace)?
        }
    };
    println!("{}", output);

    service.pool().shutdown();
    Ok(())
}

async fn ingest_file(
    service: &FleetServiceImpl,
    path: &Path,
) -> Result<usize, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(path)?);
    let mut ingested = 0;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<VehicleData>(&line) {
            Ok(sample) => {
                service.ingest(sample).await?;
                ingested += 1;
            }
            Err(e) => warn!(line = number + 1, error = %e, "skipping malformed sample"),
        }
    }
    Ok(ingested)
}
