//! Configuration management for the vehicle store.
//!
//! Settings are layered from, in increasing precedence:
//! 1. Default configuration (embedded in the binary)
//! 2. System-wide configuration file (`/etc/vehiclestore/config.toml`)
//! 3. User-specified configuration file (`--config`)
//! 4. Environment variables (prefixed with `VEHICLESTORE_`, nested keys
//!    separated by `__`, e.g. `VEHICLESTORE_CACHE__TTL_SECS=60`)
//! 5. Command-line arguments

use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const DEFAULT_CONFIG_PATH: &str = "/etc/vehiclestore/config.toml";

/// Command-line overrides for the store settings.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Namespace holding every table
    #[arg(long, env = "VEHICLESTORE_NAMESPACE")]
    namespace: Option<String>,

    /// Threads kept warm in the worker pool
    #[arg(long)]
    core_threads: Option<usize>,

    /// Upper bound on worker pool threads
    #[arg(long)]
    max_threads: Option<usize>,

    /// Idle seconds before a thread beyond the core is retired
    #[arg(long)]
    keep_alive_secs: Option<u64>,

    /// Cache time-to-live in seconds
    #[arg(long)]
    cache_ttl_secs: Option<u64>,

    /// Maximum keys per batch read
    #[arg(long)]
    max_batch: Option<usize>,
}

/// Complete store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Namespace shared by every table
    pub namespace: String,
    pub tables: TableSettings,
    pub cache: CacheSettings,
    pub pool: PoolSettings,
}

/// Set names of the four tables the engine reads and writes.
#[derive(Debug, Clone, Deserialize)]
pub struct TableSettings {
    /// Per (hour, vehicle) sample buckets
    pub vehicles: String,
    pub vehicle_hour_index: String,
    pub operator_day_index: String,
    pub operator_vehicle_hour_index: String,
}

/// Cache sizing and expiry, one capacity per table.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Seconds an entry lives after its last write
    pub ttl_secs: u64,
    /// Seconds an entry lives after its last access
    pub tti_secs: u64,
    /// Keys per network batch read
    pub max_batch: usize,
    pub vehicles_capacity: u64,
    pub vehicle_hour_index_capacity: u64,
    pub operator_day_index_capacity: u64,
    pub operator_vehicle_hour_index_capacity: u64,
}

/// Elastic worker pool sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    /// Threads kept warm; 0 selects the available parallelism
    pub core_threads: usize,
    /// Thread ceiling; 0 selects twice the core threads
    pub max_threads: usize,
    pub keep_alive_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "test".to_string(),
            tables: TableSettings {
                vehicles: "vehicles".to_string(),
                vehicle_hour_index: "datevehiclepart".to_string(),
                operator_day_index: "datepart".to_string(),
                operator_vehicle_hour_index: "vehicByOpPart".to_string(),
            },
            cache: CacheSettings::default(),
            pool: PoolSettings::default(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            tti_secs: 300,
            max_batch: 1_000,
            vehicles_capacity: 1_000,
            vehicle_hour_index_capacity: 100_000,
            operator_day_index_capacity: 1_000,
            operator_vehicle_hour_index_capacity: 1_000,
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            core_threads: 0,
            max_threads: 0,
            keep_alive_secs: 60,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn tti(&self) -> Duration {
        Duration::from_secs(self.tti_secs)
    }
}

impl PoolSettings {
    /// Resolves the zero placeholders against the machine's parallelism.
    pub fn resolved(&self) -> (usize, usize) {
        let core = if self.core_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.core_threads
        };
        let max = if self.max_threads == 0 {
            core * 2
        } else {
            self.max_threads.max(core)
        };
        (core, max)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl Settings {
    /// Loads configuration from all available sources.
    pub fn new(cli: &CliArgs) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        // Load system configuration if it exists
        if let Ok(metadata) = std::fs::metadata(DEFAULT_CONFIG_PATH) {
            if metadata.is_file() {
                builder = builder.add_source(File::from(PathBuf::from(DEFAULT_CONFIG_PATH)));
            }
        }

        if let Some(ref config_path) = cli.config {
            builder = builder.add_source(File::from(config_path.clone()));
        }

        builder = builder.add_source(
            Environment::with_prefix("VEHICLESTORE")
                .prefix_separator("_")
                .separator("__"),
        );

        if let Some(ref namespace) = cli.namespace {
            builder = builder.set_override("namespace", namespace.as_str())?;
        }
        if let Some(core) = cli.core_threads {
            builder = builder.set_override("pool.core_threads", core as u64)?;
        }
        if let Some(max) = cli.max_threads {
            builder = builder.set_override("pool.max_threads", max as u64)?;
        }
        if let Some(secs) = cli.keep_alive_secs {
            builder = builder.set_override("pool.keep_alive_secs", secs)?;
        }
        if let Some(secs) = cli.cache_ttl_secs {
            builder = builder.set_override("cache.ttl_secs", secs)?;
        }
        if let Some(max_batch) = cli.max_batch {
            builder = builder.set_override("cache.max_batch", max_batch as u64)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}
