//! FleetStream: Time-Range Queries over Vehicle GPS Pings
//!
//! This library exposes the fleet queries of the vehicle store as async
//! calls: running operators, the vehicles of an operator (optionally only the
//! stopped ones) and the GPS trace of a vehicle. Every call is executed on
//! the elastic worker pool, so blocking store round trips never run on the
//! async runtime.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetstream::{FleetService, FleetServiceImpl, MemoryStore, Settings, VehicleData};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default();
//!     let service = FleetServiceImpl::from_settings(Arc::new(MemoryStore::new()), &settings);
//!
//!     let ts = 1_583_939_520_000_000;
//!     service.ingest(VehicleData::new(ts, "v1", "o1").with_position(-6.26, 53.34)).await?;
//!
//!     let operators = service.running_operators(ts - 3_600_000_000, ts).await?;
//!     println!("Running operators: {:?}", operators);
//!
//!     let trace = service.vehicle_trace(ts, ts, "v1".to_string()).await?;
//!     println!("Trace: {}", serde_json::to_string(&trace)?);
//!
//!     Ok(())
//! }
//! ```

pub mod service;
pub mod tests;

pub use service::{vehicle_ids, FleetService, FleetServiceImpl, GpsPoint, VehicleTrace};
pub use vehiclestore_core::{
    config::CliArgs, ElasticPool, MemoryStore, RecordStore, Settings, StoreError, VehicleData,
    VehicleDataStore, VehiclesRepository,
};
