/*!
# Vehiclestore: Time-Bucketed Indexes and Cached Range Queries over Vehicle GPS Pings

Vehiclestore answers time-range questions over a high-volume stream of vehicle
GPS pings: which operators ran between two instants, which vehicles an operator
used, which of those stood still, and the trace of a single vehicle. It keeps
derived time-bucketed indexes over a record-oriented key-value store and merges
them on read.

## Key Features

### Bucketed Storage
- One aggregate record per (hour, vehicle), holding a sorted sample set and a
  running count of stopped samples
- Three secondary indexes: vehicles per hour, operators per hour (stored per
  day), vehicles per hour within an operator
- Index appends are atomic map inserts, safe to repeat

### Batched Read Caching
- Every table is read through a batching cache backed by `moka`
- Size-bounded, with time-to-live and time-to-idle expiry
- Writes overwrite the cached bucket, so a process reads its own writes

### Elastic Worker Pool
- Core threads stay warm, extra threads are added up to a ceiling under load
- Submissions are never rejected; excess work waits on a hand-off queue
- Parallel fan-out that is safe to nest inside pool tasks

## Usage

```rust,no_run
use std::sync::Arc;
use vehiclestore_core::config::Settings;
use vehiclestore_core::data::VehicleData;
use vehiclestore_core::pool::ElasticPool;
use vehiclestore_core::repository::{VehicleDataStore, VehiclesRepository};
use vehiclestore_core::storage::MemoryStore;

fn main() -> Result<(), vehiclestore_core::StoreError> {
    let settings = Settings::default();
    let pool = Arc::new(ElasticPool::from_settings(&settings.pool));
    let repository = VehicleDataStore::new(Arc::new(MemoryStore::new()), pool, &settings);

    let ts = 1_583_939_520_000_000;
    repository.write_data(&VehicleData::new(ts, "v1", "o1").at_stop("s1", true))?;

    let operators = repository.get_operators(ts - 3_600_000_000, ts + 3_600_000_000)?;
    let stopped = repository.get_vehicles_stopped_of_operator(ts, ts, "o1")?;
    println!("{:?} {:?}", operators, stopped);
    Ok(())
}
```

For details, see:
- [`config`](crate::config) for settings and their sources
- [`storage`](crate::storage) for the record store contract and the read cache
- [`repository`](crate::repository) for the query semantics
*/

pub mod buckets;
pub mod config;
pub mod data;
pub mod error;
pub mod index;
pub mod pool;
pub mod repository;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Settings;
pub use data::{BucketHourVehicle, PartedKeyValues, VehicleData};
pub use error::{Result, StoreError};
pub use pool::{ElasticPool, PoolConfig, TaskHandle};
pub use repository::{VehicleDataStore, VehiclesRepository};
pub use storage::{MemoryStore, RecordStore};
