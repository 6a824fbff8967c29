use std::collections::BTreeSet;
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use vehiclestore_core::{
    ElasticPool, RecordStore, Result, Settings, VehicleData, VehicleDataStore, VehiclesRepository,
};

/// One position of a vehicle trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsPoint {
    pub ts_micro: i64,
    pub lon: f32,
    pub lat: f32,
}

/// Positions of one vehicle, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTrace {
    pub id: String,
    pub trace: Vec<GpsPoint>,
}

impl VehicleTrace {
    pub fn from_samples(id: impl Into<String>, samples: &BTreeSet<VehicleData>) -> Self {
        Self {
            id: id.into(),
            trace: samples
                .iter()
                .map(|s| GpsPoint {
                    ts_micro: s.ts,
                    lon: s.lon,
                    lat: s.lat,
                })
                .collect(),
        }
    }
}

/// Distinct vehicle ids of a sample set.
pub fn vehicle_ids(samples: &BTreeSet<VehicleData>) -> BTreeSet<String> {
    samples.iter().map(|s| s.vehicle_id.clone()).collect()
}

/// Async entry points of the fleet queries.
///
/// Bounds are microseconds since the Unix epoch, inclusive.
#[async_trait]
pub trait FleetService: Send + Sync {
    async fn ingest(&self, sample: VehicleData) -> Result<()>;
    async fn running_operators(&self, from: i64, to: i64) -> Result<BTreeSet<String>>;
    /// Vehicles the operator ran, or only those stopped throughout when `stopped` is set.
    async fn vehicles_of_operator(
        &self,
        from: i64,
        to: i64,
        operator_id: String,
        stopped: bool,
    ) -> Result<BTreeSet<String>>;
    async fn vehicle_trace(&self, from: i64, to: i64, vehicle_id: String) -> Result<VehicleTrace>;
}

/// [`FleetService`] that runs every repository call on the worker pool.
pub struct FleetServiceImpl {
    repository: Arc<dyn VehiclesRepository>,
    pool: Arc<ElasticPool>,
}

impl FleetServiceImpl {
    pub fn new(repository: Arc<dyn VehiclesRepository>, pool: Arc<ElasticPool>) -> Self {
        Self { repository, pool }
    }

    /// Builds the pool and the repository over `store`.
    pub fn from_settings(store: Arc<dyn RecordStore>, settings: &Settings) -> Self {
        let pool = Arc::new(ElasticPool::from_settings(&settings.pool));
        let repository = Arc::new(VehicleDataStore::new(store, Arc::clone(&pool), settings));
        Self::new(repository, pool)
    }

    pub fn repository(&self) -> &Arc<dyn VehiclesRepository> {
        &self.repository
    }

    pub fn pool(&self) -> &Arc<ElasticPool> {
        &self.pool
    }

    async fn run<T, F>(&self, call: F) -> Result<T>
    where
        F: FnOnce(&dyn VehiclesRepository) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let repository = Arc::clone(&self.repository);
        self.pool.spawn(move || call(repository.as_ref()))?.await?
    }
}

#[async_trait]
impl FleetService for FleetServiceImpl {
    async fn ingest(&self, sample: VehicleData) -> Result<()> {
        self.run(move |repository| repository.write_data(&sample)).await
    }

    async fn running_operators(&self, from: i64, to: i64) -> Result<BTreeSet<String>> {
        self.run(move |repository| repository.get_operators(from, to)).await
    }

    async fn vehicles_of_operator(
        &self,
        from: i64,
        to: i64,
        operator_id: String,
        stopped: bool,
    ) -> Result<BTreeSet<String>> {
        self.run(move |repository| {
            if stopped {
                repository.get_vehicles_stopped_of_operator(from, to, &operator_id)
            } else {
                repository
                    .get_vehicles_of_operator(from, to, &operator_id)
                    .map(|samples| vehicle_ids(&samples))
            }
        })
        .await
    }

    async fn vehicle_trace(&self, from: i64, to: i64, vehicle_id: String) -> Result<VehicleTrace> {
        self.run(move |repository| {
            let samples = repository.get_vehicles_data_with_id(from, to, &vehicle_id)?;
            Ok(VehicleTrace::from_samples(vehicle_id, &samples))
        })
        .await
    }
}
