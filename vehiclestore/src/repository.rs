//! Vehicle sample repository.
//!
//! Samples are stored per (hour, vehicle) bucket in the vehicles table and
//! indexed three ways so range queries never scan samples they cannot use:
//! - by hour, for a single vehicle's trace
//! - by operator and hour (day records), for the running operators
//! - by hour within an operator, for an operator's vehicles
//!
//! Writes are not transactional. A bucket update is a read-modify-write
//! with no lock: two concurrent writers to the same (hour, vehicle) bucket
//! race and the last put wins. The bucket put and the three index appends
//! are independent store calls; a failure between them leaves the sample
//! unreachable by range queries until the index entries are written again.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::buckets::{create_timed_key, parse_timed_key, Granularity};
use crate::config::Settings;
use crate::data::{trim_to_window, BucketHourVehicle, VehicleData};
use crate::error::{Result, StoreError};
use crate::index::{OperatorDayIndex, OperatorVehicleHourIndex, VehicleHourIndex};
use crate::pool::ElasticPool;
use crate::storage::{BatchReadCache, BinValue, CachePolicy, Record, RecordStore, StoreTable};

/// Bin holding the JSON encoded bucket.
pub const DATA_BIN: &str = "databin";

type CachedBucket = Option<Arc<BucketHourVehicle>>;

/// Write and range-query contract over vehicle samples.
///
/// Bounds are microseconds since the Unix epoch, inclusive on both ends.
pub trait VehiclesRepository: Send + Sync {
    /// Stores a sample and appends it to every index.
    fn write_data(&self, sample: &VehicleData) -> Result<()>;

    /// Operators with at least one sample in `[from, to]`.
    fn get_operators(&self, from: i64, to: i64) -> Result<BTreeSet<String>>;

    /// Samples in `[from, to]` of every vehicle the operator ran.
    fn get_vehicles_of_operator(
        &self,
        from: i64,
        to: i64,
        operator_id: &str,
    ) -> Result<BTreeSet<VehicleData>>;

    /// Vehicles of the operator whose every sample in `[from, to]` is stopped.
    fn get_vehicles_stopped_of_operator(
        &self,
        from: i64,
        to: i64,
        operator_id: &str,
    ) -> Result<BTreeSet<String>>;

    /// Samples of one vehicle in `[from, to]`.
    fn get_vehicles_data_with_id(
        &self,
        from: i64,
        to: i64,
        vehicle_id: &str,
    ) -> Result<BTreeSet<VehicleData>>;

    /// Evicts every cache entry the sample's write touched.
    fn invalidate_sample(&self, sample: &VehicleData);

    fn delete_all_data(&self) -> Result<()>;

    fn invalidate_all_cache(&self);
}

/// [`VehiclesRepository`] over a [`RecordStore`].
pub struct VehicleDataStore {
    store: Arc<dyn RecordStore>,
    buckets: BatchReadCache<CachedBucket>,
    vehicle_index: VehicleHourIndex,
    operator_index: OperatorDayIndex,
    operator_vehicle_index: OperatorVehicleHourIndex,
    pool: Arc<ElasticPool>,
}

impl VehicleDataStore {
    pub fn new(store: Arc<dyn RecordStore>, pool: Arc<ElasticPool>, settings: &Settings) -> Self {
        let table = StoreTable::new(settings.namespace.clone(), settings.tables.vehicles.clone());
        let policy = CachePolicy::new(
            settings.cache.vehicles_capacity,
            settings.cache.ttl(),
            settings.cache.tti(),
            settings.cache.max_batch,
        );

        Self {
            buckets: BatchReadCache::new(Arc::clone(&store), table, policy),
            vehicle_index: VehicleHourIndex::new(Arc::clone(&store), settings),
            operator_index: OperatorDayIndex::new(Arc::clone(&store), settings),
            operator_vehicle_index: OperatorVehicleHourIndex::new(Arc::clone(&store), settings),
            store,
            pool,
        }
    }

    /// Cached bucket for `key`, falling back to a single-key store read.
    fn load_bucket(&self, key: &str) -> Result<CachedBucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Ok(bucket);
        }
        let record = self.store.get(self.buckets.table(), key)?;
        Ok(decode_bucket(key, record))
    }

    fn read_buckets(&self, keys: &[String]) -> Result<HashMap<String, CachedBucket>> {
        self.buckets.batch_read_mapped(keys, decode_bucket)
    }

    /// Union of the buckets' samples, trimmed to `[from, to]`.
    fn collect_samples(
        &self,
        keys: &[String],
        from: i64,
        to: i64,
    ) -> Result<BTreeSet<VehicleData>> {
        let mut samples = BTreeSet::new();
        for bucket in self.read_buckets(keys)?.into_values().flatten() {
            samples.extend(bucket.data.iter().cloned());
        }
        trim_to_window(&mut samples, from, to);
        Ok(samples)
    }

    /// Candidates with at least one of their own samples in `[from, to]`.
    fn running_operators(
        &self,
        from: i64,
        to: i64,
        candidates: &[String],
    ) -> Result<BTreeSet<String>> {
        let mut running = BTreeSet::new();
        for operator_id in candidates {
            let samples = self.get_vehicles_of_operator(from, to, operator_id)?;
            if samples
                .iter()
                .any(|s| s.ts >= from && s.ts <= to && s.operator_id == *operator_id)
            {
                running.insert(operator_id.clone());
            }
        }
        Ok(running)
    }
}

impl VehiclesRepository for VehicleDataStore {
    #[tracing::instrument(
        level = "trace",
        skip(self, sample),
        fields(vehicle = %sample.vehicle_id, ts = sample.ts)
    )]
    fn write_data(&self, sample: &VehicleData) -> Result<()> {
        let hour = Granularity::Hour.bucket_of(sample.ts);
        let key = create_timed_key(hour, &sample.vehicle_id);

        let mut bucket = match self.load_bucket(&key)? {
            Some(bucket) => (*bucket).clone(),
            None => BucketHourVehicle::new(sample.vehicle_id.clone()),
        };
        if !bucket.insert(sample.clone()) {
            debug!(key = %key, "sample already stored");
        }

        let payload = bucket.to_json().map_err(|source| StoreError::Encode {
            key: key.clone(),
            source,
        })?;
        self.store.put(
            self.buckets.table(),
            &key,
            vec![(DATA_BIN.to_string(), BinValue::Str(payload))],
        )?;
        self.buckets.insert(key, Some(Arc::new(bucket)));

        self.vehicle_index.write_vehicle(sample.ts, &sample.vehicle_id)?;
        self.operator_index.write_operator(sample.ts, &sample.operator_id)?;
        self.operator_vehicle_index
            .write_vehicle(sample.ts, &sample.operator_id, &sample.vehicle_id)?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn get_operators(&self, from: i64, to: i64) -> Result<BTreeSet<String>> {
        let parted = self.operator_index.operators_in(from, to)?;
        let (Some(&first), Some(&last)) = (parted.hours.first(), parted.hours.last()) else {
            return Ok(BTreeSet::new());
        };

        let hour = Granularity::Hour;
        let first_start = hour.start_of(first);
        let last_end = hour.end_of(last);
        if from <= first_start && to >= last_end {
            return Ok(parted.hours_by_value.into_keys().collect());
        }

        let values = &parted.values_on_each_hour;
        if values.len() == 1 {
            return self.running_operators(from, to, &values[0]);
        }

        let mut operators = BTreeSet::new();
        let mut interior = 0..values.len();
        if from > first_start {
            interior.start += 1;
            operators.extend(self.running_operators(from, hour.end_of(first), &values[0])?);
        }
        if to < last_end {
            interior.end -= 1;
            let last_values = &values[values.len() - 1];
            operators.extend(self.running_operators(hour.start_of(last), to, last_values)?);
        }
        for ids in &values[interior] {
            operators.extend(ids.iter().cloned());
        }
        Ok(operators)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn get_vehicles_of_operator(
        &self,
        from: i64,
        to: i64,
        operator_id: &str,
    ) -> Result<BTreeSet<VehicleData>> {
        let parted = self.operator_vehicle_index.vehicles_of(from, to, operator_id)?;
        if parted.is_empty() {
            return Ok(BTreeSet::new());
        }
        self.collect_samples(&parted.timed_keys(), from, to)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn get_vehicles_stopped_of_operator(
        &self,
        from: i64,
        to: i64,
        operator_id: &str,
    ) -> Result<BTreeSet<String>> {
        let parted = self.operator_vehicle_index.vehicles_of(from, to, operator_id)?;
        if parted.is_empty() {
            return Ok(BTreeSet::new());
        }

        let buckets: Vec<(String, CachedBucket)> =
            self.read_buckets(&parted.timed_keys())?.into_iter().collect();
        let results = self.pool.fan_out(buckets, move |(key, bucket)| {
            stopped_in_window(from, to, &key, bucket.as_deref())
        })?;

        let mut verdicts: HashMap<String, bool> = HashMap::new();
        for (vehicle_id, stopped) in results.into_iter().flatten() {
            verdicts
                .entry(vehicle_id)
                .and_modify(|all| *all &= stopped)
                .or_insert(stopped);
        }
        Ok(verdicts
            .into_iter()
            .filter_map(|(vehicle_id, stopped)| stopped.then_some(vehicle_id))
            .collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn get_vehicles_data_with_id(
        &self,
        from: i64,
        to: i64,
        vehicle_id: &str,
    ) -> Result<BTreeSet<VehicleData>> {
        let keys = self.vehicle_index.vehicles_in(from, to)?.timed_keys_of(vehicle_id);
        if keys.is_empty() {
            return Ok(BTreeSet::new());
        }
        self.collect_samples(&keys, from, to)
    }

    fn invalidate_sample(&self, sample: &VehicleData) {
        let hour = Granularity::Hour.bucket_of(sample.ts);
        self.buckets.invalidate(&create_timed_key(hour, &sample.vehicle_id));
        self.vehicle_index.invalidate(sample.ts);
        self.operator_index.invalidate(sample.ts);
        self.operator_vehicle_index.invalidate(sample.ts, &sample.operator_id);
    }

    fn delete_all_data(&self) -> Result<()> {
        self.operator_vehicle_index.delete_all()?;
        self.operator_index.delete_all()?;
        self.vehicle_index.delete_all()?;
        info!(table = %self.buckets.table(), "deleting all vehicle buckets");
        self.store.range_delete(self.buckets.table())?;
        self.buckets.invalidate_all();
        Ok(())
    }

    fn invalidate_all_cache(&self) {
        self.operator_vehicle_index.invalidate_all();
        self.operator_index.invalidate_all();
        self.vehicle_index.invalidate_all();
        self.buckets.invalidate_all();
        info!("vehicle caches cleared");
    }
}

/// Decodes a vehicles-table record; undecodable payloads read as absent.
fn decode_bucket(key: &str, record: Option<Record>) -> CachedBucket {
    let record = record?;
    let payload = record.get_str(DATA_BIN)?;
    match BucketHourVehicle::from_json(payload) {
        Ok(bucket) => bucket.map(Arc::new),
        Err(e) => {
            warn!(key, error = %e, "undecodable vehicle bucket, treating as absent");
            None
        }
    }
}

/// Whether every sample of one (hour, vehicle) bucket inside `[from, to]` is
/// stopped.
///
/// Returns `None` when the key is malformed, the bucket is absent or no
/// sample falls inside the window, so the bucket takes no part in the
/// vehicle's verdict.
pub fn stopped_in_window(
    from: i64,
    to: i64,
    key: &str,
    bucket: Option<&BucketHourVehicle>,
) -> Option<(String, bool)> {
    let Some((_, vehicle_id)) = parse_timed_key(key) else {
        warn!(key, "skipping malformed bucket key");
        return None;
    };
    let bucket = bucket?;

    let mut samples = bucket.data.clone();
    let dropped_stopped = trim_to_window(&mut samples, from, to);
    if samples.is_empty() {
        return None;
    }
    let stopped = bucket.stopped_count.saturating_sub(dropped_stopped);
    Some((vehicle_id.to_string(), stopped == samples.len()))
}
