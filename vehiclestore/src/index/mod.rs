//! Time-bucketed secondary indexes.
//!
//! An index maps a coarse time bucket to the set of entity ids seen in it.
//! Each bucket is one record whose `data` map bin holds `"<bucket>:<id>"`
//! keys with a sentinel value, so appending an id is a single atomic map
//! insert on the store side.
//!
//! Three instantiations share [`TimeBucketIndex`]:
//! - [`VehicleHourIndex`]: hour record, vehicle ids
//! - [`OperatorDayIndex`]: day record, hour-granular operator entries
//! - [`OperatorVehicleHourIndex`]: hour record per operator, vehicle ids

mod operator_day;
mod operator_vehicle_hour;
mod vehicle_hour;

pub use operator_day::OperatorDayIndex;
pub use operator_vehicle_hour::OperatorVehicleHourIndex;
pub use vehicle_hour::VehicleHourIndex;

use std::sync::Arc;
use tracing::{info, warn};

use crate::buckets::{create_timed_key, parse_timed_key, Granularity};
use crate::config::Settings;
use crate::data::PartedKeyValues;
use crate::error::Result;
use crate::storage::{BatchReadCache, CachePolicy, Record, RecordStore, StoreTable};

/// Map bin holding the index entries.
pub const INDEX_BIN: &str = "data";
/// Value stored against every index entry.
pub const SENTINEL: i64 = 0;

/// Bucket-to-ids index over one table.
pub struct TimeBucketIndex {
    name: &'static str,
    record_granularity: Granularity,
    entry_granularity: Granularity,
    cache: BatchReadCache<Record>,
}

impl TimeBucketIndex {
    pub fn new(
        name: &'static str,
        store: Arc<dyn RecordStore>,
        table: StoreTable,
        record_granularity: Granularity,
        entry_granularity: Granularity,
        policy: CachePolicy,
    ) -> Self {
        Self {
            name,
            record_granularity,
            entry_granularity,
            cache: BatchReadCache::new(store, table, policy),
        }
    }

    fn record_key(&self, bucket: i64, partition: Option<&str>) -> String {
        match partition {
            Some(partition) => create_timed_key(bucket, partition),
            None => bucket.to_string(),
        }
    }

    /// Appends `entity` to the bucket holding `ts`.
    ///
    /// Re-inserting an existing entry leaves the record unchanged. The cached
    /// copy of the record is evicted so the next range read sees the entry.
    #[tracing::instrument(level = "trace", skip(self), fields(index = self.name))]
    pub fn write(&self, ts: i64, entity: &str, partition: Option<&str>) -> Result<()> {
        let key = self.record_key(self.record_granularity.bucket_of(ts), partition);
        let entry = create_timed_key(self.entry_granularity.bucket_of(ts), entity);
        self.cache
            .store()
            .map_insert(self.cache.table(), &key, INDEX_BIN, &entry, SENTINEL)?;
        self.cache.invalidate(&key);
        Ok(())
    }

    /// Collects every entry whose bucket overlaps `[from, to]`.
    #[tracing::instrument(level = "debug", skip(self), fields(index = self.name))]
    pub fn query_range(
        &self,
        from: i64,
        to: i64,
        partition: Option<&str>,
    ) -> Result<PartedKeyValues> {
        let keys: Vec<String> = self
            .record_granularity
            .intervals(from, to)
            .map(|bucket| self.record_key(bucket, partition))
            .collect();

        let mut entries = Vec::new();
        self.cache.batch_read(&keys, |key, record| {
            let Some(map) = record.and_then(|r| r.get_map(INDEX_BIN)) else {
                return;
            };
            for entry in map.keys() {
                match parse_timed_key(entry) {
                    Some((bucket, id)) => {
                        if self.entry_granularity.is_contained(from, to, bucket) {
                            entries.push((bucket, id.to_string()));
                        }
                    }
                    None => warn!(
                        index = self.name,
                        record = key,
                        entry = %entry,
                        "skipping malformed index entry"
                    ),
                }
            }
        })?;

        Ok(entries.into_iter().collect())
    }

    /// Evicts the cached record of the bucket holding `ts`.
    pub fn invalidate(&self, ts: i64, partition: Option<&str>) {
        let key = self.record_key(self.record_granularity.bucket_of(ts), partition);
        self.cache.invalidate(&key);
    }

    pub fn delete_all(&self) -> Result<()> {
        info!(index = self.name, table = %self.cache.table(), "deleting all index records");
        self.cache.store().range_delete(self.cache.table())?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

/// Cache policy of an index table with the given capacity.
pub(crate) fn index_policy(settings: &Settings, capacity: u64) -> CachePolicy {
    CachePolicy::new(
        capacity,
        settings.cache.ttl(),
        settings.cache.tti(),
        settings.cache.max_batch,
    )
}
