use std::sync::Arc;

use super::{index_policy, TimeBucketIndex};
use crate::buckets::Granularity;
use crate::config::Settings;
use crate::data::PartedKeyValues;
use crate::error::Result;
use crate::storage::{RecordStore, StoreTable};

/// Vehicles seen per hour, one unpartitioned record per hour.
pub struct VehicleHourIndex {
    index: TimeBucketIndex,
}

impl VehicleHourIndex {
    pub fn new(store: Arc<dyn RecordStore>, settings: &Settings) -> Self {
        let table = StoreTable::new(
            settings.namespace.clone(),
            settings.tables.vehicle_hour_index.clone(),
        );
        let policy = index_policy(settings, settings.cache.vehicle_hour_index_capacity);
        Self {
            index: TimeBucketIndex::new(
                "vehicle_hour",
                store,
                table,
                Granularity::Hour,
                Granularity::Hour,
                policy,
            ),
        }
    }

    pub fn write_vehicle(&self, ts: i64, vehicle_id: &str) -> Result<()> {
        self.index.write(ts, vehicle_id, None)
    }

    pub fn vehicles_in(&self, from: i64, to: i64) -> Result<PartedKeyValues> {
        self.index.query_range(from, to, None)
    }

    pub fn invalidate(&self, ts: i64) {
        self.index.invalidate(ts, None);
    }

    pub fn delete_all(&self) -> Result<()> {
        self.index.delete_all()
    }

    pub fn invalidate_all(&self) {
        self.index.invalidate_all();
    }
}
