use std::sync::Arc;

use super::{index_policy, TimeBucketIndex};
use crate::buckets::Granularity;
use crate::config::Settings;
use crate::data::PartedKeyValues;
use crate::error::Result;
use crate::storage::{RecordStore, StoreTable};

/// Vehicles seen per hour, partitioned by operator.
pub struct OperatorVehicleHourIndex {
    index: TimeBucketIndex,
}

impl OperatorVehicleHourIndex {
    pub fn new(store: Arc<dyn RecordStore>, settings: &Settings) -> Self {
        let table = StoreTable::new(
            settings.namespace.clone(),
            settings.tables.operator_vehicle_hour_index.clone(),
        );
        let policy = index_policy(settings, settings.cache.operator_vehicle_hour_index_capacity);
        Self {
            index: TimeBucketIndex::new(
                "operator_vehicle_hour",
                store,
                table,
                Granularity::Hour,
                Granularity::Hour,
                policy,
            ),
        }
    }

    pub fn write_vehicle(&self, ts: i64, operator_id: &str, vehicle_id: &str) -> Result<()> {
        self.index.write(ts, vehicle_id, Some(operator_id))
    }

    pub fn vehicles_of(&self, from: i64, to: i64, operator_id: &str) -> Result<PartedKeyValues> {
        self.index.query_range(from, to, Some(operator_id))
    }

    pub fn invalidate(&self, ts: i64, operator_id: &str) {
        self.index.invalidate(ts, Some(operator_id));
    }

    pub fn delete_all(&self) -> Result<()> {
        self.index.delete_all()
    }

    pub fn invalidate_all(&self) {
        self.index.invalidate_all();
    }
}
