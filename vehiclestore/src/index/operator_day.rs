use std::sync::Arc;

use super::{index_policy, TimeBucketIndex};
use crate::buckets::Granularity;
use crate::config::Settings;
use crate::data::PartedKeyValues;
use crate::error::Result;
use crate::storage::{RecordStore, StoreTable};

/// Operators seen per hour, stored as one record per day.
///
/// Range reads touch at most one record per day while still answering at
/// hour granularity.
pub struct OperatorDayIndex {
    index: TimeBucketIndex,
}

impl OperatorDayIndex {
    pub fn new(store: Arc<dyn RecordStore>, settings: &Settings) -> Self {
        let table = StoreTable::new(
            settings.namespace.clone(),
            settings.tables.operator_day_index.clone(),
        );
        let policy = index_policy(settings, settings.cache.operator_day_index_capacity);
        Self {
            index: TimeBucketIndex::new(
                "operator_day",
                store,
                table,
                Granularity::Day,
                Granularity::Hour,
                policy,
            ),
        }
    }

    pub fn write_operator(&self, ts: i64, operator_id: &str) -> Result<()> {
        self.index.write(ts, operator_id, None)
    }

    /// Hours in `[from, to]` and the operators seen in each.
    pub fn operators_in(&self, from: i64, to: i64) -> Result<PartedKeyValues> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::HOUR_MICROS;
    use crate::storage::MemoryStore;
    use crate::testing::{base_time, distinct_settings, days, hours, micros};

    fn index() -> OperatorDayIndex {
        OperatorDayIndex::new(Arc::new(MemoryStore::new()), &Settings::default())
    }

    #[test]
    fn test_read_empty() {
        let parted = index()
            .operators_in(micros(base_time() - days(1)), micros(base_time() + days(1)))
            .unwrap();
        assert!(parted.is_empty());
    }

    #[test]
    fn test_three_hours_across_two_days() {
        let index = index();
        for ts in [base_time(), base_time() + hours(1), base_time() + days(1)] {
            index.write_operator(micros(ts), "1").unwrap();
            index.invalidate(micros(ts));
        }

        let parted = index
            .operators_in(micros(base_time() - days(1)), micros(base_time() + days(1)))
            .unwrap();
        assert_eq!(parted.hours.len(), 3);
        assert_eq!(parted.hours_by_value["1"], parted.hours);

        let empty = index
            .operators_in(micros(base_time() + days(2)), micros(base_time() + days(3)))
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_entries_are_hour_granular() {
        let index = index();
        let ts = micros(base_time());
        index.write_operator(ts, "early").unwrap();
        index.write_operator(ts + 3 * HOUR_MICROS, "late").unwrap();

        let parted = index.operators_in(ts, ts + HOUR_MICROS).unwrap();
        assert_eq!(parted.hours, vec![ts.div_euclid(HOUR_MICROS)]);
        assert!(parted.hours_by_value.contains_key("early"));
        assert!(!parted.hours_by_value.contains_key("late"));
    }

    #[test]
    fn test_cache_follows_the_settings() {
        let index = OperatorDayIndex::new(Arc::new(MemoryStore::new()), &distinct_settings());
        assert_eq!(index.index.record_granularity, Granularity::Day);
        assert_eq!(index.index.entry_granularity, Granularity::Hour);

        let cache = &index.index.cache;
        assert_eq!(cache.table().to_string(), "test.datepart");
        let policy = cache.policy();
        assert_eq!(policy.capacity, 3);
        assert_eq!(policy.ttl, std::time::Duration::from_secs(7));
        assert_eq!(policy.tti, std::time::Duration::from_secs(11));
        assert_eq!(policy.max_batch, 13);
    }
}
