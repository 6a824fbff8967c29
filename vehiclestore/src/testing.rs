//! Helpers shared by the unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::config::{CacheSettings, Settings};

/// 2020-02-12 15:12:00 UTC.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 2, 12, 15, 12, 0).unwrap()
}

pub fn micros(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

pub fn hours(n: i64) -> Duration {
    Duration::hours(n)
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

pub fn millis(n: i64) -> Duration {
    Duration::milliseconds(n)
}

/// Settings where every cache knob has its own value.
pub fn distinct_settings() -> Settings {
    let mut settings = Settings::default();
    settings.cache = CacheSettings {
        ttl_secs: 7,
        tti_secs: 11,
        max_batch: 13,
        vehicles_capacity: 1,
        vehicle_hour_index_capacity: 2,
        operator_day_index_capacity: 3,
        operator_vehicle_hour_index_capacity: 4,
    };
    settings
}
