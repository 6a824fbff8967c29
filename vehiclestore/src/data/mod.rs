//! Sample and bucket types shared by the indexes and the repository.

pub mod parted;

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

pub use parted::PartedKeyValues;

/// One GPS/status ping of a vehicle.
///
/// Equality and ordering only look at `(ts, vehicle_id)`: a set of samples
/// holds at most one entry per vehicle and microsecond.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleData {
    /// Microseconds since the Unix epoch
    pub ts: i64,
    #[serde(default)]
    pub lon: f32,
    #[serde(default)]
    pub lat: f32,
    #[serde(default, deserialize_with = "nullable_string")]
    pub vehicle_id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub operator_id: String,
    /// Empty when the vehicle is not at a stop
    #[serde(default, deserialize_with = "nullable_string")]
    pub stop_id: String,
    #[serde(default)]
    pub stopped: bool,
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl VehicleData {
    pub fn new(ts: i64, vehicle_id: impl Into<String>, operator_id: impl Into<String>) -> Self {
        Self {
            ts,
            lon: 0.0,
            lat: 0.0,
            vehicle_id: vehicle_id.into(),
            operator_id: operator_id.into(),
            stop_id: String::new(),
            stopped: false,
        }
    }

    pub fn with_position(mut self, lon: f32, lat: f32) -> Self {
        self.lon = lon;
        self.lat = lat;
        self
    }

    pub fn at_stop(mut self, stop_id: impl Into<String>, stopped: bool) -> Self {
        self.stop_id = stop_id.into();
        self.stopped = stopped;
        self
    }

    /// A stopped sample is at a known stop and flagged as stopped.
    pub fn is_stopped(&self) -> bool {
        !self.stop_id.is_empty() && self.stopped
    }
}

impl PartialEq for VehicleData {
    fn eq(&self, other: &Self) -> bool {
        self.ts == other.ts && self.vehicle_id == other.vehicle_id
    }
}

impl Eq for VehicleData {}

impl PartialOrd for VehicleData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VehicleData {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.vehicle_id.cmp(&other.vehicle_id))
    }
}

/// Persisted aggregate of one vehicle's samples within one hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketHourVehicle {
    #[serde(default, deserialize_with = "nullable_string")]
    pub id: String,
    #[serde(default)]
    pub data: BTreeSet<VehicleData>,
    /// Stopped samples in `data`, maintained on insert
    #[serde(default)]
    pub stopped_count: usize,
}

impl BucketHourVehicle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: BTreeSet::new(),
            stopped_count: 0,
        }
    }

    /// Adds a sample, returning `false` if `(ts, vehicle_id)` was already present.
    pub fn insert(&mut self, sample: VehicleData) -> bool {
        let stopped = sample.is_stopped();
        let inserted = self.data.insert(sample);
        if inserted && stopped {
            self.stopped_count += 1;
        }
        inserted
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes a stored payload.
    ///
    /// Unknown fields are ignored; an empty payload, `null` or an empty array
    /// decode to `None`. The stopped counter is recounted from the samples
    /// rather than trusted.
    pub fn from_json(payload: &str) -> serde_json::Result<Option<Self>> {
        if payload.trim().is_empty() {
            return Ok(None);
        }
        let value: serde_json::Value = serde_json::from_str(payload)?;
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Array(ref items) if items.is_empty() => Ok(None),
            value => {
                let mut bucket: Self = serde_json::from_value(value)?;
                bucket.recount();
                Ok(Some(bucket))
            }
        }
    }

    fn recount(&mut self) {
        let counted = self.data.iter().filter(|s| s.is_stopped()).count();
        if counted != self.stopped_count {
            tracing::debug!(
                bucket = %self.id,
                stored = self.stopped_count,
                counted,
                "Stopped counter recounted"
            );
        }
        self.stopped_count = counted;
    }
}

/// Drops samples outside `[from, to]` from both ends of a sorted set.
///
/// Returns how many of the dropped samples were stopped samples.
pub fn trim_to_window(data: &mut BTreeSet<VehicleData>, from: i64, to: i64) -> usize {
    let mut dropped_stopped = 0;
    while data.first().is_some_and(|s| s.ts < from) {
        if data.pop_first().is_some_and(|s| s.is_stopped()) {
            dropped_stopped += 1;
        }
    }
    while data.last().is_some_and(|s| s.ts > to) {
        if data.pop_last().is_some_and(|s| s.is_stopped()) {
            dropped_stopped += 1;
        }
    }
    dropped_stopped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64, vehicle: &str) -> VehicleData {
        VehicleData::new(ts, vehicle, "o1")
    }

    #[test]
    fn test_ordering_by_ts_then_vehicle() {
        let mut set = BTreeSet::new();
        set.insert(sample(5, "b"));
        set.insert(sample(5, "a"));
        set.insert(sample(1, "z"));
        let order: Vec<(i64, &str)> = set.iter().map(|s| (s.ts, s.vehicle_id.as_str())).collect();
        assert_eq!(order, vec![(1, "z"), (5, "a"), (5, "b")]);
    }

    #[test]
    fn test_stopped_sample_needs_stop_id() {
        assert!(sample(1, "v").at_stop("s1", true).is_stopped());
        assert!(!sample(1, "v").at_stop("", true).is_stopped());
        assert!(!sample(1, "v").at_stop("s1", false).is_stopped());
    }

    #[test]
    fn test_insert_keeps_set_semantics_and_counter() {
        let mut bucket = BucketHourVehicle::new("v1");
        assert!(bucket.insert(sample(1, "v1").at_stop("s", true)));
        assert!(!bucket.insert(sample(1, "v1").at_stop("s", true)));
        assert!(bucket.insert(sample(2, "v1")));
        assert_eq!(bucket.data.len(), 2);
        assert_eq!(bucket.stopped_count, 1);
    }

    #[test]
    fn test_json_roundtrip_uses_camel_case() {
        let mut bucket = BucketHourVehicle::new("v1");
        bucket.insert(sample(10, "v1").with_position(1.5, -2.0).at_stop("s", true));
        let json = bucket.to_json().unwrap();
        assert!(json.contains("\"stoppedCount\":1"));
        assert!(json.contains("\"vehicleId\":\"v1\""));

        let decoded = BucketHourVehicle::from_json(&json).unwrap().unwrap();
        assert_eq!(decoded, bucket);
        assert_eq!(decoded.data.first().unwrap().lon, 1.5);
    }

    #[test]
    fn test_lenient_decoding() {
        assert_eq!(BucketHourVehicle::from_json("").unwrap(), None);
        assert_eq!(BucketHourVehicle::from_json("[]").unwrap(), None);
        assert_eq!(BucketHourVehicle::from_json("null").unwrap(), None);
        assert!(BucketHourVehicle::from_json("{not json").is_err());

        let payload = r#"{"id":"v1","extra":42,"data":[{"ts":3,"vehicleId":"v1","stopId":null}],"stoppedCount":7}"#;
        let bucket = BucketHourVehicle::from_json(payload).unwrap().unwrap();
        assert_eq!(bucket.data.len(), 1);
        assert_eq!(bucket.stopped_count, 0);
    }

    #[test]
    fn test_trim_counts_dropped_stopped_samples() {
        let mut data: BTreeSet<VehicleData> = (0..10)
            .map(|ts| sample(ts, "v").at_stop("s", ts % 2 == 0))
            .collect();
        let dropped = trim_to_window(&mut data, 3, 6);
        let kept: Vec<i64> = data.iter().map(|s| s.ts).collect();
        assert_eq!(kept, vec![3, 4, 5, 6]);
        // 0, 2, 8 were stopped
        assert_eq!(dropped, 3);

        let mut empty = data.clone();
        trim_to_window(&mut empty, 100, 200);
        assert!(empty.is_empty());
    }
}
