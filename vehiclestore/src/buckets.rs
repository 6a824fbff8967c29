//! Time bucket arithmetic and timed keys.
//!
//! Timestamps are microseconds since the Unix epoch. A bucket is a fixed-width
//! window identified by `floor(ts / width)`; a timed key is the string
//! `"<bucket>:<id>"`.

use std::ops::RangeInclusive;

pub const HOUR_MICROS: i64 = 3_600_000_000;
pub const DAY_MICROS: i64 = 86_400_000_000;

/// Width of a time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub const fn micros(self) -> i64 {
        match self {
            Granularity::Hour => HOUR_MICROS,
            Granularity::Day => DAY_MICROS,
        }
    }

    /// Bucket index containing `ts`.
    pub fn bucket_of(self, ts: i64) -> i64 {
        ts.div_euclid(self.micros())
    }

    /// First microsecond of `bucket`.
    pub fn start_of(self, bucket: i64) -> i64 {
        bucket * self.micros()
    }

    /// Last microsecond of `bucket`.
    pub fn end_of(self, bucket: i64) -> i64 {
        self.start_of(bucket) + self.micros() - 1
    }

    /// Every bucket index in `[bucket(from), bucket(to)]`.
    pub fn intervals(self, from: i64, to: i64) -> RangeInclusive<i64> {
        self.bucket_of(from)..=self.bucket_of(to)
    }

    /// Whether the window of `bucket` overlaps `[from, to]`.
    ///
    /// Buckets produced by [`Granularity::intervals`] for the same bounds
    /// always pass; the check only filters entries stored at a finer
    /// granularity than the record that holds them.
    pub fn is_contained(self, from: i64, to: i64, bucket: i64) -> bool {
        let start = self.start_of(bucket);
        let end = self.end_of(bucket);
        (start >= from && end <= to)
            || (from >= start && from <= end)
            || (to >= start && to <= end)
    }
}

pub fn create_timed_key(bucket: i64, id: &str) -> String {
    format!("{}:{}", bucket, id)
}

/// Splits `"<bucket>:<rest>"` on the first colon.
///
/// The remainder may itself contain colons. Returns `None` when the prefix is
/// not an integer or the remainder is empty.
pub fn parse_timed_key(key: &str) -> Option<(i64, &str)> {
    let (bucket, rest) = key.split_once(':')?;
    if rest.is_empty() {
        return None;
    }
    let bucket = bucket.parse().ok()?;
    Some((bucket, rest))
}
