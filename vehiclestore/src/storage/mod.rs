//! Record storage behind the indexes and the repository.
//!
//! The engine only talks to its backing store through [`RecordStore`], a
//! record-oriented interface modelled on a namespace/set key-value store:
//! - single-key and batched multi-key reads
//! - `put` of named bins
//! - atomic insert of a key into a map-typed bin
//! - range delete of a whole set
//!
//! Modules:
//! - `memory`: in-process implementation for tests and local runs
//! - `cache`: batching, caching read path shared by every table

pub mod cache;
pub mod memory;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::Result;

pub use cache::{BatchReadCache, CachePolicy};
pub use memory::MemoryStore;

/// Namespace and set addressing one logical table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreTable {
    pub namespace: String,
    pub set: String,
}

impl StoreTable {
    pub fn new(namespace: impl Into<String>, set: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
        }
    }
}

impl fmt::Display for StoreTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.set)
    }
}

/// Value held by a bin.
#[derive(Debug, Clone, PartialEq)]
pub enum BinValue {
    Str(String),
    Int(i64),
    /// Sorted map bin, the target of [`RecordStore::map_insert`]
    Map(BTreeMap<String, i64>),
}

/// A stored record: named bins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub bins: HashMap<String, BinValue>,
}

impl Record {
    pub fn with_bin(mut self, name: impl Into<String>, value: BinValue) -> Self {
        self.bins.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn get_str(&self, bin: &str) -> Option<&str> {
        match self.bins.get(bin) {
            Some(BinValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_map(&self, bin: &str) -> Option<&BTreeMap<String, i64>> {
        match self.bins.get(bin) {
            Some(BinValue::Map(map)) => Some(map),
            _ => None,
        }
    }
}

/// Backing store adapter.
///
/// Calls are blocking; callers run them on the elastic worker pool. Any
/// failure is returned as-is, the engine does not retry.
pub trait RecordStore: Send + Sync {
    /// Reads one record, `None` if absent.
    fn get(&self, table: &StoreTable, key: &str) -> Result<Option<Record>>;

    /// Reads many records; the result is parallel to `keys`.
    fn batch_get(&self, table: &StoreTable, keys: &[String]) -> Result<Vec<Option<Record>>>;

    /// Writes bins into a record, creating it if needed. Bins not named are kept.
    fn put(&self, table: &StoreTable, key: &str, bins: Vec<(String, BinValue)>) -> Result<()>;

    /// Atomically inserts `map_key -> value` into the map bin `bin`.
    /// Re-inserting an existing key leaves the map unchanged.
    fn map_insert(
        &self,
        table: &StoreTable,
        key: &str,
        bin: &str,
        map_key: &str,
        value: i64,
    ) -> Result<()>;

    /// Deletes every record of the table.
    fn range_delete(&self, table: &StoreTable) -> Result<()>;
}
