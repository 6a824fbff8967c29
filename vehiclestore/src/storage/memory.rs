//! In-process record store.
//!
//! Holds every table in a map guarded by a read-write lock. It honours the
//! full [`RecordStore`] contract, including map-bin insert semantics, and
//! counts round trips so callers can observe batching and caching.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, StoreError};
use crate::storage::{BinValue, Record, RecordStore, StoreTable};

type Table = HashMap<String, Record>;

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<StoreTable, Table>>,
    gets: AtomicUsize,
    batch_gets: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-key reads served so far.
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::Relaxed)
    }

    /// Batch reads served so far.
    pub fn batch_get_calls(&self) -> usize {
        self.batch_gets.load(Ordering::Relaxed)
    }

    /// Records currently stored in a table.
    pub fn len(&self, table: &StoreTable) -> usize {
        self.tables.read().get(table).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, table: &StoreTable) -> bool {
        self.len(table) == 0
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, table: &StoreTable, key: &str) -> Result<Option<Record>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn batch_get(&self, table: &StoreTable, keys: &[String]) -> Result<Vec<Option<Record>>> {
        self.batch_gets.fetch_add(1, Ordering::Relaxed);
        let tables = self.tables.read();
        let records = tables.get(table);
        Ok(keys
            .iter()
            .map(|key| records.and_then(|r| r.get(key)).cloned())
            .collect())
    }

    fn put(&self, table: &StoreTable, key: &str, bins: Vec<(String, BinValue)>) -> Result<()> {
        let mut tables = self.tables.write();
        let record = tables
            .entry(table.clone())
            .or_default()
            .entry(key.to_string())
            .or_default();
        record.bins.extend(bins);
        Ok(())
    }

    fn map_insert(
        &self,
        table: &StoreTable,
        key: &str,
        bin: &str,
        map_key: &str,
        value: i64,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let record = tables
            .entry(table.clone())
            .or_default()
            .entry(key.to_string())
            .or_default();
        let bin_value = record
            .bins
            .entry(bin.to_string())
            .or_insert_with(|| BinValue::Map(BTreeMap::new()));
        match bin_value {
            BinValue::Map(map) => {
                map.insert(map_key.to_string(), value);
                Ok(())
            }
            _ => Err(StoreError::WrongBinType {
                key: key.to_string(),
                bin: bin.to_string(),
            }),
        }
    }

    fn range_delete(&self, table: &StoreTable) -> Result<()> {
        self.tables.write().remove(table);
        Ok(())
    }
}
