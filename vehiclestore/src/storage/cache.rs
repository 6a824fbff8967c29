//! Cached batch read path over a [`RecordStore`] table.
//!
//! Every table of the engine is read through a [`BatchReadCache`]:
//! - keys already cached are answered locally
//! - the remaining keys are fetched in batches of at most `max_batch`
//! - fetched values are cached with time-to-live and time-to-idle expiry
//!
//! Two read modes exist. [`BatchReadCache::batch_read`] caches raw records
//! and only remembers records that exist, so a key written later is picked up
//! on the next read. [`BatchReadCache::batch_read_mapped`] caches the decoded
//! value of every key, absence included.

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::storage::{Record, RecordStore, StoreTable};

/// Sizing and expiry of one table cache.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub capacity: u64,
    pub ttl: Duration,
    pub tti: Duration,
    pub max_batch: usize,
}

impl CachePolicy {
    pub fn new(capacity: u64, ttl: Duration, tti: Duration, max_batch: usize) -> Self {
        Self {
            capacity,
            ttl,
            tti,
            max_batch: max_batch.max(1),
        }
    }
}

/// Read-through cache in front of one table.
pub struct BatchReadCache<V: Clone + Send + Sync + 'static> {
    store: Arc<dyn RecordStore>,
    table: StoreTable,
    cache: Cache<String, V>,
    policy: CachePolicy,
}

impl<V: Clone + Send + Sync + 'static> BatchReadCache<V> {
    pub fn new(store: Arc<dyn RecordStore>, table: StoreTable, policy: CachePolicy) -> Self {
        let policy = CachePolicy {
            max_batch: policy.max_batch.max(1),
            ..policy
        };
        let cache = Cache::builder()
            .max_capacity(policy.capacity)
            .time_to_live(policy.ttl)
            .time_to_idle(policy.tti)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self {
            store,
            table,
            cache,
            policy,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Live entries, after applying pending evictions and expirations.
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn table(&self) -> &StoreTable {
        &self.table
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.cache.get(key)
    }

    /// Overwrites the cached value of `key`.
    pub fn insert(&self, key: String, value: V) {
        self.cache.insert(key, value);
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Reads `keys`, decoding every fetched record with `decode`.
    ///
    /// Decoded values are cached even when the record was absent. The map
    /// holds one entry per distinct key.
    pub fn batch_read_mapped<F>(&self, keys: &[String], decode: F) -> Result<HashMap<String, V>>
    where
        F: Fn(&str, Option<Record>) -> V,
    {
        let mut values = HashMap::with_capacity(keys.len());
        let mut missed = HashSet::new();
        let mut misses = Vec::new();
        for key in keys {
            if values.contains_key(key) || missed.contains(key.as_str()) {
                continue;
            }
            match self.cache.get(key.as_str()) {
                Some(value) => {
                    values.insert(key.clone(), value);
                }
                None => {
                    missed.insert(key.as_str());
                    misses.push(key.clone());
                }
            }
        }

        debug!(
            table = %self.table,
            hits = values.len(),
            misses = misses.len(),
            "batch read"
        );

        for (key, record) in self.fetch(misses)? {
            let value = decode(&key, record);
            self.cache.insert(key.clone(), value.clone());
            values.insert(key, value);
        }
        Ok(values)
    }

    /// Fetches `keys` from the store in chunks of at most `max_batch`.
    fn fetch(&self, keys: Vec<String>) -> Result<Vec<(String, Option<Record>)>> {
        let mut fetched = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(self.policy.max_batch) {
            let records = self.store.batch_get(&self.table, chunk)?;
            if records.len() != chunk.len() {
                return Err(StoreError::BatchMismatch {
                    expected: chunk.len(),
                    actual: records.len(),
                });
            }
            fetched.extend(chunk.iter().cloned().zip(records));
        }
        Ok(fetched)
    }
}

impl BatchReadCache<Record> {
    /// Reads `keys`, calling `on_each` once per key in order.
    ///
    /// Only records that exist and carry at least one bin are cached.
    pub fn batch_read<F>(&self, keys: &[String], mut on_each: F) -> Result<()>
    where
        F: FnMut(&str, Option<&Record>),
    {
        let mut found: HashMap<String, Option<Record>> = HashMap::with_capacity(keys.len());
        let mut misses = Vec::new();
        for key in keys {
            if found.contains_key(key) {
                continue;
            }
            match self.cache.get(key.as_str()) {
                Some(record) => {
                    found.insert(key.clone(), Some(record));
                }
                None => {
                    found.insert(key.clone(), None);
                    misses.push(key.clone());
                }
            }
        }

        debug!(
            table = %self.table,
            hits = found.len() - misses.len(),
            misses = misses.len(),
            "batch read"
        );

        for (key, record) in self.fetch(misses)? {
            if let Some(record) = record.filter(|r| !r.is_empty()) {
                self.cache.insert(key.clone(), record.clone());
                found.insert(key, Some(record));
            }
        }

        for key in keys {
            on_each(key, found.get(key).and_then(Option::as_ref));
        }
        Ok(())
    }
}
