//! In-process record store.
//!
//! Serves offline mode from a JSON dataset and stands in for the remote
//! store in tests. Index semantics match the remote store: every index
//! field may carry several values per record.

use super::types::{Condition, Op, Page, PageInfo, Query, RecordStore, StoreError};
use crate::record::{CityRecord, Indexed, ShrineRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 100;

struct StoredRecord {
    id: String,
    value: Value,
    index: HashMap<String, Vec<String>>,
}

impl StoredRecord {
    fn matches(&self, condition: &Condition) -> bool {
        let Some(values) = self.index.get(&condition.field) else {
            return false;
        };
        match condition.op {
            Op::Eq => values.iter().any(|v| *v == condition.value),
            Op::StartsWith => values.iter().any(|v| v.starts_with(&condition.value)),
        }
    }

    /// A multi-valued field sorts by its first value.
    fn sort_key(&self, field: &str) -> Option<&str> {
        self.index.get(field)?.first().map(String::as_str)
    }
}

/// On-disk dataset layout: `{ "shrines": [...], "cities": [...] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub shrines: Vec<ShrineRecord>,
    #[serde(default)]
    pub cities: Vec<CityRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<StoredRecord>>,
    pending_failures: AtomicUsize,
    exec_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `records` under `collection`, computing their index entries.
    pub fn insert<T, I>(&mut self, collection: &str, records: I) -> Result<(), StoreError>
    where
        T: Indexed + Serialize,
        I: IntoIterator<Item = T>,
    {
        let stored = self.collections.entry(collection.to_string()).or_default();
        for record in records {
            let index = T::INDEX_FIELDS
                .iter()
                .map(|field| (field.to_string(), record.index_values(field)))
                .collect();
            let value = serde_json::to_value(&record).map_err(|e| StoreError::Dataset(e.to_string()))?;
            stored.push(StoredRecord { id: record.id().to_string(), value, index });
        }
        Ok(())
    }

    pub fn from_dataset(dataset: Dataset, shrine_collection: &str, city_collection: &str) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.insert(shrine_collection, dataset.shrines)?;
        store.insert(city_collection, dataset.cities)?;
        Ok(store)
    }

    /// Load a dataset file.
    pub fn load(path: &Path, shrine_collection: &str, city_collection: &str) -> Result<Self, StoreError> {
        let data = fs::read_to_string(path)
            .map_err(|e| StoreError::Dataset(format!("{}: {}", path.display(), e)))?;
        let dataset: Dataset = serde_json::from_str(&data)
            .map_err(|e| StoreError::Dataset(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), shrines = dataset.shrines.len(), cities = dataset.cities.len(), "loaded dataset");
        Self::from_dataset(dataset, shrine_collection, city_collection)
    }

    /// Make the next `n` calls to `exec` fail with a network error.
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `exec` calls served so far, failed ones included.
    pub fn exec_calls(&self) -> usize {
        self.exec_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, Vec::len)
    }
}

impl RecordStore for MemoryStore {
    fn exec(&self, query: &Query) -> Result<Page<Value>, StoreError> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Network("injected failure".into()));
        }

        let records = self
            .collections
            .get(&query.collection)
            .ok_or_else(|| StoreError::UnknownCollection(query.collection.clone()))?;

        let mut matched: Vec<&StoredRecord> = records
            .iter()
            .filter(|r| query.conditions.iter().all(|c| r.matches(c)))
            .collect();

        match query.order_by.as_deref() {
            Some(field) => matched.sort_by(|a, b| {
                a.sort_key(field).cmp(&b.sort_key(field)).then_with(|| a.id.cmp(&b.id))
            }),
            None => matched.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        let offset = match &query.cursor {
            Some(c) => c.parse::<usize>().map_err(|_| StoreError::InvalidCursor(c.clone()))?,
            None => 0,
        };
        let size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);

        let data: Vec<Value> = matched.iter().skip(offset).take(size).map(|r| r.value.clone()).collect();
        let end = offset + data.len();

        Ok(Page {
            data,
            page_info: PageInfo {
                end_cursor: Some(end.to_string()),
                has_next_page: end < matched.len(),
            },
        })
    }

    fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let records = self
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(records.iter().find(|r| r.id == id).map(|r| r.value.clone()))
    }
}
