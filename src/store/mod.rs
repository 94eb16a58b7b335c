//! The paginated record store the engine reads from.
//!
//! The engine only depends on [`RecordStore`]; `HttpStore` talks to the
//! published store and `MemoryStore` serves an offline dataset.

pub mod http;
pub mod memory;
pub mod types;

pub use http::HttpStore;
pub use memory::{Dataset, MemoryStore};
pub use types::{Condition, Op, Page, PageInfo, Query, RecordStore, StoreError};

use serde::de::DeserializeOwned;

/// Run `query` and decode the page into `T`.
pub fn fetch_page<T: DeserializeOwned>(store: &dyn RecordStore, query: &Query) -> Result<Page<T>, StoreError> {
    store.exec(query)?.decode()
}

/// Point lookup decoded into `T`.
pub fn find_as<T: DeserializeOwned>(store: &dyn RecordStore, collection: &str, id: &str) -> Result<Option<T>, StoreError> {
    match store.find(collection, id)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::InvalidResponse(e.to_string())),
        None => Ok(None),
    }
}
