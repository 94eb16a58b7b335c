//! Remote record store over HTTP.
//!
//! `GET {base}/{collection}?where=field:op:value&orderBy=..&pageSize=..&cursor=..`
//! returns a page; `GET {base}/{collection}/{id}` returns one record or 404.

use super::types::{Page, Query, RecordStore, StoreError};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "ShrineAtlas/0.3 (index-engine)";

pub struct HttpStore {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, encode_segment(collection))
    }
}

impl RecordStore for HttpStore {
    fn exec(&self, query: &Query) -> Result<Page<Value>, StoreError> {
        let url = self.collection_url(&query.collection);
        let mut request = self.agent.get(&url);
        for condition in &query.conditions {
            request = request.query("where", &condition.to_param());
        }
        if let Some(field) = &query.order_by {
            request = request.query("orderBy", field);
        }
        if let Some(n) = query.page_size {
            request = request.query("pageSize", &n.to_string());
        }
        if let Some(cursor) = &query.cursor {
            request = request.query("cursor", cursor);
        }

        debug!(url = %request.url(), "store query");

        let response = request.call().map_err(|e| StoreError::Network(e.to_string()))?;
        response
            .into_json::<Page<Value>>()
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }

    fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let url = format!("{}/{}", self.collection_url(collection), encode_segment(id));
        match self.agent.get(&url).call() {
            Ok(response) => response
                .into_json::<Value>()
                .map(Some)
                .map_err(|e| StoreError::InvalidResponse(e.to_string())),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(StoreError::Network(e.to_string())),
        }
    }
}

/// Percent-encode a path segment.
fn encode_segment(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("fushimi-inari"), "fushimi-inari");
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_segment("明治"), "%E6%98%8E%E6%B2%BB");
        assert_eq!(encode_segment("a+b?c#d%"), "a%2Bb%3Fc%23d%25");
        assert_eq!(encode_segment("~._-"), "~._-");
    }

    #[test]
    fn test_collection_url_trims_slash() {
        let store = HttpStore::new("https://records.example.org/api/", Duration::from_secs(1));
        assert_eq!(store.collection_url("shrines"), "https://records.example.org/api/shrines");
    }

    #[test]
    fn test_unreachable_store_is_network_error() {
        let store = HttpStore::new("http://127.0.0.1:9", Duration::from_secs(2));
        let result = store.exec(&Query::new("shrines"));
        assert!(matches!(result, Err(StoreError::Network(_))));
    }
}
