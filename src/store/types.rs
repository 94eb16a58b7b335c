//! Query, page and error types for the record store boundary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Comparison applied to an index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Op {
    Eq,
    StartsWith,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::StartsWith => "startsWith",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "startsWith" => Some(Self::StartsWith),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: String,
}

impl Condition {
    /// Wire form `field:op:value`. The value may itself contain colons.
    pub fn to_param(&self) -> String {
        format!("{}:{}:{}", self.field, self.op, self.value)
    }

    pub fn from_param(param: &str) -> Option<Self> {
        let mut parts = param.splitn(3, ':');
        let field = parts.next()?.to_string();
        let op = Op::parse(parts.next()?)?;
        let value = parts.next()?.to_string();
        Some(Self { field, op, value })
    }
}

/// A query against one collection. Conditions are conjunctive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Query {
    pub collection: String,
    pub conditions: Vec<Condition>,
    pub order_by: Option<String>,
    pub page_size: Option<usize>,
    pub cursor: Option<String>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into(), ..Self::default() }
    }

    pub fn where_(mut self, field: &str, op: Op, value: &str) -> Self {
        self.conditions.push(Condition { field: field.to_string(), op, value: value.to_string() });
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    pub fn page_size(mut self, n: usize) -> Self {
        self.page_size = Some(n);
        self
    }

    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub end_cursor: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub page_info: PageInfo,
}

impl Page<Value> {
    /// Deserialize raw records into `T`. One bad record fails the page.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Page<T>, StoreError> {
        let data = self
            .data
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| StoreError::InvalidResponse(e.to_string())))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Page { data, page_info: self.page_info })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),
    #[error("invalid cursor '{0}'")]
    InvalidCursor(String),
    #[error("dataset error: {0}")]
    Dataset(String),
}

/// The paginated, read-only record store the engine queries.
pub trait RecordStore: Send + Sync {
    /// Run `query` and return one page.
    fn exec(&self, query: &Query) -> Result<Page<Value>, StoreError>;

    /// Point lookup by identifier.
    fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let q = Query::new("cities")
            .where_("addressBigram", Op::Eq, "京都")
            .where_("addressBigram", Op::Eq, "都市")
            .order_by("addressBigram")
            .page_size(20)
            .cursor(Some("40".into()));
        assert_eq!(q.collection, "cities");
        assert_eq!(q.conditions.len(), 2);
        assert_eq!(q.order_by.as_deref(), Some("addressBigram"));
        assert_eq!(q.page_size, Some(20));
        assert_eq!(q.cursor.as_deref(), Some("40"));
    }

    #[test]
    fn test_condition_param_round_trip() {
        let c = Condition { field: "geohash".into(), op: Op::StartsWith, value: "a:b".into() };
        assert_eq!(c.to_param(), "geohash:startsWith:a:b");
        assert_eq!(Condition::from_param(&c.to_param()), Some(c));
        assert_eq!(Condition::from_param("geohash:like:x"), None);
        assert_eq!(Condition::from_param("geohash"), None);
    }

    #[test]
    fn test_page_wire_format() {
        let raw = json!({
            "data": [{"slug": "a"}],
            "pageInfo": {"endCursor": "1", "hasNextPage": true}
        });
        let page: Page<Value> = serde_json::from_value(raw).unwrap();
        assert_eq!(page.page_info.end_cursor.as_deref(), Some("1"));
        assert!(page.page_info.has_next_page);

        let bare: Page<Value> = serde_json::from_value(json!({"data": []})).unwrap();
        assert_eq!(bare.page_info, PageInfo::default());
    }

    #[test]
    fn test_decode_rejects_bad_record() {
        #[derive(Deserialize)]
        struct Named {
            #[allow(dead_code)]
            name: String,
        }
        let page = Page { data: vec![json!({"name": "ok"}), json!({"nope": 1})], page_info: PageInfo::default() };
        assert!(matches!(page.decode::<Named>(), Err(StoreError::InvalidResponse(_))));
    }
}
