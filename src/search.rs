//! Text search over the record store's bigram indexes.
//!
//! Place-name suggestions query cities by address bigrams; shrine-name
//! search pages through shrines by name bigrams. Both are approximate:
//! every gram must match, but gram order is not checked.

use crate::error::EngineError;
use crate::ngram::{apply_keys, ngram, BIGRAM};
use crate::record::{CityRecord, ShrineRecord, FIELD_ADDRESS_BIGRAM, FIELD_NAME_BIGRAM};
use crate::store::{fetch_page, find_as, Query, RecordStore};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    pub keyword: String,
    pub suggestions: Vec<Suggestion>,
    pub has_more: bool,
}

/// Suggest cities whose address matches `text`, one page of them.
///
/// Blank input issues no query.
pub fn suggest_cities(
    store: &dyn RecordStore,
    collection: &str,
    text: &str,
    page_size: usize,
) -> Result<Suggestions, EngineError> {
    let keyword = text.trim();
    if keyword.is_empty() {
        return Ok(Suggestions::default());
    }

    let query = Query::new(collection)
        .order_by(FIELD_ADDRESS_BIGRAM)
        .page_size(page_size);
    let query = apply_keys(query, FIELD_ADDRESS_BIGRAM, &ngram(keyword, BIGRAM));
    let page = fetch_page::<CityRecord>(store, &query)?;
    debug!(keyword, found = page.data.len(), more = page.page_info.has_next_page, "city suggestions");

    Ok(Suggestions {
        keyword: keyword.to_string(),
        suggestions: page
            .data
            .iter()
            .map(|c| Suggestion { url: c.map_url(), name: c.display_name() })
            .collect(),
        has_more: page.page_info.has_next_page,
    })
}

/// A paged shrine-name search.
///
/// Each [`fetch_more`](Self::fetch_more) appends the next page. A failed
/// page leaves the items and cursor as they were, so the call can simply
/// be repeated.
#[derive(Debug, Clone)]
pub struct ShrineNameSearch {
    name: String,
    collection: String,
    page_size: usize,
    items: Vec<ShrineRecord>,
    cursor: Option<String>,
    has_next_page: bool,
}

impl ShrineNameSearch {
    pub fn new(name: &str, collection: &str, page_size: usize) -> Self {
        let name = name.trim().to_string();
        let has_next_page = !name.is_empty();
        Self {
            name,
            collection: collection.to_string(),
            page_size,
            items: Vec::new(),
            cursor: None,
            has_next_page,
        }
    }

    /// Continue a search from a cursor handed out earlier.
    pub fn resume(name: &str, collection: &str, page_size: usize, cursor: Option<String>) -> Self {
        let mut search = Self::new(name, collection, page_size);
        search.cursor = cursor;
        search
    }

    /// Fetch the next page. Returns the number of items appended.
    pub fn fetch_more(&mut self, store: &dyn RecordStore) -> Result<usize, EngineError> {
        if !self.has_next_page {
            return Ok(0);
        }
        let query = Query::new(self.collection.as_str())
            .page_size(self.page_size)
            .cursor(self.cursor.clone());
        let query = apply_keys(query, FIELD_NAME_BIGRAM, &ngram(&self.name, BIGRAM));
        let page = fetch_page::<ShrineRecord>(store, &query)?;

        let added = page.data.len();
        self.items.extend(page.data);
        self.has_next_page = page.page_info.has_next_page && page.page_info.end_cursor.is_some();
        if page.page_info.end_cursor.is_some() {
            self.cursor = page.page_info.end_cursor;
        }
        debug!(name = %self.name, added, total = self.items.len(), "shrine name page");
        Ok(added)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[ShrineRecord] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ShrineRecord> {
        self.items
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }
}

/// A shrine by slug.
pub fn find_shrine(store: &dyn RecordStore, collection: &str, slug: &str) -> Result<Option<ShrineRecord>, EngineError> {
    Ok(find_as(store, collection, slug)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn city(geohash: &str, prefecture: &str, county: Option<&str>, city: &str) -> CityRecord {
        CityRecord {
            geohash: geohash.into(),
            prefecture: prefecture.into(),
            county: county.map(str::to_string),
            city: city.into(),
        }
    }

    fn shrine(slug: &str, name: &str) -> ShrineRecord {
        ShrineRecord {
            slug: slug.into(),
            name: name.into(),
            address: None,
            prefecture: None,
            area: None,
            lat: None,
            lon: None,
            geohash: None,
            deities: Vec::new(),
            festivals: Vec::new(),
        }
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .insert(
                "cities",
                vec![
                    city("xn0x1m", "京都府", None, "京都市"),
                    city("xn0m7q", "京都府", None, "宇治市"),
                    city("xn0qz1", "京都府", Some("乙訓郡"), "大山崎町"),
                ],
            )
            .unwrap();
        store
            .insert(
                "shrines",
                vec![
                    shrine("fushimi-inari", "伏見稲荷大社"),
                    shrine("takekoma-inari", "竹駒稲荷神社"),
                    shrine("kasama-inari", "笠間稲荷神社"),
                    shrine("meiji", "明治神宮"),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_blank_text_issues_no_query() {
        let store = store();
        let result = suggest_cities(&store, "cities", "   ", 20).unwrap();
        assert!(result.suggestions.is_empty());
        assert!(!result.has_more);
        assert_eq!(store.exec_calls(), 0);
    }

    #[test]
    fn test_city_suggestions() {
        let store = store();
        let result = suggest_cities(&store, "cities", "宇治", 20).unwrap();
        assert_eq!(
            result.suggestions,
            vec![Suggestion { url: "/s?g=xn0m7q".into(), name: "京都府宇治市".into() }]
        );
        assert!(!result.has_more);
    }

    #[test]
    fn test_county_is_part_of_address() {
        let result = suggest_cities(&store(), "cities", "乙訓", 20).unwrap();
        assert_eq!(result.suggestions[0].name, "京都府乙訓郡大山崎町");
    }

    #[test]
    fn test_suggestions_report_more_pages() {
        let result = suggest_cities(&store(), "cities", "京都府", 2).unwrap();
        assert_eq!(result.suggestions.len(), 2);
        assert!(result.has_more);
    }

    #[test]
    fn test_single_character_uses_prefix_match() {
        let result = suggest_cities(&store(), "cities", "宇", 20).unwrap();
        assert_eq!(result.suggestions.len(), 1);
    }

    #[test]
    fn test_shrine_name_paging() {
        let store = store();
        let mut search = ShrineNameSearch::new("稲荷", "shrines", 2);
        assert_eq!(search.fetch_more(&store).unwrap(), 2);
        assert!(search.has_next_page());
        assert_eq!(search.fetch_more(&store).unwrap(), 1);
        assert!(!search.has_next_page());
        assert_eq!(search.fetch_more(&store).unwrap(), 0);

        let mut slugs: Vec<&str> = search.items().iter().map(|s| s.slug.as_str()).collect();
        slugs.sort();
        assert_eq!(slugs, vec!["fushimi-inari", "kasama-inari", "takekoma-inari"]);
    }

    #[test]
    fn test_failed_page_keeps_cursor() {
        let store = store();
        let mut search = ShrineNameSearch::new("稲荷", "shrines", 2);
        search.fetch_more(&store).unwrap();
        let cursor = search.cursor().map(str::to_string);

        store.fail_next(1);
        assert!(search.fetch_more(&store).is_err());
        assert_eq!(search.cursor().map(str::to_string), cursor);
        assert_eq!(search.items().len(), 2);

        assert_eq!(search.fetch_more(&store).unwrap(), 1);
    }

    #[test]
    fn test_resume_from_cursor() {
        let store = store();
        let mut first = ShrineNameSearch::new("稲荷", "shrines", 2);
        first.fetch_more(&store).unwrap();

        let mut resumed = ShrineNameSearch::resume("稲荷", "shrines", 2, first.cursor().map(str::to_string));
        assert_eq!(resumed.fetch_more(&store).unwrap(), 1);
        assert!(!resumed.has_next_page());
    }

    #[test]
    fn test_empty_name_fetches_nothing() {
        let store = store();
        let mut search = ShrineNameSearch::new("", "shrines", 20);
        assert_eq!(search.fetch_more(&store).unwrap(), 0);
        assert_eq!(store.exec_calls(), 0);
    }

    #[test]
    fn test_find_shrine() {
        let store = store();
        let hit = find_shrine(&store, "shrines", "meiji").unwrap().unwrap();
        assert_eq!(hit.name, "明治神宮");
        assert!(find_shrine(&store, "shrines", "nowhere").unwrap().is_none());
    }
}
