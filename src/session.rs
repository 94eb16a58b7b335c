//! Per-map browsing session: viewport-driven incremental loading.
//!
//! Viewport change → prefix at zoom precision → coverage check → fetch
//! every page under the prefix → merge → mark covered.
//!
//! The fetch is split into [`BrowsingSession::plan_fetch`], the store I/O
//! ([`fetch_prefix`]) and [`BrowsingSession::apply_fetch`] so a caller can
//! release its lock on the session while the request is in flight.
//! Overlapping or late responses are harmless: merging is idempotent and
//! off-screen records are filtered out at display time.

use crate::coverage::FetchedPrefixSet;
use crate::error::EngineError;
use crate::geo::{self, BoundingBox};
use crate::geohash::{self, GeohashError};
use crate::merge::Accumulator;
use crate::record::{ShrineRecord, FIELD_GEOHASH};
use crate::store::{fetch_page, Op, Query, RecordStore, StoreError};
use crate::viewport::{self, CategoryFilter};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// At or below this zoom nothing is fetched or shown.
    pub hidden_zoom: u8,
    pub shrine_collection: String,
    pub page_size: usize,
    /// Upper bound on pages followed for one prefix.
    pub max_pages: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            hidden_zoom: 10,
            shrine_collection: "shrines".into(),
            page_size: 100,
            max_pages: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub bbox: BoundingBox,
    pub zoom: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    ZoomedOut,
    Covered { by: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FetchPlan {
    Skip(SkipReason),
    Fetch { prefix: String },
}

/// Everything retrieved for one prefix.
#[derive(Debug, Clone)]
pub struct PrefixFetch {
    pub prefix: String,
    pub records: Vec<ShrineRecord>,
    pub pages: usize,
    /// False when the page limit cut the listing short.
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewportUpdate {
    pub plan: FetchPlan,
    pub pages: usize,
    pub added: usize,
    pub total: usize,
    pub covered_prefixes: usize,
}

/// Filter choices available for the current view.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Facets {
    pub festival_months: Vec<u32>,
    pub deity_names: Vec<String>,
}

pub struct BrowsingSession {
    options: SessionOptions,
    covered: FetchedPrefixSet,
    records: Accumulator<ShrineRecord>,
    viewport: Option<Viewport>,
}

impl BrowsingSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            covered: FetchedPrefixSet::new(),
            records: Accumulator::new(),
            viewport: None,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Record the new viewport and decide whether it needs a fetch.
    ///
    /// Invalid viewports are rejected before any state changes.
    pub fn plan_fetch(&mut self, bbox: BoundingBox, zoom: u8) -> Result<FetchPlan, EngineError> {
        for (lat, lon) in [(bbox.south, bbox.west), (bbox.north, bbox.east)] {
            if !geo::is_valid(lat, lon) {
                return Err(GeohashError::InvalidCoordinate { lat, lon }.into());
            }
        }
        if !bbox.is_well_formed() {
            return Err(EngineError::InvalidViewport(format!(
                "south {} / north {}, west {} / east {}",
                bbox.south, bbox.north, bbox.west, bbox.east
            )));
        }

        if zoom <= self.options.hidden_zoom {
            self.viewport = Some(Viewport { bbox, zoom });
            return Ok(FetchPlan::Skip(SkipReason::ZoomedOut));
        }

        let center = bbox.center();
        let prefix = geohash::encode_point(center, geohash::precision_for_zoom(zoom))?;
        self.viewport = Some(Viewport { bbox, zoom });

        if let Some(by) = self.covered.covering(&prefix) {
            debug!(prefix = %prefix, by = %by, "prefix already covered");
            return Ok(FetchPlan::Skip(SkipReason::Covered { by: by.to_string() }));
        }
        Ok(FetchPlan::Fetch { prefix })
    }

    /// Merge a finished fetch; mark its prefix covered if it was complete.
    /// Returns the number of new records.
    pub fn apply_fetch(&mut self, fetch: PrefixFetch) -> usize {
        let added = self.records.merge(fetch.records);
        if fetch.complete {
            self.covered.mark_covered(&fetch.prefix);
        } else {
            warn!(prefix = %fetch.prefix, pages = fetch.pages, "page limit reached; prefix left uncovered");
        }
        info!(prefix = %fetch.prefix, added, total = self.records.len(), "merged viewport fetch");
        added
    }

    /// Plan, fetch and apply in one call.
    pub fn update_viewport(
        &mut self,
        store: &dyn RecordStore,
        bbox: BoundingBox,
        zoom: u8,
    ) -> Result<ViewportUpdate, EngineError> {
        let plan = self.plan_fetch(bbox, zoom)?;
        let (pages, added) = match &plan {
            FetchPlan::Skip(_) => (0, 0),
            FetchPlan::Fetch { prefix } => {
                let fetch = fetch_prefix(store, &self.options, prefix)?;
                let pages = fetch.pages;
                (pages, self.apply_fetch(fetch))
            }
        };
        Ok(ViewportUpdate {
            plan,
            pages,
            added,
            total: self.records.len(),
            covered_prefixes: self.covered.len(),
        })
    }

    /// Records in the last viewport passing `filter`, sorted by name.
    /// Empty before the first viewport and while zoomed out.
    pub fn visible_records(&self, filter: &CategoryFilter, today: NaiveDate) -> Vec<&ShrineRecord> {
        match self.viewport {
            Some(v) if v.zoom > self.options.hidden_zoom => {
                viewport::filter(self.records.records(), &v.bbox, filter, today)
            }
            _ => Vec::new(),
        }
    }

    /// Months and deities offered as filters for the visible records.
    pub fn facets(&self, today: NaiveDate) -> Facets {
        let visible = self.visible_records(&CategoryFilter::None, today);
        Facets {
            festival_months: viewport::festival_months(visible.iter().copied()),
            deity_names: viewport::deity_names(visible.iter().copied()),
        }
    }

    pub fn records(&self) -> &[ShrineRecord] {
        self.records.records()
    }

    pub fn covered(&self) -> &FetchedPrefixSet {
        &self.covered
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Forget everything fetched; used when the map view is discarded.
    pub fn reset(&mut self) {
        self.covered.reset();
        self.records.clear();
        self.viewport = None;
    }
}

/// Fetch every page of records under `prefix`.
///
/// Nothing is returned unless every page succeeds.
pub fn fetch_prefix(
    store: &dyn RecordStore,
    options: &SessionOptions,
    prefix: &str,
) -> Result<PrefixFetch, EngineError> {
    let failure = |source: StoreError| EngineError::FetchFailure { prefix: prefix.to_string(), source };
    let base = Query::new(options.shrine_collection.as_str())
        .where_(FIELD_GEOHASH, Op::StartsWith, prefix)
        .page_size(options.page_size);

    let mut records = Vec::new();
    let mut cursor = None;
    let mut pages = 0;
    loop {
        let page = fetch_page::<ShrineRecord>(store, &base.clone().cursor(cursor.take())).map_err(failure)?;
        pages += 1;
        records.extend(page.data);

        if !page.page_info.has_next_page {
            return Ok(PrefixFetch { prefix: prefix.to_string(), records, pages, complete: true });
        }
        match page.page_info.end_cursor {
            Some(next) if pages < options.max_pages => cursor = Some(next),
            _ => {
                return Ok(PrefixFetch { prefix: prefix.to_string(), records, pages, complete: false });
            }
        }
    }
}
