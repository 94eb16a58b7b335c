use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::festival::{self, FestivalRule, RelativeRule};
use crate::geo::{BoundingBox, GeoPoint};
use crate::geohash::{self, Cell};
use crate::record::ShrineRecord;
use crate::search::{self, ShrineNameSearch, Suggestions};
use crate::session::{fetch_prefix, BrowsingSession, Facets, FetchPlan, ViewportUpdate};
use crate::store::StoreError;
use crate::viewport::CategoryFilter;

use super::state::{AppState, DEFAULT_SESSION};

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::Geohash(_) | EngineError::InvalidViewport(_) => StatusCode::BAD_REQUEST,
            EngineError::Store(StoreError::InvalidCursor(_)) => StatusCode::BAD_REQUEST,
            EngineError::FetchFailure { .. } | EngineError::Store(_) => StatusCode::BAD_GATEWAY,
        };
        ApiError(status, e.to_string())
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

/// Run store I/O off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

fn today(state: &AppState) -> Result<NaiveDate, ApiError> {
    state
        .config
        .today()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ─── GET /api/viewport ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct ViewportQuery {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub zoom: u8,
    pub session: Option<String>,
}

pub async fn viewport(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewportQuery>,
) -> Result<Json<ViewportUpdate>, ApiError> {
    let start = Instant::now();
    let key = params.session.unwrap_or_else(|| DEFAULT_SESSION.to_string());
    let bbox = BoundingBox::new(params.south, params.west, params.north, params.east);

    let plan = state.with_session(&key, |s| s.plan_fetch(bbox, params.zoom))?;

    // The session lock is released while the store is queried.
    let fetched = match &plan {
        FetchPlan::Fetch { prefix } => {
            let store = Arc::clone(&state.store);
            let options = state.config.session_options();
            let prefix = prefix.clone();
            let result = blocking(move || fetch_prefix(store.as_ref(), &options, &prefix)).await;
            if let Err(ApiError(status, msg)) = &result {
                warn!(session = %key, status = status.as_u16(), "{}", msg);
            }
            Some(result?)
        }
        FetchPlan::Skip(_) => None,
    };

    let update = state.with_session(&key, |s| {
        let (pages, added) = match fetched {
            Some(fetch) => (fetch.pages, s.apply_fetch(fetch)),
            None => (0, 0),
        };
        ViewportUpdate {
            plan,
            pages,
            added,
            total: s.records().len(),
            covered_prefixes: s.covered().len(),
        }
    });

    info!(
        session = %key,
        zoom = params.zoom,
        added = update.added,
        total = update.total,
        "GET /api/viewport ({:.1}ms)",
        elapsed_ms(start)
    );
    Ok(Json(update))
}

// ─── GET /api/visible ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VisibleQuery {
    pub session: Option<String>,
    pub month: Option<u32>,
    pub deity: Option<String>,
    pub week: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct VisibleResponse {
    pub filter: CategoryFilter,
    pub count: usize,
    pub records: Vec<ShrineRecord>,
    pub facets: Facets,
}

fn category_from(params: &VisibleQuery) -> Result<CategoryFilter, ApiError> {
    if let Some(month) = params.month {
        if !(1..=12).contains(&month) {
            return Err(api_error(StatusCode::BAD_REQUEST, "Month must be 1-12"));
        }
        return Ok(CategoryFilter::Month(month));
    }
    if let Some(deity) = params.deity.as_deref().filter(|d| !d.is_empty()) {
        return Ok(CategoryFilter::Deity(deity.to_string()));
    }
    if params.week == Some(true) {
        return Ok(CategoryFilter::ThisWeek);
    }
    Ok(CategoryFilter::None)
}

pub async fn visible(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VisibleQuery>,
) -> Result<Json<VisibleResponse>, ApiError> {
    let start = Instant::now();
    let filter = category_from(&params)?;
    let today = today(&state)?;
    let key = params.session.as_deref().unwrap_or(DEFAULT_SESSION);

    let view = |s: &BrowsingSession| {
        let records: Vec<ShrineRecord> = s.visible_records(&filter, today).into_iter().cloned().collect();
        (records, s.facets(today))
    };
    // An unknown session reads as empty and is not created.
    let (records, facets) = match state.read_session(key, view) {
        Some(found) => found,
        None => view(&BrowsingSession::new(state.config.session_options())),
    };

    info!(session = %key, count = records.len(), "GET /api/visible ({:.1}ms)", elapsed_ms(start));
    Ok(Json(VisibleResponse { filter, count: records.len(), records, facets }))
}

// ─── DELETE /api/session ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct SessionQuery {
    pub session: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub session: String,
    pub existed: bool,
}

pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SessionQuery>,
) -> Json<ResetResponse> {
    let session = params.session.unwrap_or_else(|| DEFAULT_SESSION.to_string());
    let existed = state.remove_session(&session);
    info!(session = %session, existed, remaining = state.session_count(), "DELETE /api/session");
    Json(ResetResponse { session, existed })
}

// ─── GET /api/search ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Suggestions>, ApiError> {
    let start = Instant::now();
    let text = params.q.unwrap_or_default();
    let store = Arc::clone(&state.store);
    let collection = state.config.city_collection.clone();
    let page_size = state.config.search_page_size;

    let text_for_log = text.clone();
    let result = blocking(move || search::suggest_cities(store.as_ref(), &collection, &text, page_size)).await?;

    info!(q = %text_for_log, found = result.suggestions.len(), "GET /api/search ({:.1}ms)", elapsed_ms(start));
    Ok(Json(result))
}

// ─── GET /api/shrines ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ShrinesQuery {
    pub name: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShrinePage {
    pub items: Vec<ShrineRecord>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

pub async fn shrines(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ShrinesQuery>,
) -> Result<Json<ShrinePage>, ApiError> {
    let start = Instant::now();
    let name = params.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing 'name' parameter"));
    }

    let store = Arc::clone(&state.store);
    let collection = state.config.shrine_collection.clone();
    let page_size = state.config.search_page_size;
    let cursor = params.cursor;

    let page = blocking(move || {
        let mut search = ShrineNameSearch::resume(&name, &collection, page_size, cursor);
        search.fetch_more(store.as_ref())?;
        Ok(ShrinePage {
            end_cursor: search.cursor().map(str::to_string),
            has_next_page: search.has_next_page(),
            items: search.into_items(),
        })
    })
    .await?;

    info!(found = page.items.len(), more = page.has_next_page, "GET /api/shrines ({:.1}ms)", elapsed_ms(start));
    Ok(Json(page))
}

// ─── GET /api/shrines/{slug} ─────────────────────────────────────

pub async fn shrine(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ShrineRecord>, ApiError> {
    let store = Arc::clone(&state.store);
    let collection = state.config.shrine_collection.clone();
    let lookup = slug.clone();

    let found = blocking(move || search::find_shrine(store.as_ref(), &collection, &lookup)).await?;
    info!(slug = %slug, found = found.is_some(), "GET /api/shrines/{{slug}}");
    found
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("No shrine '{}'", slug)))
}

// ─── GET /api/festival-dates ─────────────────────────────────────

#[derive(Deserialize)]
pub struct FestivalQuery {
    pub month_day: Option<String>,
    pub month: Option<u32>,
    pub week: Option<u32>,
    /// Kanji name (日..土) or Sunday-based index 0..=6.
    pub weekday: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FestivalDates {
    pub rule: FestivalRule,
    pub reference: NaiveDate,
    pub dates: Vec<NaiveDate>,
    pub this_week: bool,
}

fn rule_from(params: &FestivalQuery) -> Result<FestivalRule, ApiError> {
    if let Some(month_day) = &params.month_day {
        return Ok(FestivalRule::absolute(month_day.as_str()));
    }
    if params.month.is_none() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Provide 'month_day' or 'month'"));
    }
    let weekday = match params.weekday.as_deref() {
        Some(w) => match w.parse::<u32>() {
            Ok(index) => Some(festival::weekday_from_index(index).ok_or_else(|| {
                api_error(StatusCode::BAD_REQUEST, format!("Weekday index must be 0-6, got {}", index))
            })?),
            Err(_) => Some(festival::weekday_from_kanji(w)),
        },
        None => None,
    };
    let rule = RelativeRule::from_parts(params.month, params.week, weekday, params.start, params.end);
    rule.validate().map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(FestivalRule::Relative(rule))
}

pub async fn festival_dates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FestivalQuery>,
) -> Result<Json<FestivalDates>, ApiError> {
    let rule = rule_from(&params)?;
    let reference = match &params.date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid date '{}': {}", d, e)))?,
        None => today(&state)?,
    };
    let dates = rule.resolve(reference);
    let this_week = rule.occurs_in_week_of(reference);
    info!(reference = %reference, dates = dates.len(), "GET /api/festival-dates");
    Ok(Json(FestivalDates { rule, reference, dates, this_week }))
}

// ─── GET /api/decode ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DecodeQuery {
    pub g: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecodeResponse {
    pub geohash: String,
    pub center: GeoPoint,
    pub bounds: Cell,
}

pub async fn decode(Query(params): Query<DecodeQuery>) -> Result<Json<DecodeResponse>, ApiError> {
    let key = params.g.unwrap_or_default();
    if key.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Missing 'g' parameter"));
    }
    let bounds = geohash::decode_bounds(&key).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(DecodeResponse { center: bounds.center(), bounds, geohash: key }))
}

// ─── GET /api/encode ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EncodeQuery {
    pub lat: f64,
    pub lon: f64,
    pub precision: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EncodeResponse {
    pub geohash: String,
}

pub async fn encode(Query(params): Query<EncodeQuery>) -> Result<Json<EncodeResponse>, ApiError> {
    let precision = params.precision.unwrap_or(geohash::DEFAULT_PRECISION);
    let geohash = geohash::encode(params.lat, params.lon, precision)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(EncodeResponse { geohash }))
}
