use std::{sync::Arc, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use futures::{stream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::Date;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::{CategoryMatch, Config},
    datalog::{self, DatalogQuery},
    dates,
    error::ApiError,
    model::{CategoryNode, PageRef, StatsNode, TimelineEntry},
    parse, stats,
    upstream::RoamClient,
};

const QUERY_ACTION: &str = "q";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub roam: RoamClient,
}

impl AppState {
    pub fn new(config: Config) -> reqwest::Result<Self> {
        let config = Arc::new(config);
        let roam = RoamClient::new(config.clone())?;
        Ok(Self { config, roam })
    }

    fn token(&self) -> Result<&str, ApiError> {
        self.config.api_token.as_deref().ok_or(ApiError::MissingToken)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/health", get(health))
        .route("/api/roam/categories", post_only(post(post_categories)))
        .route("/api/roam/pages", post_only(post(post_pages)))
        .route("/api/roam/timeline", post_only(post(post_timeline)))
        .route("/api/roam/timeline-stats", post_only(post(post_timeline_stats)))
        .route("/api/roam/:graph_name", post_only(post(post_action)))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
}

/// CORS preflights are answered by `CorsLayer` with an empty 200; report them as 204.
async fn preflight_no_content(req: Request, next: Next) -> Response {
    let is_options = req.method() == Method::OPTIONS;
    let mut res = next.run(req).await;
    if is_options && res.status() == StatusCode::OK {
        *res.status_mut() = StatusCode::NO_CONTENT;
    }
    res
}

fn post_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.options(options_ok).fallback(method_not_allowed)
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "data": HealthInfo {
            service: "roam_bff",
            version: env!("CARGO_PKG_VERSION"),
        },
    }))
}

fn parse_body<T: DeserializeOwned>(body: Result<Json<Value>, JsonRejection>) -> Result<T, ApiError> {
    let Json(value) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    serde_json::from_value(value).map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))
}

/// Graph names end up in upstream URL paths.
fn require_graph(name: Option<&str>) -> Result<&str, ApiError> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ApiError::bad_request("Graph name is required"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::bad_request("Invalid graph name"));
    }
    Ok(name)
}

async fn post_action(
    State(state): State<AppState>,
    Path(graph_name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let graph = require_graph(Some(graph_name.as_str()))?;
    let token = state.token()?;
    let payload: Map<String, Value> = parse_body(body)?;

    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request("Action is required"))?;

    if action != QUERY_ACTION {
        info!("graph {graph}: write action {action}");
        state.roam.write(graph, token, &Value::Object(payload.clone())).await?;
        return Ok(Json(json!({ "success": true })).into_response());
    }

    let query = payload
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query is required"))?;
    let args = match payload.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(args)) => args.clone(),
        Some(_) => return Err(ApiError::bad_request("args must be an array")),
    };
    let query = DatalogQuery {
        query: query.to_string(),
        args,
    };

    let text = state.roam.query_raw(graph, token, &query).await?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "data": text }));
    Ok(Json(body).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRequest {
    #[serde(default)]
    graph_name: Option<String>,
}

#[derive(Serialize)]
struct CategoriesResponse {
    categories: Vec<CategoryNode>,
}

async fn fetch_categories(state: &AppState, graph: &str, token: &str) -> Result<Vec<CategoryNode>, ApiError> {
    let query = datalog::categories_query(&state.config.categories_page, state.config.category_depth);
    let response = state.roam.query(graph, token, &query).await?;
    Ok(parse::build_category_tree(&response, &state.config.categories_page))
}

async fn post_categories(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let req: GraphRequest = parse_body(body)?;
    let token = state.token()?;
    let graph = require_graph(req.graph_name.as_deref())?;

    let categories = fetch_categories(&state, graph, token).await?;
    info!("graph {graph}: {} root categories", categories.len());
    Ok(Json(CategoriesResponse { categories }))
}

#[derive(Serialize)]
struct PagesResponse {
    pages: Vec<PageRef>,
}

async fn post_pages(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PagesResponse>, ApiError> {
    let req: GraphRequest = parse_body(body)?;
    let token = state.token()?;
    let graph = require_graph(req.graph_name.as_deref())?;

    let response = state.roam.query(graph, token, &datalog::pages_query()).await?;
    let pages = parse::parse_pages(&response);
    info!("graph {graph}: {} pages", pages.len());
    Ok(Json(PagesResponse { pages }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineRequest {
    #[serde(default)]
    graph_name: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    tz_offset_minutes: Option<i32>,
}

#[derive(Serialize)]
struct TimelineResponse {
    page: String,
    entries: Vec<TimelineEntry>,
}

async fn post_timeline(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<TimelineResponse>, ApiError> {
    let req: TimelineRequest = parse_body(body)?;
    let token = state.token()?;
    let graph = require_graph(req.graph_name.as_deref())?;
    let date = optional_date(req.date.as_deref(), "date")?
        .unwrap_or_else(|| dates::today(req.tz_offset_minutes));

    let page = dates::roam_page_title(date);
    let query = datalog::timeline_query(&page, &state.config.timeline_block);
    let response = state.roam.query(graph, token, &query).await?;
    let entries = parse::parse_timeline_blocks(&response);
    Ok(Json(TimelineResponse { page, entries }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsRequest {
    #[serde(default)]
    graph_name: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    tz_offset_minutes: Option<i32>,
    #[serde(default)]
    category_match: Option<CategoryMatch>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    stats: Vec<StatsNode>,
    total_duration_minutes: u64,
    start_date: String,
    end_date: String,
}

fn optional_date(input: Option<&str>, field: &str) -> Result<Option<Date>, ApiError> {
    match input.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => dates::parse_date(s)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("invalid {field}: {s}"))),
    }
}

async fn post_timeline_stats(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<StatsResponse>, ApiError> {
    let req: StatsRequest = parse_body(body)?;
    let token = state.token()?;
    let graph = require_graph(req.graph_name.as_deref())?;

    let end = optional_date(req.end_date.as_deref(), "endDate")?
        .unwrap_or_else(|| dates::today(req.tz_offset_minutes));
    let start = optional_date(req.start_date.as_deref(), "startDate")?.unwrap_or(end);
    if start > end {
        return Err(ApiError::bad_request("startDate is after endDate"));
    }
    if (end - start).whole_days() >= dates::MAX_RANGE_DAYS {
        return Err(ApiError::bad_request(format!(
            "date range exceeds {} days",
            dates::MAX_RANGE_DAYS
        )));
    }
    let policy = req.category_match.unwrap_or(state.config.category_match);

    let forest = fetch_categories(&state, graph, token).await?;
    let days = dates::days_inclusive(start, end);
    let entries = fetch_entries_for_days(&state, graph, token, &days).await;
    let stats = stats::aggregate(&forest, &entries, policy);
    let total_duration_minutes = stats.iter().map(|n| n.total_duration_minutes).sum();
    info!(
        "graph {graph}: {} entries over {} days, {}",
        entries.len(),
        days.len(),
        parse::format_duration(total_duration_minutes)
    );

    Ok(Json(StatsResponse {
        stats,
        total_duration_minutes,
        start_date: dates::roam_page_title(start),
        end_date: dates::roam_page_title(end),
    }))
}

/// One `/q` call per day page, a few in flight at once. A failed day counts as empty.
async fn fetch_entries_for_days(
    state: &AppState,
    graph: &str,
    token: &str,
    days: &[Date],
) -> Vec<TimelineEntry> {
    let container = state.config.timeline_block.as_str();
    let per_day = days.iter().copied().map(|day| {
        let page = dates::roam_page_title(day);
        async move {
            let query = datalog::timeline_query(&page, container);
            match state.roam.query(graph, token, &query).await {
                Ok(response) => parse::parse_timeline_blocks(&response),
                Err(err) => {
                    warn!("timeline for {page} skipped: {err}");
                    Vec::new()
                }
            }
        }
    });

    stream::iter(per_day)
        .buffered(state.config.stats_concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flatten()
        .collect()
}
