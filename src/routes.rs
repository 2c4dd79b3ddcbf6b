// REST API for revenue records (axum)

use anyhow::Result as AnyResult;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::aggregator::{analytics_for_year, chart_for_year, resolve_year, Analytics, ChartReport};
use crate::auth::{require_auth, Caller};
use crate::config::AppConfig;
use crate::db::{self, ListQuery, RevenueRecord, SortSpec, Store};
use crate::error::AppError;
use crate::schema::{validate_new, validate_patch, Month, RecordInput};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Store, config: AppConfig) -> Self {
        AppState {
            store,
            config: Arc::new(config),
        }
    }

    /// Run `f` with the connection locked. The guard never crosses an await.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> AnyResult<T>) -> Result<T, AppError> {
        let conn = self.store.lock()?;
        Ok(f(&*conn)?)
    }
}

// ============================================================================
// Response shapes
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct ChartResponse {
    success: bool,
    #[serde(flatten)]
    report: ChartReport,
}

#[derive(Serialize)]
struct Pagination {
    total: i64,
    page: u32,
    limit: u32,
    pages: i64,
}

#[derive(Serialize)]
struct ListResponse {
    success: bool,
    data: Vec<RevenueRecord>,
    pagination: Pagination,
}

// ============================================================================
// Query parameters
// ============================================================================

// Kept as strings so that junk values fall back to defaults instead of
// failing extraction
#[derive(Debug, Default, Deserialize)]
struct YearParams {
    year: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    year: Option<String>,
    month: Option<String>,
    page: Option<String>,
    limit: Option<String>,
    sort: Option<String>,
}

impl ListParams {
    fn into_query(self, config: &AppConfig) -> Result<ListQuery, AppError> {
        let month = match self.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(name) => Some(Month::from_name(name).ok_or_else(|| {
                AppError::BadRequest(format!("Unknown month: {}", name))
            })?),
            None => None,
        };

        let query = ListQuery {
            year: self.year.and_then(|y| y.trim().parse().ok()),
            month,
            sort: self.sort.as_deref().map(SortSpec::parse).unwrap_or_default(),
            page: self.page.and_then(|p| p.trim().parse().ok()).unwrap_or(1),
            limit: self
                .limit
                .and_then(|l| l.trim().parse().ok())
                .unwrap_or(config.pagination.default_limit),
        };

        Ok(query.normalized(config.pagination.max_limit))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/revenue/chart-data?year=YYYY
async fn get_chart_data(
    State(state): State<AppState>,
    Query(params): Query<YearParams>,
) -> Result<impl IntoResponse, AppError> {
    let year = resolve_year(params.year.as_deref());
    let report = state.with_conn(|conn| chart_for_year(conn, year))?;

    Ok(Json(ChartResponse {
        success: true,
        report,
    }))
}

/// GET /api/revenue/analytics?year=YYYY
async fn get_analytics(
    State(state): State<AppState>,
    Query(params): Query<YearParams>,
) -> Result<Json<ApiResponse<Analytics>>, AppError> {
    let year = resolve_year(params.year.as_deref());
    let analytics = state.with_conn(|conn| analytics_for_year(conn, year))?;

    Ok(Json(ApiResponse::ok(analytics)))
}

/// GET /api/revenue?year=&month=&page=&limit=&sort=
async fn list_records(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params.into_query(&state.config)?;
    let page = state.with_conn(|conn| db::list_records(conn, &query))?;

    let pagination = Pagination {
        total: page.total,
        page: page.page,
        limit: page.limit,
        pages: page.pages(),
    };

    Ok(Json(ListResponse {
        success: true,
        data: page.records,
        pagination,
    }))
}

/// GET /api/revenue/:id
async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .with_conn(|conn| db::get_record(conn, &id))?
        .ok_or_else(not_found)?;

    Ok(Json(ApiResponse::ok(record)))
}

/// POST /api/revenue
async fn create_record(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<RecordInput>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    caller.ensure_can_write()?;
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let new_record = validate_new(&input)?;

    let record = state.with_conn(|conn| db::insert_record(conn, &new_record))?;
    info!(
        caller = %caller.name,
        id = %record.id,
        month = %record.month,
        year = record.year,
        revenue = record.revenue,
        "Revenue record created"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}

/// PUT /api/revenue/:id
async fn update_record(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    payload: Result<Json<RecordInput>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    caller.ensure_can_write()?;
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let patch = validate_patch(&input)?;

    let record = state
        .with_conn(|conn| db::update_record(conn, &id, &patch))?
        .ok_or_else(not_found)?;
    info!(caller = %caller.name, id = %record.id, "Revenue record updated");

    Ok(Json(ApiResponse::ok(record)))
}

/// DELETE /api/revenue/:id
async fn delete_record(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    caller.ensure_can_write()?;

    if !state.with_conn(|conn| db::delete_record(conn, &id))? {
        return Err(not_found());
    }
    info!(caller = %caller.name, id = %id, "Revenue record deleted");

    Ok(Json(MessageResponse {
        success: true,
        message: "Revenue record deleted successfully".to_string(),
    }))
}

fn not_found() -> AppError {
    AppError::NotFound("Revenue record not found".to_string())
}

// ============================================================================
// Router
// ============================================================================

/// Revenue endpoints, every one behind `require_auth`
pub fn revenue_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/chart-data", get(get_chart_data))
        .route("/analytics", get(get_analytics))
        .route(
            "/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

/// Full application: `/api/health` plus `/api/revenue/*`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/revenue", revenue_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
