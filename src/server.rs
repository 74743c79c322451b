use crate::constants::ANONYMOUS_ACTOR;
use crate::error::DashboardError;
use crate::metrics;
use crate::pipeline::aggregation::{
    local_today, Dashboard, Dimension, KpiFilter, KpiSummary, ReportingPeriod,
};
use crate::pipeline::ingestion::{IngestionPipeline, IngestionReport};
use crate::types::{SyncLogEntry, SyncSource};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hyper::Server;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const DEFAULT_SYNC_LOG_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub pipeline: Arc<IngestionPipeline>,
}

/// `DashboardError` mapped onto HTTP status codes.
pub struct ApiError(DashboardError);

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DashboardError::EmptyIngestion { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DashboardError::InvalidDate(_)
            | DashboardError::Csv(_)
            | DashboardError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Filter query string. Blank values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub store_location: Option<String>,
    pub sales_channel: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<FilterParams> for KpiFilter {
    fn from(params: FilterParams) -> Self {
        KpiFilter {
            start_date: non_blank(params.start_date),
            end_date: non_blank(params.end_date),
            store_location: non_blank(params.store_location),
            sales_channel: non_blank(params.sales_channel),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BreakdownParams {
    pub by: Dimension,
    #[serde(flatten)]
    pub filter: FilterParams,
}

#[derive(Debug, Deserialize)]
pub struct SyncLogParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LatestDate {
    pub latest_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Window {
    pub start_date: String,
    pub end_date: String,
    pub kpis: KpiSummary,
}

impl Window {
    fn new(period: &ReportingPeriod, kpis: &KpiSummary) -> Self {
        Self {
            start_date: period.start.to_string(),
            end_date: period.end.to_string(),
            kpis: kpis.rounded(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Comparison {
    pub current: Window,
    pub previous_month: Window,
    pub previous_year: Window,
    pub year_to_date: Window,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "retail_pulse",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn kpis(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<KpiSummary> {
    let summary = state.dashboard.kpis(&params.into()).await?;
    Ok(Json(summary.rounded()))
}

async fn breakdown(
    State(state): State<AppState>,
    Query(params): Query<BreakdownParams>,
) -> ApiResult<BTreeMap<String, KpiSummary>> {
    let groups = state
        .dashboard
        .breakdown(&params.filter.into(), params.by)
        .await?;
    Ok(Json(
        groups
            .into_iter()
            .map(|(key, summary)| (key, summary.rounded()))
            .collect(),
    ))
}

async fn comparison(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<Comparison> {
    let filter: KpiFilter = params.into();
    let result = state
        .dashboard
        .compare_periods(
            filter.start_date.as_deref(),
            filter.end_date.as_deref(),
            filter.store_location.clone(),
            filter.sales_channel.clone(),
            local_today(),
        )
        .await?;
    Ok(Json(Comparison {
        current: Window::new(&result.period, &result.current),
        previous_month: Window::new(&result.previous_period, &result.previous),
        previous_year: Window::new(&result.previous_year_period, &result.previous_year),
        year_to_date: Window::new(&result.year_to_date_period, &result.year_to_date),
    }))
}

async fn latest_date(State(state): State<AppState>) -> ApiResult<LatestDate> {
    let latest_date = state.dashboard.latest_date().await?;
    Ok(Json(LatestDate { latest_date }))
}

async fn sync_logs(
    State(state): State<AppState>,
    Query(params): Query<SyncLogParams>,
) -> ApiResult<Vec<SyncLogEntry>> {
    let limit = params.limit.unwrap_or(DEFAULT_SYNC_LOG_LIMIT);
    let logs = state.pipeline.storage().list_sync_logs(limit).await?;
    Ok(Json(logs))
}

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<IngestionReport> {
    let actor = headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_ACTOR)
        .to_string();
    let name = headers
        .get("x-file-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("upload.csv")
        .to_string();

    let report = state
        .pipeline
        .ingest_reader_detailed(&body[..], &name, &actor, SyncSource::ManualUpload)
        .await?;
    Ok(Json(report))
}

async fn prometheus() -> Response {
    match metrics::render() {
        Some(text) => text.into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Create the HTTP router with all dashboard and ingestion routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus))
        .route("/api/dashboard/kpis", get(kpis))
        .route("/api/dashboard/breakdown", get(breakdown))
        .route("/api/dashboard/comparison", get(comparison))
        .route("/api/dashboard/latest-date", get(latest_date))
        .route("/api/sync-logs", get(sync_logs))
        .route("/api/ingest/upload", post(upload))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    info!("Health check: http://localhost:{port}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
