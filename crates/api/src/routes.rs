use std::any::Any;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use finsecure_core::config::Settings;
use finsecure_core::decode::{decode_body, BodyFormat};
use finsecure_core::domain::recommendation::{
    Recommendation, RecommendationQuery, RecommendationResponse, DEFAULT_PAGE_LIMIT,
};
use finsecure_core::domain::test_result::{NewTestResult, TestType};
use finsecure_core::harness::TestRunner;
use finsecure_core::storage::metrics::Metrics;
use finsecure_core::storage::{Store, StoreError};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn Store>,
    pub runner: Arc<TestRunner>,
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);

    Router::new()
        .route("/recommend", post(recommend))
        .route("/run-tests", get(run_tests))
        .route("/recommendations", get(list_recommendations))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    if !settings.is_production() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!(%detail, "handler panicked");
    ApiError::Internal(detail).into_response()
}

/// Write-path failures never reach the caller; they are only logged and reported.
fn log_swallowed(what: &'static str, err: StoreError) {
    match err {
        StoreError::Unavailable(detail) => {
            tracing::error!(%detail, "{what}: database unavailable; result not persisted");
        }
        StoreError::Query(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "{what}: insert failed; result not persisted");
        }
    }
}

async fn recommend(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let format = BodyFormat::from_content_type(content_type);

    let request = match format {
        // Entity expansion is unbounded, so keep it off the async workers.
        BodyFormat::Xml => tokio::task::spawn_blocking(move || decode_body(format, &body))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??,
        BodyFormat::Json => decode_body(format, &body)?,
    };

    let rec = request.validate_and_into_recommendation()?;

    match state.store.insert_recommendation(&rec).await {
        Ok(id) => tracing::debug!(id, portfolio_type = %rec.portfolio_type, "recommendation stored"),
        Err(e) => log_swallowed("save recommendation", e),
    }

    Ok(Json(RecommendationResponse::new(rec, Utc::now())))
}

#[derive(Debug, Deserialize)]
struct RunTestsParams {
    #[serde(rename = "type")]
    test_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunTestsResponse {
    output: String,
    return_code: i32,
    test_type: TestType,
}

async fn run_tests(
    State(state): State<AppState>,
    Query(params): Query<RunTestsParams>,
) -> Result<Json<RunTestsResponse>, ApiError> {
    if state.settings.is_production() {
        return Err(ApiError::TestsDisabled);
    }

    let test_type: TestType = params
        .test_type
        .as_deref()
        .unwrap_or(TestType::Compliance.as_str())
        .parse()
        .map_err(|_| ApiError::InvalidTestType)?;

    let run = state.runner.run(test_type).await?;

    match run.status() {
        Some(status) => {
            let result = NewTestResult::new(test_type, status, &run.output);
            if let Err(e) = state.store.insert_test_result(&result).await {
                log_swallowed("save test result", e);
            }
        }
        None => tracing::warn!(%test_type, "test output carried no unambiguous verdict; not recorded"),
    }

    Ok(Json(RunTestsResponse {
        output: run.output,
        return_code: run.return_code,
        test_type,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    limit: Option<String>,
    offset: Option<String>,
    portfolio_type: Option<String>,
}

impl ListParams {
    /// Unparsable numbers fall back to the defaults instead of failing the request.
    fn into_query(self) -> RecommendationQuery {
        RecommendationQuery {
            limit: self
                .limit
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_PAGE_LIMIT),
            offset: self
                .offset
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
            portfolio_type: self.portfolio_type.filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ListResponse {
    recommendations: Vec<Recommendation>,
    total: i64,
    limit: i64,
    offset: i64,
}

async fn list_recommendations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let query = params.into_query();
    let page = state.store.list_recommendations(&query).await?;

    Ok(Json(ListResponse {
        recommendations: page.recommendations,
        total: page.total,
        limit: query.limit,
        offset: query.offset,
    }))
}

async fn metrics(State(state): State<AppState>) -> Result<Json<Metrics>, ApiError> {
    Ok(Json(state.store.metrics().await?))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.store.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the database");
            "disconnected"
        }
    };

    Json(HealthResponse {
        status: "healthy",
        database,
        timestamp: Utc::now(),
    })
}
