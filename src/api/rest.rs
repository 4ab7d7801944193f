//! Axum REST API handlers

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;

use crate::error::SwapError;
use crate::service::{FaceSwapRequest, SwapService};
use crate::storage::ObjectStore;

use super::dto::*;
use super::job::JobHandler;

/// Application state shared across handlers
pub struct AppState<S: ObjectStore> {
    pub service: Arc<SwapService<S>>,
    pub jobs: JobHandler<S>,
    pub body_limit: usize,
}

impl<S: ObjectStore> AppState<S> {
    pub fn new(service: Arc<SwapService<S>>, body_limit: usize) -> Self {
        Self {
            jobs: JobHandler::new(service.clone()),
            service,
            body_limit,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for a pipeline error
pub fn status_for(e: &SwapError) -> StatusCode {
    match e {
        SwapError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SwapError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: &SwapError) -> ApiError {
    (status_for(e), Json(ErrorResponse::from(e)))
}

/// Create the REST API router
pub fn create_rest_router<S: ObjectStore>(state: Arc<AppState<S>>) -> Router {
    let body_limit = state.body_limit;

    Router::new()
        .route("/ping", get(ping_handler::<S>))
        .route("/health", get(health_handler::<S>))
        .route("/generate", post(generate_handler::<S>))
        .route("/run", post(run_handler::<S>))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness: 200 once models are loaded, 503 before
async fn ping_handler<S: ObjectStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<PingResponse>, ApiError> {
    if !state.service.registry().is_ready() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Models not ready", "NOT_READY")),
        ));
    }

    Ok(Json(PingResponse {
        status: "healthy".to_string(),
        models_loaded: true,
    }))
}

async fn health_handler<S: ObjectStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(state.service.health().into())
}

/// Face swap
async fn generate_handler<S: ObjectStore>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<crate::service::SwapResult>, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(&rejection.body_text(), "INVALID_REQUEST")),
        )
    })?;

    let request = FaceSwapRequest::try_from(body).map_err(|e| api_error(&e))?;

    let result = state.service.process(request).await.map_err(|e| api_error(&e))?;

    Ok(Json(result))
}

/// Job envelope; failures are reported inside the envelope
async fn run_handler<S: ObjectStore>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> Result<Json<JobResponse>, ApiError> {
    let Json(job) = payload.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(&rejection.body_text(), "INVALID_REQUEST")),
        )
    })?;

    Ok(Json(state.jobs.handle(job).await))
}
