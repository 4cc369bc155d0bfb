//! HTTP surface.
//!
//! Routes:
//! - `GET /health` - liveness, always 200
//! - `GET /ready` - 200 once the model is loaded, 503 before
//! - `GET /v2/models/{name}` - static model metadata
//! - `POST /v2/models/{name}/infer` - inference
//! - `GET /metrics` - Prometheus text exposition

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;
use v2serve_core::{ErrorResponse, ModelMetadata};

use crate::service::{InferError, InferenceService};

/// Content type of the Prometheus text format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub type AppState = Arc<InferenceService>;

#[derive(Debug, Serialize)]
struct HealthStatus<'a> {
    status: &'static str,
    model_loaded: bool,
    model: &'a str,
}

#[derive(Debug, Serialize)]
struct ReadyStatus {
    status: &'static str,
}

/// Build the router with permissive CORS and per-request tracing.
pub fn router(service: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/v2/models/:name", get(metadata_handler))
        .route("/v2/models/:name/infer", post(infer_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn health_handler(State(service): State<AppState>) -> Response {
    Json(HealthStatus {
        status: "ok",
        model_loaded: service.is_ready(),
        model: &service.model().name,
    })
    .into_response()
}

async fn ready_handler(State(service): State<AppState>) -> Response {
    if service.is_ready() {
        Json(ReadyStatus { status: "ready" }).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Model not ready")),
        )
            .into_response()
    }
}

async fn metadata_handler(
    State(service): State<AppState>,
    Path(name): Path<String>,
) -> Json<ModelMetadata> {
    debug!("Metadata requested for '{}'", name);
    Json(service.metadata())
}

async fn infer_handler(
    State(service): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    debug!("Inference requested for '{}' ({} bytes)", name, body.len());
    match service.infer_json(&body) {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn metrics_handler(State(service): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        service.metrics().render(),
    )
        .into_response()
}

impl InferError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InferError::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InferError::Body(_) | InferError::Decode(_) | InferError::Classify(_) => {
                StatusCode::BAD_REQUEST
            }
            InferError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for InferError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(self.public_message()))).into_response()
    }
}
