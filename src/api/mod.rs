//! HTTP surface: routing, shared state and the health endpoints.

pub mod auth;
pub mod payments;
pub mod webhooks;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use crate::error::AppError;
use crate::health::{HealthChecker, HealthStatus};
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::PaymentOrchestrator;

/// Room for the multipart envelope around the largest accepted slip
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub approval_secret: Arc<str>,
    pub health_checker: HealthChecker,
    pub max_upload_bytes: usize,
}

pub fn build_router(state: AppState) -> Router {
    // Oversized slips must reach the image validator to get a proper 413 body.
    let body_limit = state.max_upload_bytes.saturating_mul(2) + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/api/payments", get(payments::list_payments))
        .route("/api/payments/me", get(payments::list_my_payments))
        .route("/api/payments/validate", post(payments::validate_payment))
        .route("/api/payments/card", post(payments::pay_by_card))
        .route("/api/payments/charges/{charge_id}", get(payments::retrieve_charge))
        .route("/api/payments/bank-transfer", post(payments::submit_bank_transfer))
        .route(
            "/webhooks/bank-transfer/approval",
            post(webhooks::approve_bank_transfer),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Attach the request id to an error before it is rendered.
pub(crate) fn tagged(headers: &HeaderMap) -> impl Fn(AppError) -> AppError + '_ {
    move |err| match get_request_id_from_headers(headers) {
        Some(request_id) => err.with_request_id(request_id),
        None => err,
    }
}

async fn root() -> &'static str {
    "Course payment backend"
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = state.health_checker.check_health().await;

    if health_status.is_healthy() {
        info!("Health check passed");
        Ok(Json(health_status))
    } else {
        error!("Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    }
}

async fn liveness() -> &'static str {
    "OK"
}
