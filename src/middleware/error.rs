//! JSON envelopes for the payment API.
//!
//! Failures carry a dotted error code, the request id and a retry hint.
//! Successes wrap the payload under `data`.

use crate::error::{AppError, ErrorCode};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Body of every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Dotted code such as `ORDER.NOT_FOUND`
    pub error: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
    /// RFC 3339
    pub timestamp: String,
    /// False for declines and bad input; true when the same request may succeed later
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(error.is_retryable()),
        }
    }
}

// 5xx are logged at error level, everything else at warn.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error_code = %self.error_code(),
                detail = ?self.internal_detail(),
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "payment request failed"
            );
        } else {
            tracing::warn!(
                error_code = %self.error_code(),
                detail = ?self.internal_detail(),
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "payment request rejected"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// `{"success": true, "data": ..}`
pub fn success_response<T: Serialize>(data: T) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// As [`success_response`] plus a `meta` object; payment listings put the count there.
pub fn success_response_with_meta<T: Serialize, M: Serialize>(
    data: T,
    meta: M,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": data,
        "meta": meta,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
