//! Payment endpoints for students and admins.

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use super::{tagged, AppState};
use crate::error::{AppError, AppResult, ValidationError};
use crate::middleware::error::{success_response, success_response_with_meta};
use crate::models::PaymentFilter;
use crate::payments::types::CardDetails;
use crate::uploads::UploadedFile;

#[derive(Debug, Deserialize)]
pub struct ValidatePaymentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CardPaymentRequest {
    pub order_id: Uuid,
    pub card: CardDetails,
}

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        AppError::validation(ValidationError::InvalidField {
            field: "body".to_string(),
            reason: rejection.body_text(),
        })
    })
}

/// POST /api/payments/validate
pub async fn validate_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<ValidatePaymentRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let tag = tagged(&headers);
    let request = json_body(payload).map_err(&tag)?;

    let validated = state
        .orchestrator
        .validate_payment(user.user_id, request.order_id)
        .await
        .map_err(&tag)?;
    Ok(success_response(validated))
}

/// POST /api/payments/card
pub async fn pay_by_card(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<CardPaymentRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let tag = tagged(&headers);
    let request = json_body(payload).map_err(&tag)?;

    info!(user_id = %user.user_id, order_id = %request.order_id, "card payment requested");
    let result = state
        .orchestrator
        .pay_by_card(user.user_id, request.order_id, &request.card)
        .await
        .map_err(&tag)?;
    Ok(success_response(result))
}

/// GET /api/payments/charges/{charge_id}
pub async fn retrieve_charge(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(charge_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let result = state
        .orchestrator
        .retrieve_charge(user.user_id, &charge_id)
        .await
        .map_err(tagged(&headers))?;
    Ok(success_response(result))
}

/// POST /api/payments/bank-transfer (multipart: `order_id`, `slip`)
pub async fn submit_bank_transfer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let tag = tagged(&headers);
    let (order_id, file) = read_slip_form(multipart).await.map_err(&tag)?;

    info!(
        user_id = %user.user_id,
        order_id = %order_id,
        file_name = %file.file_name,
        size = file.bytes.len(),
        "bank transfer slip received"
    );
    let submission = state
        .orchestrator
        .submit_bank_transfer(user.user_id, order_id, &file)
        .await
        .map_err(&tag)?;
    Ok(success_response(submission))
}

/// GET /api/payments?payment_type=&status=
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Query(filter): Query<PaymentFilter>,
) -> AppResult<impl IntoResponse> {
    let tag = tagged(&headers);
    user.require_admin().map_err(&tag)?;

    let payments = state.orchestrator.list_payments(&filter).await.map_err(&tag)?;
    let count = payments.len();
    Ok(success_response_with_meta(
        payments,
        serde_json::json!({ "count": count }),
    ))
}

/// GET /api/payments/me
pub async fn list_my_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let payments = state
        .orchestrator
        .list_my_payments(user.user_id)
        .await
        .map_err(tagged(&headers))?;
    let count = payments.len();
    Ok(success_response_with_meta(
        payments,
        serde_json::json!({ "count": count }),
    ))
}

async fn read_slip_form(mut multipart: Multipart) -> AppResult<(Uuid, UploadedFile)> {
    let mut order_id = None;
    let mut slip = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("order_id") => {
                let raw = field.text().await.map_err(invalid_form)?;
                let parsed = Uuid::parse_str(raw.trim()).map_err(|e| {
                    AppError::validation(ValidationError::InvalidField {
                        field: "order_id".to_string(),
                        reason: e.to_string(),
                    })
                })?;
                order_id = Some(parsed);
            }
            Some("slip") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(invalid_form)?;
                slip = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let order_id = order_id.ok_or_else(|| missing("order_id"))?;
    let slip = slip.ok_or_else(|| missing("slip"))?;
    Ok((order_id, slip))
}

fn invalid_form(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::validation(ValidationError::InvalidField {
        field: "multipart".to_string(),
        reason: err.body_text(),
    })
}

fn missing(field: &str) -> AppError {
    AppError::validation(ValidationError::MissingField {
        field: field.to_string(),
    })
}
