//! Callbacks from the back office.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::payments::json_body;
use super::{tagged, AppState};
use crate::error::{AppError, AppResult, DomainError};
use crate::middleware::error::success_response;
use crate::payments::utils::secret_matches;

pub const APPROVAL_SECRET_HEADER: &str = "x-approval-secret";

#[derive(Debug, Deserialize)]
pub struct BankTransferDecision {
    pub payment_id: Uuid,
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /webhooks/bank-transfer/approval
pub async fn approve_bank_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<BankTransferDecision>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let tag = tagged(&headers);

    let presented = headers
        .get(APPROVAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secret_matches(presented, &state.approval_secret) {
        warn!("bank transfer approval with missing or wrong secret");
        return Err(tag(AppError::domain(DomainError::Unauthorized {
            reason: format!("invalid {} header", APPROVAL_SECRET_HEADER),
        })));
    }

    let decision = json_body(payload).map_err(&tag)?;
    info!(
        payment_id = %decision.payment_id,
        approved = decision.approved,
        "bank transfer decision received"
    );

    let result = state
        .orchestrator
        .approve_bank_transfer(decision.payment_id, decision.approved, decision.reason)
        .await
        .map_err(&tag)?;
    Ok(success_response(result))
}
