//! Card payments through the external gateway.
//!
//! Token creation failures leave no trace in the database. Once a token exists
//! every charge attempt is recorded, whatever the gateway answers.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::repository::PaymentRepository;
use crate::error::{AppError, AppResult, ErrorCode, ValidationError};
use crate::models::{NewPayment, Payment, PaymentStatus, PaymentType};
use crate::payments::error::{CardErrorKind, GatewayError};
use crate::payments::provider::CardGateway;
use crate::payments::types::{to_minor_units, CardDetails, CardToken, ChargeRequest, GatewayCharge};

/// Outcome of a charge attempt, returned to the client
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChargeResult {
    pub payment_id: Uuid,
    pub gateway_charge_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: BigDecimal,
    pub currency: String,
    /// Set when the gateway reported a failed charge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl ChargeResult {
    fn from_payment(payment: &Payment, charge: Option<&GatewayCharge>) -> Self {
        let failure_code = charge
            .filter(|c| c.payment_status() == PaymentStatus::Failed)
            .map(|c| {
                CardErrorKind::classify(
                    c.failure_code.as_deref(),
                    c.failure_message.as_deref().unwrap_or_default(),
                )
                .error_code()
            });

        Self {
            payment_id: payment.id,
            gateway_charge_id: payment.gateway_charge_id.clone(),
            status: payment.status,
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            failure_code,
            failure_message: payment.failure_reason.clone(),
        }
    }
}

/// A charge attempt together with the payment row it produced
#[derive(Debug, Clone)]
pub struct RecordedCharge {
    pub payment: Payment,
    pub result: ChargeResult,
}

/// The gateway's current view of a charge
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChargeStatusView {
    pub gateway_charge_id: String,
    pub status: PaymentStatus,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
}

impl From<&GatewayCharge> for ChargeStatusView {
    fn from(charge: &GatewayCharge) -> Self {
        Self {
            gateway_charge_id: charge.id.clone(),
            status: charge.payment_status(),
            amount: charge.amount_major(),
            currency: charge.currency.clone(),
            failure_code: charge.failure_code.clone(),
        }
    }
}

pub struct CardChargeProcessor {
    gateway: Arc<dyn CardGateway>,
    payments: Arc<dyn PaymentRepository>,
    currency: String,
}

impl CardChargeProcessor {
    pub fn new(
        gateway: Arc<dyn CardGateway>,
        payments: Arc<dyn PaymentRepository>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            payments,
            currency: currency.into(),
        }
    }

    pub async fn create_token(&self, card: &CardDetails) -> AppResult<CardToken> {
        self.gateway.create_token(card).await.map_err(|e| {
            let e = e.into_card_error();
            warn!(gateway = self.gateway.name(), step = "create_token", error = %e, "card token creation failed");
            AppError::from(e)
        })
    }

    /// Amount in gateway minor units. Checked before a token is created so a
    /// malformed amount never leaves a tokenized card without a payment row.
    pub fn minor_units(amount: &BigDecimal) -> AppResult<i64> {
        to_minor_units(amount).map_err(|e| {
            AppError::validation(ValidationError::InvalidField {
                field: "amount".to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Charge a token and record the attempt.
    pub async fn charge(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        amount: &BigDecimal,
        token: &CardToken,
    ) -> AppResult<RecordedCharge> {
        let amount_minor = Self::minor_units(amount)?;

        let request = ChargeRequest {
            amount_minor,
            currency: self.currency.clone(),
            token: token.id.clone(),
            description: format!("Course order {}", order_id),
            order_id: order_id.to_string(),
        };

        let charge = match self.gateway.create_charge(request).await {
            Ok(charge) => charge,
            Err(e) => {
                let e = e.into_card_error();
                warn!(
                    order_id = %order_id,
                    user_id = %user_id,
                    step = "create_charge",
                    error = %e,
                    "charge creation failed"
                );
                self.record_failed_attempt(user_id, order_id, amount, &e)
                    .await?;
                return Err(e.into());
            }
        };

        let status = charge.payment_status();
        let payment = self
            .payments
            .create(NewPayment {
                order_id,
                user_id,
                payment_type: PaymentType::CardCharge,
                status,
                amount: amount.clone(),
                currency: self.currency.clone(),
                gateway_charge_id: Some(charge.id.clone()),
                slip_url: None,
                failure_reason: charge
                    .failure_message
                    .clone()
                    .or_else(|| charge.failure_code.clone()),
            })
            .await?;

        info!(
            payment_id = %payment.id,
            order_id = %order_id,
            user_id = %user_id,
            charge_id = %charge.id,
            status = %status,
            "card charge recorded"
        );

        let result = ChargeResult::from_payment(&payment, Some(&charge));
        Ok(RecordedCharge { payment, result })
    }

    async fn record_failed_attempt(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        amount: &BigDecimal,
        error: &GatewayError,
    ) -> AppResult<Payment> {
        let payment = self
            .payments
            .create(NewPayment {
                order_id,
                user_id,
                payment_type: PaymentType::CardCharge,
                status: PaymentStatus::Failed,
                amount: amount.clone(),
                currency: self.currency.clone(),
                gateway_charge_id: None,
                slip_url: None,
                failure_reason: Some(error.to_string()),
            })
            .await?;
        Ok(payment)
    }

    pub async fn retrieve_charge(&self, charge_id: &str) -> AppResult<GatewayCharge> {
        self.gateway.retrieve_charge(charge_id).await.map_err(|e| {
            warn!(charge_id = %charge_id, step = "retrieve_charge", error = %e, "charge retrieval failed");
            AppError::from(e)
        })
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}
