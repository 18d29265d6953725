use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::models::Payment;
use crate::payments::utils::sign_hmac_sha256_hex;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A bank-transfer slip awaits manual review
    BankTransferSubmitted,
    PaymentSucceeded,
    PaymentRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentNotification {
    pub event: NotificationType,
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: String,
    pub currency: String,
    pub slip_url: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: String,
}

impl PaymentNotification {
    pub fn for_payment(event: NotificationType, payment: &Payment) -> Self {
        Self {
            event,
            payment_id: payment.id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount: payment.amount.to_string(),
            currency: payment.currency.clone(),
            slip_url: payment.slip_url.clone(),
            reason: payment.failure_reason.clone(),
            occurred_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("notification delivery failed: {message}")]
    Delivery { message: String },

    #[error("notification endpoint returned {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn notify(&self, notification: &PaymentNotification) -> Result<(), NotificationError>;
}

/// Fire-and-forget delivery. The caller never waits and a failure is only logged.
pub fn dispatch(notifier: Arc<dyn PaymentNotifier>, notification: PaymentNotification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            warn!(
                event_name = "payment_notification_failed",
                notification = ?notification.event,
                payment_id = %notification.payment_id,
                order_id = %notification.order_id,
                error = %e,
                "payment notification could not be delivered"
            );
        }
    });
}

/// Structured log line only; used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentNotifier for LogNotifier {
    async fn notify(&self, notification: &PaymentNotification) -> Result<(), NotificationError> {
        match notification.event {
            NotificationType::BankTransferSubmitted => info!(
                payment_id = %notification.payment_id,
                order_id = %notification.order_id,
                slip_url = ?notification.slip_url,
                "🔔 NOTIFICATION: bank transfer awaiting review"
            ),
            NotificationType::PaymentSucceeded => info!(
                payment_id = %notification.payment_id,
                order_id = %notification.order_id,
                amount = %notification.amount,
                currency = %notification.currency,
                "🔔 NOTIFICATION: payment succeeded"
            ),
            NotificationType::PaymentRejected => info!(
                payment_id = %notification.payment_id,
                order_id = %notification.order_id,
                reason = ?notification.reason,
                "🔔 NOTIFICATION: payment rejected"
            ),
        }
        Ok(())
    }
}

/// JSON POST signed with `x-signature: hex(HMAC-SHA256(body))`
pub struct WebhookNotifier {
    client: Client,
    url: String,
    signing_secret: String,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        signing_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Delivery {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url: url.into(),
            signing_secret: signing_secret.into(),
        })
    }
}

#[async_trait]
impl PaymentNotifier for WebhookNotifier {
    async fn notify(&self, notification: &PaymentNotification) -> Result<(), NotificationError> {
        let body = serde_json::to_vec(notification).map_err(|e| NotificationError::Delivery {
            message: e.to_string(),
        })?;
        let signature = sign_hmac_sha256_hex(&body, &self.signing_secret);

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("x-signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(NotificationError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, log-only otherwise.
pub fn notifier_from_config(
    config: &NotificationConfig,
) -> Result<Arc<dyn PaymentNotifier>, NotificationError> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url.clone(),
            config.signing_secret.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogNotifier::new())),
    }
}
