//! Omise-compatible REST gateway.
//!
//! Tokens are created on the vault host with the public key, charges on the
//! API host with the secret key. Both use HTTP basic auth with the key as the
//! username.

use crate::config::GatewayConfig;
use crate::logging::mask_card_number;
use crate::middleware::logging::log_external_call;
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::provider::CardGateway;
use crate::payments::types::{CardDetails, CardToken, ChargeRequest, GatewayCharge};
use crate::payments::utils::{HttpAuth, PaymentHttpClient};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
struct OmiseCard {
    last_digits: Option<String>,
    brand: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OmiseToken {
    id: String,
    card: Option<OmiseCard>,
}

#[derive(Debug, Deserialize)]
struct OmiseCharge {
    id: String,
    #[serde(default)]
    paid: bool,
    amount: i64,
    currency: String,
    failure_code: Option<String>,
    failure_message: Option<String>,
}

impl From<OmiseCharge> for GatewayCharge {
    fn from(charge: OmiseCharge) -> Self {
        GatewayCharge {
            id: charge.id,
            paid: charge.paid,
            amount: charge.amount,
            currency: charge.currency,
            failure_code: charge.failure_code,
            failure_message: charge.failure_message,
        }
    }
}

/// Body of `POST /tokens`. Billing fields are left out when absent.
fn token_payload(card: &CardDetails) -> serde_json::Value {
    let mut fields = serde_json::json!({
        "name": card.name,
        "number": card.number,
        "expiration_month": card.expiration_month,
        "expiration_year": card.expiration_year,
        "security_code": card.security_code,
    });
    if let Some(city) = &card.city {
        fields["city"] = serde_json::Value::from(city.as_str());
    }
    if let Some(postal_code) = &card.postal_code {
        fields["postal_code"] = serde_json::Value::from(postal_code.as_str());
    }
    serde_json::json!({ "card": fields })
}

pub struct OmiseGateway {
    config: GatewayConfig,
    http: PaymentHttpClient,
}

impl OmiseGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let http =
            PaymentHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    fn api_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn vault_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.vault_base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl CardGateway for OmiseGateway {
    async fn create_token(&self, card: &CardDetails) -> GatewayResult<CardToken> {
        let payload = token_payload(card);

        let token: OmiseToken = log_external_call(
            "omise",
            "POST /tokens",
            self.http.request_json(
                reqwest::Method::POST,
                &self.vault_endpoint("/tokens"),
                HttpAuth::Basic(&self.config.public_key),
                Some(&payload),
            ),
        )
        .await
        .map_err(GatewayError::into_card_error)?;

        info!(
            card = %mask_card_number(&card.number),
            token_id = %token.id,
            "card token created"
        );

        let card = token.card;
        Ok(CardToken {
            id: token.id,
            last_digits: card.as_ref().and_then(|c| c.last_digits.clone()),
            brand: card.and_then(|c| c.brand),
        })
    }

    async fn create_charge(&self, request: ChargeRequest) -> GatewayResult<GatewayCharge> {
        let payload = serde_json::json!({
            "amount": request.amount_minor,
            "currency": request.currency,
            "card": request.token,
            "description": request.description,
            "metadata": { "order_id": request.order_id },
        });

        let charge: OmiseCharge = log_external_call(
            "omise",
            "POST /charges",
            self.http.request_json(
                reqwest::Method::POST,
                &self.api_endpoint("/charges"),
                HttpAuth::Basic(&self.config.secret_key),
                Some(&payload),
            ),
        )
        .await
        .map_err(GatewayError::into_card_error)?;

        info!(
            charge_id = %charge.id,
            order_id = %request.order_id,
            paid = charge.paid,
            failure_code = ?charge.failure_code,
            "charge created"
        );

        Ok(charge.into())
    }

    async fn retrieve_charge(&self, charge_id: &str) -> GatewayResult<GatewayCharge> {
        if charge_id.trim().is_empty() {
            return Err(GatewayError::Provider {
                message: "charge id is required".to_string(),
                code: Some("invalid_charge".to_string()),
                retryable: false,
            });
        }

        let charge: OmiseCharge = log_external_call(
            "omise",
            "GET /charges/{id}",
            self.http.request_json(
                reqwest::Method::GET,
                &self.api_endpoint(&format!("/charges/{}", charge_id)),
                HttpAuth::Basic(&self.config.secret_key),
                None,
            ),
        )
        .await?;

        Ok(charge.into())
    }

    fn name(&self) -> &'static str {
        "omise"
    }
}
