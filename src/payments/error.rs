use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::error::{AppError, ErrorCode, ExternalError};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Why the gateway refused a card
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CardErrorKind {
    InvalidCard,
    ExpiredCard,
    InvalidCvv,
    InsufficientFunds,
    Declined,
}

impl CardErrorKind {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CardErrorKind::InvalidCard => ErrorCode::InvalidCard,
            CardErrorKind::ExpiredCard => ErrorCode::ExpiredCard,
            CardErrorKind::InvalidCvv => ErrorCode::InvalidCvv,
            CardErrorKind::InsufficientFunds => ErrorCode::InsufficientFund,
            CardErrorKind::Declined => ErrorCode::CardDeclined,
        }
    }

    /// Structured gateway error / failure codes.
    pub fn from_gateway_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "insufficient_fund" | "insufficient_funds" | "insufficient_balance" => {
                Some(CardErrorKind::InsufficientFunds)
            }
            "invalid_security_code" | "invalid_cvv" | "incorrect_cvc" => {
                Some(CardErrorKind::InvalidCvv)
            }
            "expired_card" | "card_expired" => Some(CardErrorKind::ExpiredCard),
            "invalid_card" | "invalid_card_number" | "invalid_account_number"
            | "invalid_expiration" | "brand_not_supported" => Some(CardErrorKind::InvalidCard),
            "stolen_or_lost_card" | "payment_rejected" | "failed_fraud_check"
            | "failed_processing" | "card_declined" | "payment_cancelled" => {
                Some(CardErrorKind::Declined)
            }
            _ => None,
        }
    }

    /// Message patterns, used when the code is missing or too coarse.
    pub fn from_message(message: &str) -> Option<Self> {
        static PATTERNS: OnceLock<Vec<(Regex, CardErrorKind)>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                (r"(?i)insufficient", CardErrorKind::InsufficientFunds),
                (r"(?i)expir", CardErrorKind::ExpiredCard),
                (r"(?i)\b(cvv|cvc|security code)\b", CardErrorKind::InvalidCvv),
                (r"(?i)invalid card|number is invalid|brand not supported", CardErrorKind::InvalidCard),
                (r"(?i)declined|rejected|stolen|lost", CardErrorKind::Declined),
            ]
            .into_iter()
            .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, kind)))
            .collect()
        });

        patterns
            .iter()
            .find(|(re, _)| re.is_match(message))
            .map(|(_, kind)| *kind)
    }

    /// Resolve a card rejection. The code table wins, except that a generic
    /// `invalid_card` is refined by its message (expiry and CVV problems share it).
    /// Anything unrecognized is treated as a plain decline.
    pub fn classify(code: Option<&str>, message: &str) -> Self {
        match code.and_then(Self::from_gateway_code) {
            Some(CardErrorKind::InvalidCard) => match Self::from_message(message) {
                Some(refined @ (CardErrorKind::ExpiredCard | CardErrorKind::InvalidCvv)) => refined,
                _ => CardErrorKind::InvalidCard,
            },
            Some(kind) => kind,
            None => Self::from_message(message).unwrap_or(CardErrorKind::Declined),
        }
    }
}

/// Errors raised by the card gateway client
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Card rejected ({kind:?}): {message}")]
    Card {
        kind: CardErrorKind,
        code: Option<String>,
        message: String,
    },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    #[error("Gateway error: code={code:?}, message={message}")]
    Provider {
        message: String,
        code: Option<String>,
        retryable: bool,
    },

    #[error("Invalid gateway response: {message}")]
    InvalidResponse { message: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Card { .. } => false,
            GatewayError::Network { .. } => true,
            GatewayError::RateLimit { .. } => true,
            GatewayError::Provider { retryable, .. } => *retryable,
            GatewayError::InvalidResponse { .. } => false,
        }
    }

    /// Turn a gateway rejection into a card error when it describes a card
    /// problem: a known card code, or no code and a recognizable message.
    pub fn into_card_error(self) -> Self {
        match self {
            GatewayError::Provider {
                code,
                message,
                retryable: false,
            } => {
                let is_card_problem = match code.as_deref() {
                    Some(code) => CardErrorKind::from_gateway_code(code).is_some(),
                    None => CardErrorKind::from_message(&message).is_some(),
                };
                if is_card_problem {
                    GatewayError::Card {
                        kind: CardErrorKind::classify(code.as_deref(), &message),
                        code,
                        message,
                    }
                } else {
                    GatewayError::Provider {
                        code,
                        message,
                        retryable: false,
                    }
                }
            }
            other => other,
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Card { kind, message, .. } => {
                AppError::external(ExternalError::Card { kind, message })
            }
            other => AppError::external(ExternalError::Gateway {
                is_retryable: other.is_retryable(),
                message: other.to_string(),
            }),
        }
    }
}
