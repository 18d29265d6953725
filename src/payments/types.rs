use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::logging::mask_card_number;
use crate::models::PaymentStatus;
use crate::payments::error::GatewayError;

/// Raw card details, held only for the duration of token creation.
#[derive(Clone, Deserialize)]
pub struct CardDetails {
    pub name: String,
    pub number: String,
    pub expiration_month: u8,
    pub expiration_year: u16,
    pub security_code: String,
    /// Billing address, forwarded to the gateway when present
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("name", &self.name)
            .field("number", &mask_card_number(&self.number))
            .field("expiration_month", &self.expiration_month)
            .field("expiration_year", &self.expiration_year)
            .field("security_code", &"***")
            .field("city", &self.city)
            .field("postal_code", &self.postal_code)
            .finish()
    }
}

/// Single-use gateway token standing in for the card
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardToken {
    pub id: String,
    pub last_digits: Option<String>,
    pub brand: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Smallest currency unit
    pub amount_minor: i64,
    pub currency: String,
    pub token: String,
    pub description: String,
    pub order_id: String,
}

/// The gateway's view of a charge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayCharge {
    pub id: String,
    pub paid: bool,
    /// Smallest currency unit
    pub amount: i64,
    pub currency: String,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}

impl GatewayCharge {
    /// `paid` wins; a failure code means failed; anything else is still settling.
    pub fn payment_status(&self) -> PaymentStatus {
        if self.paid {
            PaymentStatus::Successful
        } else if self
            .failure_code
            .as_deref()
            .is_some_and(|code| !code.trim().is_empty())
        {
            PaymentStatus::Failed
        } else {
            PaymentStatus::Pending
        }
    }

    pub fn amount_major(&self) -> BigDecimal {
        from_minor_units(self.amount)
    }
}

/// Convert a major-unit amount to the gateway's integer minor units.
/// Fractions below one minor unit are rejected rather than rounded.
pub fn to_minor_units(amount: &BigDecimal) -> Result<i64, GatewayError> {
    let minor = amount * BigDecimal::from(100);
    if minor.with_scale(0) != minor {
        return Err(GatewayError::InvalidResponse {
            message: format!("amount {} has more than two decimal places", amount),
        });
    }
    minor.to_i64().ok_or_else(|| GatewayError::InvalidResponse {
        message: format!("amount {} is out of range", amount),
    })
}

pub fn from_minor_units(amount: i64) -> BigDecimal {
    BigDecimal::new(amount.into(), 2)
}
