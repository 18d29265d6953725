use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    CardCharge,
    BankTransfer,
}

impl PaymentType {
    pub fn from_db_status(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "card_charge" | "card" => Some(PaymentType::CardCharge),
            "bank_transfer" => Some(PaymentType::BankTransfer),
            _ => None,
        }
    }

    pub fn to_db_status(&self) -> &'static str {
        match self {
            PaymentType::CardCharge => "card_charge",
            PaymentType::BankTransfer => "bank_transfer",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_status())
    }
}

/// Payment state machine: `Pending -> {Successful, Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Successful,
    Failed,
}

impl PaymentStatus {
    pub fn valid_transitions(&self) -> Vec<PaymentStatus> {
        match self {
            PaymentStatus::Pending => vec![PaymentStatus::Successful, PaymentStatus::Failed],
            // Terminal states
            PaymentStatus::Successful => vec![],
            PaymentStatus::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Successful | PaymentStatus::Failed)
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "successful" | "success" => Some(PaymentStatus::Successful),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn to_db_status(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Successful => "successful",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_status())
    }
}

/// One card charge attempt or one bank-transfer submission for an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub amount: BigDecimal,
    pub currency: String,
    /// Card path only.
    pub gateway_charge_id: Option<String>,
    /// Bank-transfer path only.
    pub slip_url: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload; ids and timestamps are assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub gateway_charge_id: Option<String>,
    pub slip_url: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub payment_type: Option<PaymentType>,
    pub status: Option<PaymentStatus>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.payment_type
            .map_or(true, |payment_type| payment.payment_type == payment_type)
            && self.status.map_or(true, |status| payment.status == status)
    }
}
