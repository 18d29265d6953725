use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle.
///
/// `Processing` is a short-lived claim taken while a payment attempt is in
/// flight so that two attempts on the same order cannot both proceed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Successful,
    Failed,
}

impl OrderStatus {
    pub fn from_db_status(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "successful" | "success" | "completed" => Some(OrderStatus::Successful),
            "failed" | "cancelled" | "canceled" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn to_db_status(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Successful => "successful",
            OrderStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_status())
    }
}

/// A purchased course inside an order, priced at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub course_id: Uuid,
    pub price: BigDecimal,
}

/// A checked-out cart awaiting (or having completed) payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub total_amount: BigDecimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sum of the priced line items.
    pub fn items_total(&self) -> BigDecimal {
        self.items
            .iter()
            .fold(BigDecimal::from(0), |acc, item| acc + &item.price)
    }

    /// Whether the stored total matches the line items.
    pub fn is_consistent(&self) -> bool {
        self.items_total() == self.total_amount
    }

    pub fn course_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|item| item.course_id).collect()
    }
}
