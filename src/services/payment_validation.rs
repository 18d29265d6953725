//! Pre-payment checks shared by the card and bank-transfer paths.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::database::repository::OrderRepository;
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::models::{Order, OrderItem, OrderStatus};

#[derive(Debug, Clone, Serialize)]
pub struct ValidatedOrder {
    pub order: Order,
    pub line_items: Vec<OrderItem>,
    pub chargeable_amount: BigDecimal,
}

pub struct PaymentValidationService {
    orders: Arc<dyn OrderRepository>,
    minimum_amount: BigDecimal,
}

impl PaymentValidationService {
    pub fn new(orders: Arc<dyn OrderRepository>, minimum_amount: BigDecimal) -> Self {
        Self {
            orders,
            minimum_amount,
        }
    }

    pub fn minimum_amount(&self) -> &BigDecimal {
        &self.minimum_amount
    }

    /// Read-only. Checks existence, ownership, status, line items and the
    /// minimum amount, stopping at the first failure.
    pub async fn validate(&self, user_id: Uuid, order_id: Uuid) -> AppResult<ValidatedOrder> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::OrderNotFound {
                    order_id: order_id.to_string(),
                })
            })?;

        if order.user_id != user_id {
            return Err(AppError::domain(DomainError::AccessDenied {
                order_id: order_id.to_string(),
            })
            .with_context(format!("order owned by {}, requested by {}", order.user_id, user_id)));
        }

        if order.status != OrderStatus::Pending {
            return Err(AppError::domain(DomainError::OrderAlreadyProcessed {
                order_id: order_id.to_string(),
            })
            .with_context(format!("order status is {}", order.status)));
        }

        if order.items.is_empty() {
            return Err(AppError::validation(ValidationError::OrderEmpty {
                order_id: order_id.to_string(),
            }));
        }

        if order.total_amount < self.minimum_amount {
            return Err(AppError::validation(ValidationError::BelowMinimumAmount {
                amount: order.total_amount.to_string(),
                minimum: self.minimum_amount.to_string(),
            }));
        }

        if !order.is_consistent() {
            warn!(
                order_id = %order.id,
                total_amount = %order.total_amount,
                items_total = %order.items_total(),
                "order total does not match the sum of its line items"
            );
        }

        Ok(ValidatedOrder {
            line_items: order.items.clone(),
            chargeable_amount: order.total_amount.clone(),
            order,
        })
    }
}
