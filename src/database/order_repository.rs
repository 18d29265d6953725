use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::OrderRepository;
use crate::models::{Order, OrderItem, OrderStatus};

#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    total_amount: BigDecimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    course_id: Uuid,
    price: BigDecimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItemRow>) -> Result<Order, DatabaseError> {
        let status = OrderStatus::from_db_status(&self.status).ok_or_else(|| {
            DatabaseError::invalid_data(format!("unknown order status '{}'", self.status))
        })?;

        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            items: items
                .into_iter()
                .map(|item| OrderItem {
                    id: item.id,
                    order_id: item.order_id,
                    course_id: item.course_id,
                    price: item.price,
                })
                .collect(),
            total_amount: self.total_amount,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Orders and their line items in Postgres
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders
             SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(from.to_db_status())
        .bind(to.to_db_status())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, DatabaseError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_amount, status, created_at, updated_at
             FROM orders
             WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, course_id, price
             FROM order_items
             WHERE order_id = $1
             ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.into_order(items).map(Some)
    }

    async fn claim_for_payment(&self, order_id: Uuid) -> Result<bool, DatabaseError> {
        self.transition(order_id, OrderStatus::Pending, OrderStatus::Processing)
            .await
    }

    async fn release_claim(&self, order_id: Uuid) -> Result<bool, DatabaseError> {
        self.transition(order_id, OrderStatus::Processing, OrderStatus::Pending)
            .await
    }

    async fn mark_successful(&self, order_id: Uuid) -> Result<bool, DatabaseError> {
        self.transition(order_id, OrderStatus::Processing, OrderStatus::Successful)
            .await
    }
}
