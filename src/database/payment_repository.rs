use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::PaymentRepository;
use crate::models::{NewPayment, Payment, PaymentFilter, PaymentStatus, PaymentType};

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, payment_type, status, amount, currency, \
     gateway_charge_id, slip_url, failure_reason, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    user_id: Uuid,
    payment_type: String,
    status: String,
    amount: BigDecimal,
    currency: String,
    gateway_charge_id: Option<String>,
    slip_url: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let payment_type = PaymentType::from_db_status(&row.payment_type).ok_or_else(|| {
            DatabaseError::invalid_data(format!("unknown payment type '{}'", row.payment_type))
        })?;
        let status = PaymentStatus::from_db_status(&row.status).ok_or_else(|| {
            DatabaseError::invalid_data(format!("unknown payment status '{}'", row.status))
        })?;

        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            user_id: row.user_id,
            payment_type,
            status,
            amount: row.amount,
            currency: row.currency,
            gateway_charge_id: row.gateway_charge_id,
            slip_url: row.slip_url,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_payments(rows: Vec<PaymentRow>) -> Result<Vec<Payment>, DatabaseError> {
    rows.into_iter().map(Payment::try_from).collect()
}

/// Payment attempts in Postgres
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments
             (order_id, user_id, payment_type, status, amount, currency,
              gateway_charge_id, slip_url, failure_reason)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment.order_id)
        .bind(payment.user_id)
        .bind(payment.payment_type.to_db_status())
        .bind(payment.status.to_db_status())
        .bind(&payment.amount)
        .bind(&payment.currency)
        .bind(&payment.gateway_charge_id)
        .bind(&payment.slip_url)
        .bind(&payment.failure_reason)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.try_into()
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Payment::try_from)
        .transpose()
    }

    async fn find_by_gateway_charge_id(
        &self,
        charge_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE gateway_charge_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(charge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Payment::try_from)
        .transpose()
    }

    async fn update_status_if_pending(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        failure_reason: Option<String>,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments
             SET status = $2,
                 failure_reason = COALESCE($3, failure_reason),
                 updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(status.to_db_status())
        .bind(failure_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Payment::try_from)
        .transpose()
    }

    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments
             WHERE ($1::text IS NULL OR payment_type = $1)
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(filter.payment_type.map(|t| t.to_db_status()))
        .bind(filter.status.map(|s| s.to_db_status()))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_payments(rows)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_payments(rows)
    }
}
