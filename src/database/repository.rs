//! Repository ports used by the payment services
//!
//! Status changes are conditional on the current state so that concurrent
//! requests for the same order or payment cannot both win.

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::models::{Enrollment, NewPayment, Order, Payment, PaymentFilter, PaymentStatus};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Load an order together with its line items
    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, DatabaseError>;

    /// `pending -> processing`. Returns false when another attempt holds the order
    /// or it is no longer pending.
    async fn claim_for_payment(&self, order_id: Uuid) -> Result<bool, DatabaseError>;

    /// `processing -> pending`, used when a payment attempt did not succeed.
    async fn release_claim(&self, order_id: Uuid) -> Result<bool, DatabaseError>;

    /// `processing -> successful`.
    async fn mark_successful(&self, order_id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: NewPayment) -> Result<Payment, DatabaseError>;

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>, DatabaseError>;

    async fn find_by_gateway_charge_id(
        &self,
        charge_id: &str,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Move a pending payment to `status`. Returns `None` when the payment is
    /// missing or no longer pending.
    async fn update_status_if_pending(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        failure_reason: Option<String>,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Newest first
    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, DatabaseError>;

    /// Newest first
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>, DatabaseError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    async fn find_by_user_and_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, DatabaseError>;

    /// Fails with `UniqueViolation` when the (user, course) pair already exists.
    async fn create(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        payment_id: Option<Uuid>,
    ) -> Result<Enrollment, DatabaseError>;

    /// Set the payment id on an enrollment that has none. Returns `None` when the
    /// enrollment already carries a payment id.
    async fn attach_payment(
        &self,
        enrollment_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Enrollment>, DatabaseError>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Enrollment>, DatabaseError>;
}
