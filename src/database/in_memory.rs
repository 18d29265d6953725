//! Thread-safe in-memory repositories for tests and `SKIP_EXTERNALS` mode.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{EnrollmentRepository, OrderRepository, PaymentRepository};
use crate::models::{
    Enrollment, NewPayment, Order, OrderStatus, Payment, PaymentFilter, PaymentStatus,
};

#[derive(Default, Clone)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders are created by the checkout flow; this seeds one directly.
    pub async fn insert(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }

    async fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, DatabaseError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(DatabaseError::not_found("Order", order_id)),
        }
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.orders.read().await.get(&order_id).cloned())
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

#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<Uuid, Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.payments.read().await.len()
    }
}

fn newest_first(mut payments: Vec<Payment>) -> Vec<Payment> {
    payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    payments
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: payment.order_id,
            user_id: payment.user_id,
            payment_type: payment.payment_type,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency,
            gateway_charge_id: payment.gateway_charge_id,
            slip_url: payment.slip_url,
            failure_reason: payment.failure_reason,
            created_at: now,
            updated_at: now,
        };
        self.payments
            .write()
            .await
            .insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        Ok(self.payments.read().await.get(&payment_id).cloned())
    }

    async fn find_by_gateway_charge_id(
        &self,
        charge_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.gateway_charge_id.as_deref() == Some(charge_id))
            .cloned())
    }

    async fn update_status_if_pending(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        failure_reason: Option<String>,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&payment_id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = status;
                if failure_reason.is_some() {
                    payment.failure_reason = failure_reason;
                }
                payment.updated_at = Utc::now();
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, DatabaseError> {
        let payments = self.payments.read().await;
        Ok(newest_first(
            payments.values().filter(|p| filter.matches(p)).cloned().collect(),
        ))
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>, DatabaseError> {
        let payments = self.payments.read().await;
        Ok(newest_first(
            payments
                .values()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }
}

#[derive(Default, Clone)]
pub struct InMemoryEnrollmentRepository {
    enrollments: Arc<RwLock<HashMap<(Uuid, Uuid), Enrollment>>>,
}

impl InMemoryEnrollmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.enrollments.read().await.len()
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryEnrollmentRepository {
    async fn find_by_user_and_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, DatabaseError> {
        Ok(self
            .enrollments
            .read()
            .await
            .get(&(user_id, course_id))
            .cloned())
    }

    async fn create(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        payment_id: Option<Uuid>,
    ) -> Result<Enrollment, DatabaseError> {
        let mut enrollments = self.enrollments.write().await;
        if enrollments.contains_key(&(user_id, course_id)) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "enrollments_user_id_course_id_key".to_string(),
            }));
        }

        let now = Utc::now();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            payment_id,
            created_at: now,
            updated_at: now,
        };
        enrollments.insert((user_id, course_id), enrollment.clone());
        Ok(enrollment)
    }

    async fn attach_payment(
        &self,
        enrollment_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Enrollment>, DatabaseError> {
        let mut enrollments = self.enrollments.write().await;
        let enrollment = enrollments
            .values_mut()
            .find(|e| e.id == enrollment_id)
            .ok_or_else(|| DatabaseError::not_found("Enrollment", enrollment_id))?;

        if enrollment.payment_id.is_some() {
            return Ok(None);
        }
        enrollment.payment_id = Some(payment_id);
        enrollment.updated_at = Utc::now();
        Ok(Some(enrollment.clone()))
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Enrollment>, DatabaseError> {
        Ok(self
            .enrollments
            .read()
            .await
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderItem, PaymentType};
    use bigdecimal::BigDecimal;

    fn order(status: OrderStatus) -> Order {
        let id = Uuid::new_v4();
        Order {
            id,
            user_id: Uuid::new_v4(),
            items: vec![OrderItem {
                id: Uuid::new_v4(),
                order_id: id,
                course_id: Uuid::new_v4(),
                price: BigDecimal::from(100),
            }],
            total_amount: BigDecimal::from(100),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let repo = InMemoryOrderRepository::new();
        let order = order(OrderStatus::Pending);
        repo.insert(order.clone()).await;

        assert!(repo.claim_for_payment(order.id).await.unwrap());
        assert!(!repo.claim_for_payment(order.id).await.unwrap());

        assert!(repo.release_claim(order.id).await.unwrap());
        assert!(repo.claim_for_payment(order.id).await.unwrap());
        assert!(repo.mark_successful(order.id).await.unwrap());

        let stored = repo.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Successful);
        assert!(!repo.claim_for_payment(order.id).await.unwrap());
    }

    #[tokio::test]
    async fn claim_on_missing_order_is_not_found() {
        let repo = InMemoryOrderRepository::new();
        let err = repo.claim_for_payment(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err.kind, DatabaseErrorKind::NotFound { .. }));
    }

    #[tokio::test]
    async fn status_update_only_applies_to_pending_payments() {
        let repo = InMemoryPaymentRepository::new();
        let payment = repo
            .create(NewPayment {
                order_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                payment_type: PaymentType::BankTransfer,
                status: PaymentStatus::Pending,
                amount: BigDecimal::from(50),
                currency: "thb".to_string(),
                gateway_charge_id: None,
                slip_url: Some("https://storage/slip.png".to_string()),
                failure_reason: None,
            })
            .await
            .unwrap();

        let updated = repo
            .update_status_if_pending(payment.id, PaymentStatus::Failed, Some("blurry".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, PaymentStatus::Failed);
        assert_eq!(updated.failure_reason.as_deref(), Some("blurry"));

        let second = repo
            .update_status_if_pending(payment.id, PaymentStatus::Successful, None)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn enrollment_pair_is_unique() {
        let repo = InMemoryEnrollmentRepository::new();
        let (user, course) = (Uuid::new_v4(), Uuid::new_v4());

        let enrollment = repo.create(user, course, None).await.unwrap();
        let err = repo.create(user, course, None).await.unwrap_err();
        assert!(matches!(err.kind, DatabaseErrorKind::UniqueViolation { .. }));

        let payment_id = Uuid::new_v4();
        let attached = repo
            .attach_payment(enrollment.id, payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attached.payment_id, Some(payment_id));
        assert!(repo
            .attach_payment(enrollment.id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
