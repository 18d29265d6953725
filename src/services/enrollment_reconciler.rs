//! Grants course access for a confirmed payment.
//!
//! Reconciliation is idempotent per (user, course): it creates the enrollment,
//! attaches the payment to an enrollment that has none, or leaves an already
//! paid enrollment untouched.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::EnrollmentRepository;
use crate::error::{AppError, AppResult, InfrastructureError};
use crate::models::Enrollment;

/// Courses reconciled at the same time for one payment
const RECONCILE_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    /// Existing enrollment without a payment now carries this one
    Attached,
    /// Enrollment already linked to a payment; nothing changed
    Unchanged,
}

pub struct EnrollmentReconciler {
    enrollments: Arc<dyn EnrollmentRepository>,
}

impl EnrollmentReconciler {
    pub fn new(enrollments: Arc<dyn EnrollmentRepository>) -> Self {
        Self { enrollments }
    }

    pub async fn reconcile(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        payment_id: Uuid,
    ) -> Result<(Enrollment, ReconcileOutcome), DatabaseError> {
        if let Some(existing) = self
            .enrollments
            .find_by_user_and_course(user_id, course_id)
            .await?
        {
            return self.link_existing(existing, payment_id).await;
        }

        match self
            .enrollments
            .create(user_id, course_id, Some(payment_id))
            .await
        {
            Ok(enrollment) => {
                info!(
                    user_id = %user_id,
                    course_id = %course_id,
                    payment_id = %payment_id,
                    "enrollment created"
                );
                Ok((enrollment, ReconcileOutcome::Created))
            }
            // A concurrent request created it between the lookup and the insert.
            Err(DatabaseError {
                kind: DatabaseErrorKind::UniqueViolation { .. },
            }) => {
                let existing = self
                    .enrollments
                    .find_by_user_and_course(user_id, course_id)
                    .await?
                    .ok_or_else(|| DatabaseError::not_found("Enrollment", course_id))?;
                self.link_existing(existing, payment_id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn link_existing(
        &self,
        existing: Enrollment,
        payment_id: Uuid,
    ) -> Result<(Enrollment, ReconcileOutcome), DatabaseError> {
        if existing.payment_id.is_some() {
            return Ok((existing, ReconcileOutcome::Unchanged));
        }

        match self.enrollments.attach_payment(existing.id, payment_id).await? {
            Some(updated) => {
                info!(
                    enrollment_id = %updated.id,
                    payment_id = %payment_id,
                    "payment attached to existing enrollment"
                );
                Ok((updated, ReconcileOutcome::Attached))
            }
            None => Ok((existing, ReconcileOutcome::Unchanged)),
        }
    }

    /// Reconcile every course of an order concurrently. All tasks run to
    /// completion; any failures are reported together.
    pub async fn reconcile_all(
        &self,
        user_id: Uuid,
        course_ids: &[Uuid],
        payment_id: Uuid,
    ) -> AppResult<Vec<Enrollment>> {
        let results: Vec<(Uuid, Result<(Enrollment, ReconcileOutcome), DatabaseError>)> =
            stream::iter(course_ids.iter().copied())
                .map(|course_id| async move {
                    (course_id, self.reconcile(user_id, course_id, payment_id).await)
                })
                .buffer_unordered(RECONCILE_CONCURRENCY)
                .collect()
                .await;

        let mut enrollments = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (course_id, result) in results {
            match result {
                Ok((enrollment, _)) => enrollments.push(enrollment),
                Err(e) => {
                    error!(
                        user_id = %user_id,
                        course_id = %course_id,
                        payment_id = %payment_id,
                        error = %e,
                        "enrollment reconciliation failed"
                    );
                    failures.push(format!("course {}: {}", course_id, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(AppError::infrastructure(InfrastructureError::Reconciliation {
                failures,
            })
            .with_context(format!("payment {}", payment_id)));
        }

        Ok(enrollments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::in_memory::InMemoryEnrollmentRepository;

    #[tokio::test]
    async fn creates_then_is_idempotent() {
        let repo = InMemoryEnrollmentRepository::new();
        let reconciler = EnrollmentReconciler::new(Arc::new(repo.clone()));
        let (user, course, payment) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let (first, outcome) = reconciler.reconcile(user, course, payment).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Created);
        assert_eq!(first.payment_id, Some(payment));

        let (second, outcome) = reconciler.reconcile(user, course, payment).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(second, first);
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn attaches_payment_to_unpaid_enrollment() {
        let repo = InMemoryEnrollmentRepository::new();
        let (user, course, payment) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        repo.create(user, course, None).await.unwrap();

        let reconciler = EnrollmentReconciler::new(Arc::new(repo.clone()));
        let (enrollment, outcome) = reconciler.reconcile(user, course, payment).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Attached);
        assert_eq!(enrollment.payment_id, Some(payment));
    }

    #[tokio::test]
    async fn keeps_existing_payment_link() {
        let repo = InMemoryEnrollmentRepository::new();
        let (user, course, original) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        repo.create(user, course, Some(original)).await.unwrap();

        let reconciler = EnrollmentReconciler::new(Arc::new(repo));
        let (enrollment, outcome) = reconciler
            .reconcile(user, course, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(enrollment.payment_id, Some(original));
    }

    #[tokio::test]
    async fn reconcile_all_covers_every_course() {
        let repo = InMemoryEnrollmentRepository::new();
        let reconciler = EnrollmentReconciler::new(Arc::new(repo.clone()));
        let user = Uuid::new_v4();
        let courses = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

        let enrollments = reconciler
            .reconcile_all(user, &courses, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(enrollments.len(), 3);
        assert_eq!(repo.count().await, 3);
    }
}
