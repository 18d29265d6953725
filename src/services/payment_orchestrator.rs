//! Payment Orchestrator Service
//!
//! Entry point for every payment operation. It runs the order checks, takes
//! the order claim (`pending -> processing`) before any gateway or storage
//! side effect, hands off to the card or bank-transfer processor, and on a
//! confirmed payment grants enrollments and completes the order.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseErrorKind;
use crate::database::repository::{OrderRepository, PaymentRepository};
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::models::{Enrollment, Payment, PaymentFilter, PaymentStatus, PaymentType};
use crate::payments::types::CardDetails;
use crate::services::bank_transfer::{BankTransferProcessor, BankTransferSubmission};
use crate::services::card_charge::{
    CardChargeProcessor, ChargeResult, ChargeStatusView, RecordedCharge,
};
use crate::services::enrollment_reconciler::EnrollmentReconciler;
use crate::services::notification::{dispatch, NotificationType, PaymentNotification, PaymentNotifier};
use crate::services::payment_validation::{PaymentValidationService, ValidatedOrder};
use crate::uploads::UploadedFile;

/// Result of an approval decision
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResult {
    pub payment: Payment,
    pub enrollments: Vec<Enrollment>,
}

/// Gateway view of a charge plus the local payment after syncing
#[derive(Debug, Clone, Serialize)]
pub struct ChargeSyncResult {
    pub charge: ChargeStatusView,
    pub payment: Payment,
}

pub struct PaymentOrchestrator {
    validation: PaymentValidationService,
    card: CardChargeProcessor,
    bank_transfer: BankTransferProcessor,
    reconciler: EnrollmentReconciler,
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    notifier: Arc<dyn PaymentNotifier>,
}

impl PaymentOrchestrator {
    pub fn new(
        validation: PaymentValidationService,
        card: CardChargeProcessor,
        bank_transfer: BankTransferProcessor,
        reconciler: EnrollmentReconciler,
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
        notifier: Arc<dyn PaymentNotifier>,
    ) -> Self {
        Self {
            validation,
            card,
            bank_transfer,
            reconciler,
            orders,
            payments,
            notifier,
        }
    }

    pub async fn validate_payment(&self, user_id: Uuid, order_id: Uuid) -> AppResult<ValidatedOrder> {
        self.validation.validate(user_id, order_id).await
    }

    /// Validate, claim, tokenize, charge. Enrollments and order completion
    /// only follow a `Successful` charge; otherwise the claim is released.
    pub async fn pay_by_card(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        card: &CardDetails,
    ) -> AppResult<ChargeResult> {
        let validated = self.validation.validate(user_id, order_id).await?;
        CardChargeProcessor::minor_units(&validated.chargeable_amount)?;
        self.claim_order(order_id).await?;

        let attempt: AppResult<RecordedCharge> = async {
            let token = self.card.create_token(card).await?;
            self.card
                .charge(user_id, order_id, &validated.chargeable_amount, &token)
                .await
        }
        .await;

        match attempt {
            Ok(RecordedCharge { payment, result })
                if payment.status == PaymentStatus::Successful =>
            {
                self.complete_order(&validated, &payment).await?;
                Ok(result)
            }
            Ok(RecordedCharge { result, .. }) => {
                info!(
                    order_id = %order_id,
                    payment_id = %result.payment_id,
                    status = %result.status,
                    "card charge did not succeed; order left pending"
                );
                self.release_claim(order_id).await;
                Ok(result)
            }
            Err(e) => {
                self.release_claim(order_id).await;
                Err(e)
            }
        }
    }

    /// Validate, claim, store the slip and record a pending payment. The order
    /// stays pending until the transfer is approved.
    pub async fn submit_bank_transfer(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        file: &UploadedFile,
    ) -> AppResult<BankTransferSubmission> {
        let validated = self.validation.validate(user_id, order_id).await?;
        self.claim_order(order_id).await?;

        let result = self
            .bank_transfer
            .submit(file, order_id, user_id, &validated.chargeable_amount)
            .await;

        self.release_claim(order_id).await;
        result
    }

    /// Approve or reject a pending bank transfer.
    pub async fn approve_bank_transfer(
        &self,
        payment_id: Uuid,
        approved: bool,
        reason: Option<String>,
    ) -> AppResult<ApprovalResult> {
        let payment = self.load_payment(payment_id).await?;

        if payment.status != PaymentStatus::Pending {
            return Err(AppError::domain(DomainError::PaymentAlreadyProcessed {
                payment_id: payment_id.to_string(),
            }));
        }
        if payment.payment_type != PaymentType::BankTransfer {
            return Err(AppError::domain(DomainError::InvalidPaymentType {
                payment_id: payment_id.to_string(),
                expected: PaymentType::BankTransfer.to_string(),
            }));
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        if approved {
            self.approve(payment).await
        } else {
            let reason = reason
                .ok_or_else(|| AppError::validation(ValidationError::ApprovalReasonRequired))?;
            self.reject(payment, reason).await
        }
    }

    async fn approve(&self, payment: Payment) -> AppResult<ApprovalResult> {
        // Loses to any other payment that already completed the order.
        self.claim_order(payment.order_id).await?;

        // Until the payment is committed every failure releases the claim.
        let order = match self.orders.find_by_id(payment.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                self.release_claim(payment.order_id).await;
                return Err(AppError::domain(DomainError::OrderNotFound {
                    order_id: payment.order_id.to_string(),
                }));
            }
            Err(e) => {
                self.release_claim(payment.order_id).await;
                return Err(e.into());
            }
        };

        let updated = match self
            .payments
            .update_status_if_pending(payment.id, PaymentStatus::Successful, None)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.release_claim(payment.order_id).await;
                return Err(AppError::domain(DomainError::PaymentAlreadyProcessed {
                    payment_id: payment.id.to_string(),
                }));
            }
            Err(e) => {
                self.release_claim(payment.order_id).await;
                return Err(e.into());
            }
        };

        let validated = ValidatedOrder {
            line_items: order.items.clone(),
            chargeable_amount: order.total_amount.clone(),
            order,
        };

        let enrollments = self.complete_order(&validated, &updated).await?;
        info!(payment_id = %updated.id, order_id = %updated.order_id, "bank transfer approved");

        Ok(ApprovalResult {
            payment: updated,
            enrollments,
        })
    }

    async fn reject(&self, payment: Payment, reason: String) -> AppResult<ApprovalResult> {
        let updated = self
            .payments
            .update_status_if_pending(payment.id, PaymentStatus::Failed, Some(reason))
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::PaymentAlreadyProcessed {
                    payment_id: payment.id.to_string(),
                })
            })?;

        info!(
            payment_id = %updated.id,
            order_id = %updated.order_id,
            reason = ?updated.failure_reason,
            "bank transfer rejected"
        );
        dispatch(
            self.notifier.clone(),
            PaymentNotification::for_payment(NotificationType::PaymentRejected, &updated),
        );

        Ok(ApprovalResult {
            payment: updated,
            enrollments: Vec::new(),
        })
    }

    /// Look up a charge on behalf of its owner and bring the local payment in
    /// line with the gateway.
    pub async fn retrieve_charge(&self, user_id: Uuid, charge_id: &str) -> AppResult<ChargeSyncResult> {
        let payment = self.payment_for_charge(charge_id).await?;
        if payment.user_id != user_id {
            return Err(AppError::domain(DomainError::AccessDenied {
                order_id: payment.order_id.to_string(),
            }));
        }
        self.sync_card_payment(charge_id).await
    }

    /// Apply the gateway's terminal status to a pending card payment. Safe to
    /// call repeatedly; a payment that is already terminal is returned as is.
    pub async fn sync_card_payment(&self, charge_id: &str) -> AppResult<ChargeSyncResult> {
        let payment = self.payment_for_charge(charge_id).await?;
        let charge = self.card.retrieve_charge(charge_id).await?;
        let view = ChargeStatusView::from(&charge);

        if payment.status != PaymentStatus::Pending || view.status == PaymentStatus::Pending {
            return Ok(ChargeSyncResult {
                charge: view,
                payment,
            });
        }

        let failure_reason = (view.status == PaymentStatus::Failed)
            .then(|| charge.failure_message.clone().or_else(|| charge.failure_code.clone()))
            .flatten();

        let Some(updated) = self
            .payments
            .update_status_if_pending(payment.id, view.status, failure_reason)
            .await?
        else {
            // Another sync got there first.
            let current = self.load_payment(payment.id).await?;
            return Ok(ChargeSyncResult {
                charge: view,
                payment: current,
            });
        };

        info!(
            payment_id = %updated.id,
            charge_id = %charge_id,
            status = %updated.status,
            "card payment synced from gateway"
        );

        if updated.status == PaymentStatus::Successful {
            self.complete_settled_payment(&updated).await?;
        }

        Ok(ChargeSyncResult {
            charge: view,
            payment: updated,
        })
    }

    /// A card charge that settled after the original request returned.
    async fn complete_settled_payment(&self, payment: &Payment) -> AppResult<()> {
        let order = self
            .orders
            .find_by_id(payment.order_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::OrderNotFound {
                    order_id: payment.order_id.to_string(),
                })
            })?;

        if self.orders.claim_for_payment(order.id).await? {
            let validated = ValidatedOrder {
                line_items: order.items.clone(),
                chargeable_amount: order.total_amount.clone(),
                order,
            };
            self.complete_order(&validated, payment).await?;
        } else {
            // The money is captured either way, so access is still granted.
            warn!(
                payment_id = %payment.id,
                order_id = %order.id,
                order_status = %order.status,
                "settled payment for an order that is no longer pending; needs review"
            );
            self.reconciler
                .reconcile_all(payment.user_id, &order.course_ids(), payment.id)
                .await?;
        }
        Ok(())
    }

    pub async fn list_payments(&self, filter: &PaymentFilter) -> AppResult<Vec<Payment>> {
        Ok(self.payments.list(filter).await?)
    }

    pub async fn list_my_payments(&self, user_id: Uuid) -> AppResult<Vec<Payment>> {
        Ok(self.payments.list_by_user(user_id).await?)
    }

    /// Enroll the buyer in every course and mark the claimed order successful.
    /// The order is completed even when some enrollments fail, since the
    /// payment is already confirmed; the failures are then returned.
    async fn complete_order(
        &self,
        validated: &ValidatedOrder,
        payment: &Payment,
    ) -> AppResult<Vec<Enrollment>> {
        let order = &validated.order;
        let reconciled = self
            .reconciler
            .reconcile_all(order.user_id, &order.course_ids(), payment.id)
            .await;

        if !self.orders.mark_successful(order.id).await? {
            warn!(order_id = %order.id, "order was not in processing when completing payment");
        }

        info!(
            order_id = %order.id,
            payment_id = %payment.id,
            user_id = %order.user_id,
            "order paid"
        );
        dispatch(
            self.notifier.clone(),
            PaymentNotification::for_payment(NotificationType::PaymentSucceeded, payment),
        );

        reconciled
    }

    async fn claim_order(&self, order_id: Uuid) -> AppResult<()> {
        match self.orders.claim_for_payment(order_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::domain(DomainError::OrderAlreadyProcessed {
                order_id: order_id.to_string(),
            })
            .with_context("order claim lost")),
            Err(e) if matches!(e.kind, DatabaseErrorKind::NotFound { .. }) => {
                Err(AppError::domain(DomainError::OrderNotFound {
                    order_id: order_id.to_string(),
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release_claim(&self, order_id: Uuid) {
        if let Err(e) = self.orders.release_claim(order_id).await {
            error!(order_id = %order_id, error = %e, "failed to release order claim");
        }
    }

    async fn load_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.payments.find_by_id(payment_id).await?.ok_or_else(|| {
            AppError::domain(DomainError::PaymentNotFound {
                payment_id: payment_id.to_string(),
            })
        })
    }

    async fn payment_for_charge(&self, charge_id: &str) -> AppResult<Payment> {
        self.payments
            .find_by_gateway_charge_id(charge_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::PaymentNotFound {
                    payment_id: charge_id.to_string(),
                })
            })
    }
}
