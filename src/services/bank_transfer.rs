//! Bank-transfer submissions: validated slip image, stored object, pending payment.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::repository::PaymentRepository;
use crate::error::AppResult;
use crate::models::{NewPayment, PaymentStatus, PaymentType};
use crate::services::notification::{dispatch, NotificationType, PaymentNotification, PaymentNotifier};
use crate::uploads::image_validator::ImageValidator;
use crate::uploads::storage::{SlipStorage, SlipUpload};
use crate::uploads::UploadedFile;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BankTransferSubmission {
    pub payment_id: Uuid,
    pub slip_url: String,
    pub status: PaymentStatus,
}

pub struct BankTransferProcessor {
    validator: ImageValidator,
    storage: Arc<dyn SlipStorage>,
    payments: Arc<dyn PaymentRepository>,
    notifier: Arc<dyn PaymentNotifier>,
    folder: String,
    currency: String,
}

impl BankTransferProcessor {
    pub fn new(
        validator: ImageValidator,
        storage: Arc<dyn SlipStorage>,
        payments: Arc<dyn PaymentRepository>,
        notifier: Arc<dyn PaymentNotifier>,
        folder: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            validator,
            storage,
            payments,
            notifier,
            folder: folder.into(),
            currency: currency.into(),
        }
    }

    /// The slip is validated before anything is uploaded or written.
    pub async fn submit(
        &self,
        file: &UploadedFile,
        order_id: Uuid,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> AppResult<BankTransferSubmission> {
        let image = self.validator.validate(file).map_err(|e| {
            warn!(
                order_id = %order_id,
                user_id = %user_id,
                step = "validate_slip",
                file_name = %file.file_name,
                error = %e,
                "payment slip rejected"
            );
            e
        })?;

        let stored = self
            .storage
            .upload(SlipUpload {
                folder: self.folder.clone(),
                order_id,
                extension: image.format.extension().to_string(),
                content_type: image.format.mime_type().to_string(),
                bytes: file.bytes.clone(),
            })
            .await
            .map_err(|e| {
                warn!(order_id = %order_id, step = "upload_slip", error = %e, "payment slip upload failed");
                e
            })?;

        let payment = self
            .payments
            .create(NewPayment {
                order_id,
                user_id,
                payment_type: PaymentType::BankTransfer,
                status: PaymentStatus::Pending,
                amount: amount.clone(),
                currency: self.currency.clone(),
                gateway_charge_id: None,
                slip_url: Some(stored.url.clone()),
                failure_reason: None,
            })
            .await?;

        info!(
            payment_id = %payment.id,
            order_id = %order_id,
            user_id = %user_id,
            path = %stored.path,
            "bank transfer submitted for review"
        );

        dispatch(
            self.notifier.clone(),
            PaymentNotification::for_payment(NotificationType::BankTransferSubmitted, &payment),
        );

        Ok(BankTransferSubmission {
            payment_id: payment.id,
            slip_url: stored.url,
            status: payment.status,
        })
    }
}
