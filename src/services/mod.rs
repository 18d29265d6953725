//! Services module for payment business logic

pub mod bank_transfer;
pub mod card_charge;
pub mod enrollment_reconciler;
pub mod notification;
pub mod payment_orchestrator;
pub mod payment_validation;

pub use bank_transfer::{BankTransferProcessor, BankTransferSubmission};
pub use card_charge::{CardChargeProcessor, ChargeResult, ChargeStatusView, RecordedCharge};
pub use enrollment_reconciler::{EnrollmentReconciler, ReconcileOutcome};
pub use notification::{PaymentNotification, PaymentNotifier};
pub use payment_orchestrator::{ApprovalResult, ChargeSyncResult, PaymentOrchestrator};
pub use payment_validation::{PaymentValidationService, ValidatedOrder};
