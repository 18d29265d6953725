//! Unified error handling for the payment backend
//!
//! Every failure a client can observe is resolved to a closed [`ErrorCode`]
//! with a stable dotted name, an HTTP status and a user-facing message.
//! Internal details (gateway payloads, SQL errors) stay in the logs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::payments::error::CardErrorKind;
use crate::uploads::image_validator::ImageError;

/// Stable error codes, grouped per domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Orders
    #[serde(rename = "ORDER.NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "ORDER.ACCESS_DENIED")]
    OrderAccessDenied,
    #[serde(rename = "ORDER.ALREADY_PROCESSED")]
    OrderAlreadyProcessed,
    #[serde(rename = "ORDER.EMPTY")]
    OrderEmpty,

    // Payments
    #[serde(rename = "PAYMENT.BELOW_MINIMUM_AMOUNT")]
    BelowMinimumAmount,
    #[serde(rename = "PAYMENT.NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "PAYMENT.ALREADY_PROCESSED")]
    PaymentAlreadyProcessed,
    #[serde(rename = "PAYMENT.INVALID_PAYMENT_TYPE")]
    InvalidPaymentType,
    #[serde(rename = "PAYMENT.APPROVAL_REASON_REQUIRED")]
    ApprovalReasonRequired,
    #[serde(rename = "PAYMENT.INVALID_CARD")]
    InvalidCard,
    #[serde(rename = "PAYMENT.EXPIRED_CARD")]
    ExpiredCard,
    #[serde(rename = "PAYMENT.INVALID_CVV")]
    InvalidCvv,
    #[serde(rename = "PAYMENT.INSUFFICIENT_FUND")]
    InsufficientFund,
    #[serde(rename = "PAYMENT.CARD_DECLINED")]
    CardDeclined,
    #[serde(rename = "PAYMENT.GATEWAY_ERROR")]
    GatewayError,

    // Slip uploads
    #[serde(rename = "UPLOAD.BAD_SIGNATURE")]
    BadSignature,
    #[serde(rename = "UPLOAD.FILE_TOO_SMALL")]
    FileTooSmall,
    #[serde(rename = "UPLOAD.FILE_TOO_LARGE")]
    FileTooLarge,
    #[serde(rename = "UPLOAD.PROCESSING_FAILED")]
    ImageProcessingFailed,
    #[serde(rename = "UPLOAD.FORMAT_MISMATCH")]
    FormatMismatch,
    #[serde(rename = "UPLOAD.STORAGE_ERROR")]
    StorageError,

    // Enrollments
    #[serde(rename = "ENROLLMENT.RECONCILIATION_FAILED")]
    ReconciliationFailed,

    // Generic
    #[serde(rename = "COMMON.UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "COMMON.FORBIDDEN")]
    Forbidden,
    #[serde(rename = "COMMON.VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "COMMON.DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "COMMON.CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "COMMON.INTERNAL_ERROR")]
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::OrderNotFound => "ORDER.NOT_FOUND",
            ErrorCode::OrderAccessDenied => "ORDER.ACCESS_DENIED",
            ErrorCode::OrderAlreadyProcessed => "ORDER.ALREADY_PROCESSED",
            ErrorCode::OrderEmpty => "ORDER.EMPTY",
            ErrorCode::BelowMinimumAmount => "PAYMENT.BELOW_MINIMUM_AMOUNT",
            ErrorCode::PaymentNotFound => "PAYMENT.NOT_FOUND",
            ErrorCode::PaymentAlreadyProcessed => "PAYMENT.ALREADY_PROCESSED",
            ErrorCode::InvalidPaymentType => "PAYMENT.INVALID_PAYMENT_TYPE",
            ErrorCode::ApprovalReasonRequired => "PAYMENT.APPROVAL_REASON_REQUIRED",
            ErrorCode::InvalidCard => "PAYMENT.INVALID_CARD",
            ErrorCode::ExpiredCard => "PAYMENT.EXPIRED_CARD",
            ErrorCode::InvalidCvv => "PAYMENT.INVALID_CVV",
            ErrorCode::InsufficientFund => "PAYMENT.INSUFFICIENT_FUND",
            ErrorCode::CardDeclined => "PAYMENT.CARD_DECLINED",
            ErrorCode::GatewayError => "PAYMENT.GATEWAY_ERROR",
            ErrorCode::BadSignature => "UPLOAD.BAD_SIGNATURE",
            ErrorCode::FileTooSmall => "UPLOAD.FILE_TOO_SMALL",
            ErrorCode::FileTooLarge => "UPLOAD.FILE_TOO_LARGE",
            ErrorCode::ImageProcessingFailed => "UPLOAD.PROCESSING_FAILED",
            ErrorCode::FormatMismatch => "UPLOAD.FORMAT_MISMATCH",
            ErrorCode::StorageError => "UPLOAD.STORAGE_ERROR",
            ErrorCode::ReconciliationFailed => "ENROLLMENT.RECONCILIATION_FAILED",
            ErrorCode::Unauthorized => "COMMON.UNAUTHORIZED",
            ErrorCode::Forbidden => "COMMON.FORBIDDEN",
            ErrorCode::ValidationError => "COMMON.VALIDATION_ERROR",
            ErrorCode::DatabaseError => "COMMON.DATABASE_ERROR",
            ErrorCode::ConfigurationError => "COMMON.CONFIGURATION_ERROR",
            ErrorCode::InternalError => "COMMON.INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure kind, independent of the concrete code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    AccessDenied,
    InvalidState,
    ValidationFailed,
    GatewayError,
    InfrastructureError,
}

/// Business rule violations on orders and payments
#[derive(Debug, Clone)]
pub enum DomainError {
    OrderNotFound { order_id: String },
    /// The order belongs to another user
    AccessDenied { order_id: String },
    /// The order is no longer payable
    OrderAlreadyProcessed { order_id: String },
    PaymentNotFound { payment_id: String },
    /// The payment already reached a terminal state
    PaymentAlreadyProcessed { payment_id: String },
    InvalidPaymentType {
        payment_id: String,
        expected: String,
    },
    /// Missing or wrong shared secret / identity
    Unauthorized { reason: String },
    /// Authenticated, but the role does not allow the operation
    Forbidden { reason: String },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    OrderEmpty { order_id: String },
    BelowMinimumAmount { amount: String, minimum: String },
    ApprovalReasonRequired,
    Image(ImageError),
    MissingField { field: String },
    InvalidField { field: String, reason: String },
}

/// Failures reported by the card gateway or object storage
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// The gateway rejected the card itself
    Card { kind: CardErrorKind, message: String },
    Gateway { message: String, is_retryable: bool },
    Storage { message: String },
}

/// Infrastructure-level errors
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
    /// One or more enrollment tasks failed after the payment was confirmed
    Reconciliation { failures: Vec<String> },
    Internal { message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Validation(ValidationError),
    External(ExternalError),
    Infrastructure(InfrastructureError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn external(err: ExternalError) -> Self {
        Self::new(AppErrorKind::External(err))
    }

    pub fn infrastructure(err: InfrastructureError) -> Self {
        Self::new(AppErrorKind::Infrastructure(err))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } | DomainError::PaymentNotFound { .. } => {
                    ErrorCategory::NotFound
                }
                DomainError::AccessDenied { .. }
                | DomainError::Unauthorized { .. }
                | DomainError::Forbidden { .. } => ErrorCategory::AccessDenied,
                DomainError::OrderAlreadyProcessed { .. }
                | DomainError::PaymentAlreadyProcessed { .. }
                | DomainError::InvalidPaymentType { .. } => ErrorCategory::InvalidState,
            },
            AppErrorKind::Validation(_) => ErrorCategory::ValidationFailed,
            AppErrorKind::External(err) => match err {
                ExternalError::Card { .. } | ExternalError::Gateway { .. } => {
                    ErrorCategory::GatewayError
                }
                ExternalError::Storage { .. } => ErrorCategory::InfrastructureError,
            },
            AppErrorKind::Infrastructure(_) => ErrorCategory::InfrastructureError,
        }
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => 404,
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::AccessDenied { .. } => 403,
                DomainError::Unauthorized { .. } => 401,
                DomainError::Forbidden { .. } => 403,
                DomainError::OrderAlreadyProcessed { .. } => 409, // Conflict
                DomainError::PaymentAlreadyProcessed { .. } => 409,
                DomainError::InvalidPaymentType { .. } => 422,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::Image(ImageError::TooLarge { .. }) => 413,
                ValidationError::Image(ImageError::ProcessingFailed { .. }) => 422,
                _ => 400,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Card { .. } => 402, // Payment Required
                ExternalError::Gateway { .. } => 502, // Bad Gateway
                ExternalError::Storage { .. } => 502,
            },
            AppErrorKind::Infrastructure(_) => 500,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::AccessDenied { .. } => ErrorCode::OrderAccessDenied,
                DomainError::OrderAlreadyProcessed { .. } => ErrorCode::OrderAlreadyProcessed,
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::PaymentAlreadyProcessed { .. } => ErrorCode::PaymentAlreadyProcessed,
                DomainError::InvalidPaymentType { .. } => ErrorCode::InvalidPaymentType,
                DomainError::Unauthorized { .. } => ErrorCode::Unauthorized,
                DomainError::Forbidden { .. } => ErrorCode::Forbidden,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::OrderEmpty { .. } => ErrorCode::OrderEmpty,
                ValidationError::BelowMinimumAmount { .. } => ErrorCode::BelowMinimumAmount,
                ValidationError::ApprovalReasonRequired => ErrorCode::ApprovalReasonRequired,
                ValidationError::Image(image) => match image {
                    ImageError::BadSignature { .. } => ErrorCode::BadSignature,
                    ImageError::TooSmall { .. } => ErrorCode::FileTooSmall,
                    ImageError::TooLarge { .. } => ErrorCode::FileTooLarge,
                    ImageError::ProcessingFailed { .. } => ErrorCode::ImageProcessingFailed,
                    ImageError::FormatMismatch { .. } => ErrorCode::FormatMismatch,
                },
                ValidationError::MissingField { .. } | ValidationError::InvalidField { .. } => {
                    ErrorCode::ValidationError
                }
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Card { kind, .. } => kind.error_code(),
                ExternalError::Gateway { .. } => ErrorCode::GatewayError,
                ExternalError::Storage { .. } => ErrorCode::StorageError,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::Reconciliation { .. } => ErrorCode::ReconciliationFailed,
                InfrastructureError::Internal { .. } => ErrorCode::InternalError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { order_id } => {
                    format!("Order '{}' not found", order_id)
                }
                DomainError::AccessDenied { .. } => {
                    "You do not have access to this order".to_string()
                }
                DomainError::OrderAlreadyProcessed { order_id } => {
                    format!("Order '{}' has already been processed", order_id)
                }
                DomainError::PaymentNotFound { payment_id } => {
                    format!("Payment '{}' not found", payment_id)
                }
                DomainError::PaymentAlreadyProcessed { payment_id } => {
                    format!("Payment '{}' has already been processed", payment_id)
                }
                DomainError::InvalidPaymentType { expected, .. } => {
                    format!("This operation is only available for {} payments", expected)
                }
                DomainError::Unauthorized { .. } => "Unauthorized".to_string(),
                DomainError::Forbidden { .. } => {
                    "You are not allowed to perform this operation".to_string()
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::OrderEmpty { .. } => "Order has no items to pay for".to_string(),
                ValidationError::BelowMinimumAmount { minimum, .. } => {
                    format!("Order total is below the minimum chargeable amount of {}", minimum)
                }
                ValidationError::ApprovalReasonRequired => {
                    "A reason is required when rejecting a payment".to_string()
                }
                ValidationError::Image(image) => match image {
                    ImageError::BadSignature { .. } => {
                        "Uploaded file content does not match its declared image type".to_string()
                    }
                    ImageError::TooSmall { detail } => format!("Uploaded image is too small: {}", detail),
                    ImageError::TooLarge { detail } => format!("Uploaded image is too large: {}", detail),
                    ImageError::ProcessingFailed { .. } => {
                        "Uploaded image could not be processed".to_string()
                    }
                    ImageError::FormatMismatch { detail } => {
                        format!("Unsupported or mismatched image format: {}", detail)
                    }
                },
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Card { kind, .. } => match kind {
                    CardErrorKind::InvalidCard => "The card details are invalid".to_string(),
                    CardErrorKind::ExpiredCard => "The card has expired".to_string(),
                    CardErrorKind::InvalidCvv => "The card security code is invalid".to_string(),
                    CardErrorKind::InsufficientFunds => {
                        "Insufficient funds to complete payment".to_string()
                    }
                    CardErrorKind::Declined => "The card was declined".to_string(),
                },
                ExternalError::Gateway { is_retryable, .. } => {
                    if *is_retryable {
                        "Payment gateway is temporarily unavailable. Please try again".to_string()
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::Storage { .. } => {
                    "Could not store the uploaded file. Please try again".to_string()
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) | AppErrorKind::Validation(_) => false,
            AppErrorKind::External(err) => match err {
                ExternalError::Card { .. } => false,
                ExternalError::Gateway { is_retryable, .. } => *is_retryable,
                ExternalError::Storage { .. } => true,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::Reconciliation { .. } => true,
                InfrastructureError::Internal { .. } => false,
            },
        }
    }

    /// Internal detail for logs; never sent to clients.
    pub fn internal_detail(&self) -> Option<String> {
        match &self.kind {
            AppErrorKind::External(ExternalError::Card { message, .. })
            | AppErrorKind::External(ExternalError::Gateway { message, .. })
            | AppErrorKind::External(ExternalError::Storage { message })
            | AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. })
            | AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            | AppErrorKind::Infrastructure(InfrastructureError::Internal { message }) => {
                Some(message.clone())
            }
            AppErrorKind::Infrastructure(InfrastructureError::Reconciliation { failures }) => {
                Some(failures.join("; "))
            }
            AppErrorKind::Validation(ValidationError::Image(ImageError::ProcessingFailed {
                message,
            })) => Some(message.clone()),
            AppErrorKind::Domain(DomainError::Unauthorized { reason })
            | AppErrorKind::Domain(DomainError::Forbidden { reason }) => Some(reason.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        AppError::validation(ValidationError::Image(err))
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_fund_maps_to_stable_code() {
        let error = AppError::external(ExternalError::Card {
            kind: CardErrorKind::InsufficientFunds,
            message: "insufficient funds in the account".to_string(),
        });

        assert_eq!(error.status_code(), 402);
        assert_eq!(error.error_code(), ErrorCode::InsufficientFund);
        assert_eq!(error.error_code().as_str(), "PAYMENT.INSUFFICIENT_FUND");
        assert_eq!(error.category(), ErrorCategory::GatewayError);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_order_already_processed_is_invalid_state() {
        let error = AppError::domain(DomainError::OrderAlreadyProcessed {
            order_id: "o1".to_string(),
        });

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::OrderAlreadyProcessed);
        assert_eq!(error.category(), ErrorCategory::InvalidState);
        assert!(error.user_message().contains("o1"));
    }

    #[test]
    fn test_validation_errors_are_400_and_not_retryable() {
        let error = AppError::validation(ValidationError::BelowMinimumAmount {
            amount: "10".to_string(),
            minimum: "20".to_string(),
        });

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::BelowMinimumAmount);
        assert_eq!(error.category(), ErrorCategory::ValidationFailed);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_infrastructure_errors_hide_internal_messages() {
        let error = AppError::infrastructure(InfrastructureError::Database {
            message: "relation \"payments\" does not exist".to_string(),
            is_retryable: false,
        });

        assert_eq!(error.status_code(), 500);
        assert!(!error.user_message().contains("relation"));
        assert!(error.internal_detail().unwrap().contains("relation"));
    }

    #[test]
    fn test_error_code_serializes_as_dotted_name() {
        let json = serde_json::to_string(&ErrorCode::ApprovalReasonRequired).unwrap();
        assert_eq!(json, "\"PAYMENT.APPROVAL_REASON_REQUIRED\"");
        assert_eq!(
            ErrorCode::ApprovalReasonRequired.as_str(),
            "PAYMENT.APPROVAL_REASON_REQUIRED"
        );
    }

    #[test]
    fn test_image_error_conversion() {
        let error: AppError = ImageError::TooLarge {
            detail: "6000000 bytes".to_string(),
        }
        .into();
        assert_eq!(error.status_code(), 413);
        assert_eq!(error.error_code(), ErrorCode::FileTooLarge);
    }
}
