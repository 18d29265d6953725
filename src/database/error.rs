//! Database error types shared by the Postgres and in-memory repositories

use crate::error::{AppError, InfrastructureError};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    UniqueViolation { constraint: String },
    ConnectionFailed { message: String },
    PoolExhausted,
    /// A stored value could not be mapped back to a domain type
    InvalidData { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::InvalidData {
            message: message.into(),
        })
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseErrorKind::ConnectionFailed {
                message: e.to_string(),
            },
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DatabaseErrorKind::UniqueViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseErrorKind::InvalidData {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self::new(kind)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionFailed { .. } | DatabaseErrorKind::PoolExhausted
        )
    }
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseErrorKind::NotFound { entity, id } => write!(f, "{} not found: {}", entity, id),
            DatabaseErrorKind::UniqueViolation { constraint } => {
                write!(f, "unique constraint violated: {}", constraint)
            }
            DatabaseErrorKind::ConnectionFailed { message } => {
                write!(f, "database connection failed: {}", message)
            }
            DatabaseErrorKind::PoolExhausted => write!(f, "database pool exhausted"),
            DatabaseErrorKind::InvalidData { message } => write!(f, "invalid stored data: {}", message),
            DatabaseErrorKind::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::infrastructure(InfrastructureError::Database {
            is_retryable: err.is_retryable(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        let err = DatabaseError::new(DatabaseErrorKind::ConnectionFailed {
            message: "reset by peer".to_string(),
        });
        assert!(err.is_retryable());
        assert!(!DatabaseError::not_found("Order", "x").is_retryable());
    }

    #[test]
    fn converts_to_infrastructure_app_error() {
        let app: AppError = DatabaseError::new(DatabaseErrorKind::PoolExhausted).into();
        assert_eq!(app.status_code(), 500);
        assert!(app.is_retryable());
    }
}
