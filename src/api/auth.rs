//! Caller identity, as forwarded by the upstream authentication layer.

use axum::extract::FromRequestParts;
use http::request::Parts;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, DomainError};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Admin,
}

impl UserRole {
    fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("admin") => UserRole::Admin,
            _ => UserRole::Student,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(AppError::domain(DomainError::Forbidden {
                reason: format!("user {} is not an admin", self.user_id),
            }))
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());

        let raw_user_id = header(USER_ID_HEADER).ok_or_else(|| {
            AppError::domain(DomainError::Unauthorized {
                reason: format!("missing {} header", USER_ID_HEADER),
            })
        })?;
        let user_id = Uuid::parse_str(raw_user_id.trim()).map_err(|_| {
            AppError::domain(DomainError::Unauthorized {
                reason: format!("malformed {} header", USER_ID_HEADER),
            })
        })?;

        Ok(Self {
            user_id,
            role: UserRole::from_header(header(USER_ROLE_HEADER)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use http::Request;

    async fn extract(builder: http::request::Builder) -> Result<AuthenticatedUser, AppError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_user_and_role() {
        let user_id = Uuid::new_v4();
        let user = extract(
            Request::builder()
                .header(USER_ID_HEADER, user_id.to_string())
                .header(USER_ROLE_HEADER, "Admin"),
        )
        .await
        .unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.role, UserRole::Admin);
        assert!(user.require_admin().is_ok());
    }

    #[tokio::test]
    async fn missing_role_defaults_to_student() {
        let user = extract(Request::builder().header(USER_ID_HEADER, Uuid::new_v4().to_string()))
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::Student);
        assert_eq!(user.require_admin().unwrap_err().error_code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn missing_or_malformed_user_is_unauthorized() {
        let err = extract(Request::builder()).await.unwrap_err();
        assert_eq!(err.status_code(), 401);

        let err = extract(Request::builder().header(USER_ID_HEADER, "not-a-uuid"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Unauthorized);
    }
}
