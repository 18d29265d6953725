use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::EnrollmentRepository;
use crate::models::Enrollment;

#[derive(Debug, Clone, sqlx::FromRow)]
struct EnrollmentRow {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    payment_id: Option<Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Enrollment {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            payment_id: row.payment_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Course enrollments in Postgres; `(user_id, course_id)` carries a unique constraint.
pub struct PgEnrollmentRepository {
    pool: PgPool,
}

impl PgEnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentRepository for PgEnrollmentRepository {
    async fn find_by_user_and_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, DatabaseError> {
        sqlx::query_as::<_, EnrollmentRow>(
            "SELECT id, user_id, course_id, payment_id, created_at, updated_at
             FROM enrollments
             WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Enrollment::from))
        .map_err(DatabaseError::from_sqlx)
    }

    async fn create(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        payment_id: Option<Uuid>,
    ) -> Result<Enrollment, DatabaseError> {
        sqlx::query_as::<_, EnrollmentRow>(
            "INSERT INTO enrollments (user_id, course_id, payment_id)
             VALUES ($1, $2, $3)
             RETURNING id, user_id, course_id, payment_id, created_at, updated_at",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await
        .map(Enrollment::from)
        .map_err(DatabaseError::from_sqlx)
    }

    async fn attach_payment(
        &self,
        enrollment_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Enrollment>, DatabaseError> {
        sqlx::query_as::<_, EnrollmentRow>(
            "UPDATE enrollments
             SET payment_id = $2, updated_at = NOW()
             WHERE id = $1 AND payment_id IS NULL
             RETURNING id, user_id, course_id, payment_id, created_at, updated_at",
        )
        .bind(enrollment_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Enrollment::from))
        .map_err(DatabaseError::from_sqlx)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Enrollment>, DatabaseError> {
        sqlx::query_as::<_, EnrollmentRow>(
            "SELECT id, user_id, course_id, payment_id, created_at, updated_at
             FROM enrollments
             WHERE user_id = $1
             ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(Enrollment::from).collect())
        .map_err(DatabaseError::from_sqlx)
    }
}
