use crate::domain::answer::Answers;
use crate::domain::error::{AppError, Result};
use crate::domain::interview_session::{format_token, parse_token, InterviewSession};
use crate::domain::session_store::{ConditionalWrite, SessionStore};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

const SESSION_COLUMNS: &str = "id, organization_id, user_id, content_type, status, answers, version, created_at, updated_at";

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &InterviewSession) -> Result<()> {
        let answers = serde_json::to_string(&session.answers)
            .map_err(|e| AppError::Internal(format!("Failed to encode answers: {e}")))?;

        sqlx::query(
            "INSERT INTO interview_sessions (id, organization_id, user_id, content_type, status, answers, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.organization_id)
        .bind(&session.user_id)
        .bind(session.content_type.as_str())
        .bind(session.status.as_str())
        .bind(answers)
        .bind(session.version)
        .bind(format_token(&session.created_at))
        .bind(format_token(&session.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert interview session: {e}")))?;

        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<InterviewSession>> {
        let row = sqlx::query_as::<_, InterviewSessionEntity>(&format!(
            "SELECT {SESSION_COLUMNS} FROM interview_sessions WHERE id = ? AND deleted_at IS NULL"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch interview session: {e}")))?;

        row.map(InterviewSession::try_from).transpose()
    }

    async fn list_visible(
        &self,
        user_id: &str,
        organization_ids: &[String],
        organization_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<InterviewSession>> {
        let memberships = serde_json::to_string(organization_ids)
            .map_err(|e| AppError::Internal(format!("Failed to encode memberships: {e}")))?;

        let rows = sqlx::query_as::<_, InterviewSessionEntity>(&format!(
            "SELECT {SESSION_COLUMNS} FROM interview_sessions
             WHERE deleted_at IS NULL
               AND ((organization_id IS NULL AND user_id = ?)
                    OR organization_id IN (SELECT value FROM json_each(?)))
               AND (? IS NULL OR organization_id = ?)
             ORDER BY updated_at DESC
             LIMIT ?"
        ))
        .bind(user_id)
        .bind(memberships)
        .bind(organization_id)
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list interview sessions: {e}")))?;

        rows.into_iter().map(InterviewSession::try_from).collect()
    }

    async fn compare_and_write(&self, write: &ConditionalWrite<'_>) -> Result<bool> {
        let answers = serde_json::to_string(write.answers)
            .map_err(|e| AppError::Internal(format!("Failed to encode answers: {e}")))?;

        let result = sqlx::query(
            "UPDATE interview_sessions
             SET answers = ?, status = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND updated_at = ? AND version = ? AND deleted_at IS NULL",
        )
        .bind(answers)
        .bind(write.status.as_str())
        .bind(format_token(&write.new_updated_at))
        .bind(write.session_id)
        .bind(format_token(&write.expected_updated_at))
        .bind(write.expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to save interview session: {e}")))?;

        Ok(result.rows_affected() == 1)
    }

    async fn soft_delete(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE interview_sessions SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(format_token(&chrono::Utc::now()))
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to delete interview session: {e}")))?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct InterviewSessionEntity {
    id: String,
    organization_id: Option<String>,
    user_id: String,
    content_type: String,
    status: String,
    answers: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<InterviewSessionEntity> for InterviewSession {
    type Error = AppError;

    fn try_from(entity: InterviewSessionEntity) -> Result<Self> {
        let answers: Answers = serde_json::from_str(&entity.answers).map_err(|e| {
            AppError::DatabaseError(format!(
                "Corrupt answers for session {}: {e}",
                entity.id
            ))
        })?;

        Ok(Self {
            content_type: entity.content_type.parse()?,
            status: entity.status.parse()?,
            created_at: parse_token(&entity.created_at)?,
            updated_at: parse_token(&entity.updated_at)?,
            id: entity.id,
            organization_id: entity.organization_id,
            user_id: entity.user_id,
            answers,
            version: entity.version,
        })
    }
}
