use crate::domain::answer::Answers;
use crate::domain::error::Result;
use crate::domain::interview_session::{InterviewSession, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A guarded row replacement: applied only if the row still carries
/// `expected_updated_at` and `expected_version`.
#[derive(Debug, Clone)]
pub struct ConditionalWrite<'a> {
    pub session_id: &'a str,
    pub expected_updated_at: DateTime<Utc>,
    pub expected_version: i64,
    pub answers: &'a Answers,
    pub status: SessionStatus,
    pub new_updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &InterviewSession) -> Result<()>;

    /// Soft-deleted rows are reported as absent.
    async fn find(&self, session_id: &str) -> Result<Option<InterviewSession>>;

    /// Personal sessions of `user_id` plus sessions of any listed
    /// organization, newest first. `organization_id` narrows to one org.
    async fn list_visible(
        &self,
        user_id: &str,
        organization_ids: &[String],
        organization_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<InterviewSession>>;

    /// Single atomic compare-and-write. Bumps the version by one when applied.
    /// Returns `false` when the guard did not match and nothing was written.
    async fn compare_and_write(&self, write: &ConditionalWrite<'_>) -> Result<bool>;

    async fn soft_delete(&self, session_id: &str) -> Result<bool>;
}
