use crate::domain::answer::Answers;
use crate::domain::caller::Caller;
use crate::domain::error::{AppError, Result};
use crate::domain::interview_session::{
    next_token, token_now, ContentType, DiffSaveOutcome, InterviewSession, SessionStatus,
};
use crate::domain::session_store::{ConditionalWrite, SessionStore};
use crate::infrastructure::event_log::{Audience, EventLog};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

const SOURCE: &str = "InterviewSession";
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

pub struct InterviewSessionUseCase {
    store: Arc<dyn SessionStore>,
    events: EventLog,
}

impl InterviewSessionUseCase {
    pub fn new(store: Arc<dyn SessionStore>, events: EventLog) -> Self {
        Self { store, events }
    }

    pub async fn create_session(
        &self,
        caller: &Caller,
        organization_id: Option<String>,
        content_type: ContentType,
    ) -> Result<InterviewSession> {
        if let Some(organization_id) = &organization_id {
            if !caller.is_member_of(organization_id) {
                return Err(AppError::Forbidden(format!(
                    "Not a member of organization {}",
                    organization_id
                )));
            }
        }

        let now = token_now();
        let session = InterviewSession {
            id: Uuid::new_v4().to_string(),
            organization_id,
            user_id: caller.user_id.clone(),
            content_type,
            status: SessionStatus::Draft,
            answers: Answers::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&session).await?;
        self.events.record(
            "INFO",
            SOURCE,
            Audience::from(&session),
            Some(&session.id),
            None,
            &format!("Interview session created ({})", content_type.as_str()),
        );
        Ok(session)
    }

    pub async fn get_session(&self, caller: &Caller, session_id: &str) -> Result<InterviewSession> {
        let session = self.load(session_id).await?;
        caller.authorize(&session)?;
        Ok(session)
    }

    pub async fn list_sessions(
        &self,
        caller: &Caller,
        organization_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<InterviewSession>> {
        if let Some(organization_id) = organization_id {
            if !caller.is_member_of(organization_id) {
                return Err(AppError::Forbidden(format!(
                    "Not a member of organization {}",
                    organization_id
                )));
            }
        }

        let limit = match limit {
            Some(value) if value > 0 => value.min(MAX_LIST_LIMIT),
            _ => DEFAULT_LIST_LIMIT,
        };
        self.store
            .list_visible(&caller.user_id, &caller.organization_ids, organization_id, limit)
            .await
    }

    /// Moves the session along its lifecycle, guarded by the same token as
    /// answer saves.
    pub async fn transition_status(
        &self,
        caller: &Caller,
        session_id: &str,
        status: SessionStatus,
        previous_updated_at: DateTime<Utc>,
    ) -> Result<DiffSaveOutcome> {
        let current = self.load(session_id).await?;
        caller.authorize(&current)?;

        if current.updated_at != previous_updated_at {
            return Ok(DiffSaveOutcome::Conflicted(current.snapshot()));
        }
        if !current.status.can_transition_to(status) {
            return Err(AppError::ValidationError(format!(
                "Cannot move session from {} to {}",
                current.status, status
            )));
        }

        let new_updated_at = next_token(current.updated_at);
        let applied = self
            .store
            .compare_and_write(&ConditionalWrite {
                session_id,
                expected_updated_at: current.updated_at,
                expected_version: current.version,
                answers: &current.answers,
                status,
                new_updated_at,
            })
            .await?;

        if !applied {
            let latest = self.load(session_id).await?;
            return Ok(DiffSaveOutcome::Conflicted(latest.snapshot()));
        }

        self.events.record(
            "INFO",
            SOURCE,
            Audience::from(&current),
            Some(session_id),
            None,
            &format!("Status changed {} -> {}", current.status, status),
        );
        Ok(DiffSaveOutcome::Applied {
            updated_at: new_updated_at,
            version: current.version + 1,
        })
    }

    pub async fn delete_session(&self, caller: &Caller, session_id: &str) -> Result<()> {
        let session = self.load(session_id).await?;
        caller.authorize(&session)?;

        if !self.store.soft_delete(session_id).await? {
            return Err(AppError::NotFound(format!(
                "Interview session not found: {}",
                session_id
            )));
        }
        self.events.record(
            "INFO",
            SOURCE,
            Audience::from(&session),
            Some(session_id),
            None,
            "Interview session deleted",
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<InterviewSession> {
        self.store.find(session_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Interview session not found: {}", session_id))
        })
    }
}
