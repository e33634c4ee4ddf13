//! Diff-save of a single interview answer under optimistic concurrency.
//!
//! A save names the `updated_at` token the caller last saw. The write goes
//! through only if that token is still current; otherwise the caller gets
//! the full current row back and nothing is written.

use crate::domain::answer::{validate_question_id, AnswerLimits, AnswerPatch};
use crate::domain::caller::Caller;
use crate::domain::error::{AppError, Result};
use crate::domain::interview_session::{next_token, DiffSaveOutcome, SaveAttemptState};
use crate::domain::session_store::{ConditionalWrite, SessionStore};
use crate::infrastructure::event_log::{Audience, EventLog};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const SOURCE: &str = "DiffSave";

#[derive(Debug, Clone)]
pub struct DiffSaveCommand {
    pub session_id: String,
    pub question_id: String,
    pub new_answer: Option<Value>,
    pub previous_updated_at: DateTime<Utc>,
}

pub struct DiffSaveUseCase {
    store: Arc<dyn SessionStore>,
    limits: AnswerLimits,
    events: EventLog,
}

impl DiffSaveUseCase {
    pub fn new(store: Arc<dyn SessionStore>, limits: AnswerLimits, events: EventLog) -> Self {
        Self {
            store,
            limits,
            events,
        }
    }

    pub async fn execute(&self, caller: &Caller, command: DiffSaveCommand) -> Result<DiffSaveOutcome> {
        validate_question_id(&command.question_id)?;
        let patch = AnswerPatch::from_client(command.new_answer, &self.limits)?;

        self.save_patch(
            caller,
            &command.session_id,
            &command.question_id,
            patch,
            command.previous_updated_at,
        )
        .await
    }

    /// Same as [`execute`](Self::execute) for an already validated patch.
    pub async fn save_patch(
        &self,
        caller: &Caller,
        session_id: &str,
        question_id: &str,
        patch: AnswerPatch,
        previous_updated_at: DateTime<Utc>,
    ) -> Result<DiffSaveOutcome> {
        validate_question_id(question_id)?;

        // Until the row is read, only the caller may see events about it.
        let mut trace = AttemptTrace {
            state: SaveAttemptState::Idle,
            audience: Audience::user(caller),
        };
        let result = self
            .attempt(caller, session_id, question_id, patch, previous_updated_at, &mut trace)
            .await;
        let AttemptTrace { state, audience } = trace;

        match &result {
            Ok(DiffSaveOutcome::Applied { version, .. }) => self.events.record(
                "INFO",
                SOURCE,
                audience,
                Some(session_id),
                Some(question_id),
                &format!("Answer saved (version {})", version),
            ),
            Ok(DiffSaveOutcome::Conflicted(latest)) => self.events.record(
                "WARN",
                SOURCE,
                audience,
                Some(session_id),
                Some(question_id),
                &format!(
                    "Conflict: caller held {}, current is version {}",
                    previous_updated_at, latest.version
                ),
            ),
            Err(err) if state == SaveAttemptState::Failed => self.events.record(
                "ERROR",
                SOURCE,
                audience,
                Some(session_id),
                Some(question_id),
                &format!("Save failed: {}", err),
            ),
            Err(_) => {}
        }

        debug!(session_id, question_id, state = ?state, "Diff-save attempt finished");
        result
    }

    async fn attempt(
        &self,
        caller: &Caller,
        session_id: &str,
        question_id: &str,
        patch: AnswerPatch,
        previous_updated_at: DateTime<Utc>,
        trace: &mut AttemptTrace,
    ) -> Result<DiffSaveOutcome> {
        trace.state = SaveAttemptState::Comparing;

        let current = self
            .store
            .find(session_id)
            .await
            .map_err(|err| fail(&mut trace.state, err))?
            .ok_or_else(|| not_found(session_id))?;
        caller.authorize(&current)?;
        trace.audience = Audience::from(&current);

        if current.updated_at != previous_updated_at {
            trace.state = SaveAttemptState::Conflicted;
            return Ok(DiffSaveOutcome::Conflicted(current.snapshot()));
        }

        let mut answers = current.answers.clone();
        patch.apply(&mut answers, question_id);
        let new_updated_at = next_token(current.updated_at);

        let applied = self
            .store
            .compare_and_write(&ConditionalWrite {
                session_id,
                expected_updated_at: current.updated_at,
                expected_version: current.version,
                answers: &answers,
                status: current.status,
                new_updated_at,
            })
            .await
            .map_err(|err| fail(&mut trace.state, err))?;

        if applied {
            trace.state = SaveAttemptState::Applied;
            return Ok(DiffSaveOutcome::Applied {
                updated_at: new_updated_at,
                version: current.version + 1,
            });
        }

        // Another writer got in between the read and the guarded write.
        let latest = self
            .store
            .find(session_id)
            .await
            .map_err(|err| fail(&mut trace.state, err))?
            .ok_or_else(|| not_found(session_id))?;
        trace.state = SaveAttemptState::Conflicted;
        Ok(DiffSaveOutcome::Conflicted(latest.snapshot()))
    }
}

struct AttemptTrace {
    state: SaveAttemptState,
    audience: Audience,
}

fn fail(state: &mut SaveAttemptState, err: AppError) -> AppError {
    *state = SaveAttemptState::Failed;
    err
}

fn not_found(session_id: &str) -> AppError {
    AppError::NotFound(format!("Interview session not found: {}", session_id))
}
