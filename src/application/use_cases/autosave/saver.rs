use crate::application::use_cases::diff_save::DiffSaveUseCase;
use crate::domain::answer::AnswerPatch;
use crate::domain::caller::Caller;
use crate::domain::error::Result;
use crate::domain::interview_session::DiffSaveOutcome;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Where the autosave controller sends its diff-saves.
#[async_trait]
pub trait AnswerSaver: Send + Sync {
    async fn save_answer(
        &self,
        session_id: &str,
        question_id: &str,
        patch: &AnswerPatch,
        previous_updated_at: DateTime<Utc>,
    ) -> Result<DiffSaveOutcome>;
}

/// Saves straight through the use case, for callers living in the server
/// process.
pub struct LocalAnswerSaver {
    use_case: Arc<DiffSaveUseCase>,
    caller: Caller,
}

impl LocalAnswerSaver {
    pub fn new(use_case: Arc<DiffSaveUseCase>, caller: Caller) -> Self {
        Self { use_case, caller }
    }
}

#[async_trait]
impl AnswerSaver for LocalAnswerSaver {
    async fn save_answer(
        &self,
        session_id: &str,
        question_id: &str,
        patch: &AnswerPatch,
        previous_updated_at: DateTime<Utc>,
    ) -> Result<DiffSaveOutcome> {
        self.use_case
            .save_patch(
                &self.caller,
                session_id,
                question_id,
                patch.clone(),
                previous_updated_at,
            )
            .await
    }
}
