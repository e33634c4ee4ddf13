use crate::domain::error::{AppError, Result};
use crate::domain::interview_session::InterviewSession;

/// Identity of the authenticated user making a request, with the
/// organizations they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub organization_ids: Vec<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, organization_ids: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_ids,
        }
    }

    pub fn is_member_of(&self, organization_id: &str) -> bool {
        self.organization_ids.iter().any(|id| id == organization_id)
    }

    /// Organization sessions are shared by all members; personal sessions
    /// belong to their creator only.
    pub fn authorize(&self, session: &InterviewSession) -> Result<()> {
        let allowed = match &session.organization_id {
            Some(organization_id) => self.is_member_of(organization_id),
            None => session.user_id == self.user_id,
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "No access to interview session {}",
                session.id
            )))
        }
    }
}
