use crate::domain::caller::Caller;
use crate::domain::interview_session::InterviewSession;
use chrono::Local;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

const MAX_ENTRIES: usize = 100;

/// Who may read an entry back through the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Process-level events carrying no tenant data.
    System,
    Organization(String),
    User(String),
}

impl Audience {
    pub fn user(caller: &Caller) -> Self {
        Audience::User(caller.user_id.clone())
    }

    pub fn visible_to(&self, caller: &Caller) -> bool {
        match self {
            Audience::System => true,
            Audience::Organization(organization_id) => caller.is_member_of(organization_id),
            Audience::User(user_id) => *user_id == caller.user_id,
        }
    }
}

impl From<&InterviewSession> for Audience {
    fn from(session: &InterviewSession) -> Self {
        match &session.organization_id {
            Some(organization_id) => Audience::Organization(organization_id.clone()),
            None => Audience::User(session.user_id.clone()),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(skip)]
    pub audience: Audience,
}

/// Bounded buffer of recent save events, mirrored to `tracing`.
///
/// Recording never fails the caller: a poisoned buffer just drops the entry.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        level: &str,
        source: &str,
        audience: Audience,
        session_id: Option<&str>,
        question_id: Option<&str>,
        message: &str,
    ) {
        match level {
            "ERROR" => error!(source, session_id, question_id, "{}", message),
            "WARN" => warn!(source, session_id, question_id, "{}", message),
            _ => info!(source, session_id, question_id, "{}", message),
        }

        let entry = LogEntry {
            time: Local::now().format("%H:%M:%S").to_string(),
            level: level.to_string(),
            source: source.to_string(),
            message: message.to_string(),
            session_id: session_id.map(str::to_string),
            question_id: question_id.map(str::to_string),
            audience,
        };

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
            if entries.len() > MAX_ENTRIES {
                entries.remove(0);
            }
        }
    }

    pub fn info(&self, source: &str, message: &str) {
        self.record("INFO", source, Audience::System, None, None, message);
    }

    /// Entries the caller is allowed to see, oldest first.
    pub fn snapshot_for(&self, caller: &Caller) -> Vec<LogEntry> {
        self.snapshot()
            .into_iter()
            .filter(|entry| entry.audience.visible_to(caller))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}
