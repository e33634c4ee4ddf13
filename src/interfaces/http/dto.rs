use crate::domain::answer::QUESTION_ID_PATTERN;
use crate::domain::interview_session::{ContentType, SessionSnapshot, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DiffSaveRequest {
    #[validate(length(min = 1, max = 128), regex(path = *QUESTION_ID_PATTERN))]
    pub question_id: String,
    #[serde(default)]
    pub new_answer: Option<Value>,
    pub previous_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSaveResponse {
    pub ok: bool,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResponse {
    pub success: bool,
    pub code: String,
    pub latest: SessionSnapshot,
}

impl ConflictResponse {
    pub fn new(latest: SessionSnapshot) -> Self {
        Self {
            success: false,
            code: "conflict".to_string(),
            latest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub organization_id: Option<String>,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: SessionStatus,
    pub previous_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub organization_id: Option<String>,
    pub limit: Option<i64>,
}
