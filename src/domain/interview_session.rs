use crate::domain::answer::Answers;
use crate::domain::error::{AppError, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Service,
    Product,
    Faq,
    CaseStudy,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Service => "service",
            ContentType::Product => "product",
            ContentType::Faq => "faq",
            ContentType::CaseStudy => "case_study",
        }
    }
}

impl FromStr for ContentType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "service" => Ok(ContentType::Service),
            "product" => Ok(ContentType::Product),
            "faq" => Ok(ContentType::Faq),
            "case_study" => Ok(ContentType::CaseStudy),
            other => Err(AppError::ValidationError(format!(
                "Unknown content type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Draft,
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Draft => "draft",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Draft, SessionStatus::InProgress)
                | (SessionStatus::Draft, SessionStatus::Completed)
                | (SessionStatus::InProgress, SessionStatus::Completed)
        )
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "draft" => Ok(SessionStatus::Draft),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(AppError::ValidationError(format!(
                "Unknown session status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    pub id: String,
    pub organization_id: Option<String>,
    pub user_id: String,
    pub content_type: ContentType,
    pub status: SessionStatus,
    pub answers: Answers,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            version: self.version,
            updated_at: self.updated_at,
            answers: self.answers.clone(),
        }
    }
}

/// The full current row handed to a losing writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub answers: Answers,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffSaveOutcome {
    Applied {
        updated_at: DateTime<Utc>,
        version: i64,
    },
    Conflicted(SessionSnapshot),
}

/// Progress of a single save attempt. `Failed` is the only retryable end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAttemptState {
    Idle,
    Comparing,
    Applied,
    Conflicted,
    Failed,
}

/// Timestamps are kept at microsecond precision so they survive a trip
/// through the database and the wire unchanged.
pub fn token_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next concurrency token after `previous`. Never equal to or before it, even
/// when the clock has not ticked or has moved backwards.
pub fn next_token(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = token_now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

pub fn format_token(token: &DateTime<Utc>) -> String {
    token.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn parse_token(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|token| token.with_timezone(&Utc))
        .map_err(|e| AppError::ValidationError(format!("Invalid timestamp {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_token_is_strictly_increasing() {
        let future = token_now() + Duration::seconds(30);
        let next = next_token(future);
        assert_eq!(next, future + Duration::microseconds(1));

        let past = token_now() - Duration::seconds(30);
        assert!(next_token(past) > past);
    }

    #[test]
    fn test_token_text_roundtrip() {
        let token = token_now();
        assert_eq!(parse_token(&format_token(&token)).unwrap(), token);
    }

    #[test]
    fn test_offset_spellings_compare_equal() {
        let zulu = parse_token("2026-10-17T09:30:00.123456Z").unwrap();
        let offset = parse_token("2026-10-17T11:30:00.123456+02:00").unwrap();
        assert_eq!(zulu, offset);
    }

    #[test]
    fn test_status_transitions() {
        assert!(SessionStatus::Draft.can_transition_to(SessionStatus::InProgress));
        assert!(SessionStatus::InProgress.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Draft));
        assert!(!SessionStatus::InProgress.can_transition_to(SessionStatus::Draft));
    }

    #[test]
    fn test_content_type_parse() {
        assert_eq!("case_study".parse::<ContentType>().unwrap(), ContentType::CaseStudy);
        assert!("blog".parse::<ContentType>().is_err());
    }
}
