use crate::application::use_cases::autosave::AnswerSaver;
use crate::domain::answer::AnswerPatch;
use crate::domain::caller::Caller;
use crate::domain::error::{AppError, Result};
use crate::domain::interview_session::{DiffSaveOutcome, InterviewSession};
use crate::interfaces::http::auth::{ORGANIZATION_IDS_HEADER, USER_ID_HEADER};
use crate::interfaces::http::dto::{ConflictResponse, DiffSaveResponse, ErrorResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::json;
use url::Url;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Talks to a remote AIO Hub server on behalf of one caller.
pub struct HttpAnswerSaver {
    client: reqwest::Client,
    base_url: Url,
    caller: Caller,
}

impl HttpAnswerSaver {
    pub fn new(base_url: &str, caller: Caller) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid server URL {}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(AppError::from)?;

        Ok(Self {
            client,
            base_url,
            caller,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::ConfigError(format!("Invalid request path {}: {}", path, e)))
    }

    fn with_identity(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(USER_ID_HEADER, &self.caller.user_id)
            .header(ORGANIZATION_IDS_HEADER, self.caller.organization_ids.join(","))
    }

    /// Initial read before handing the session to an autosave controller.
    pub async fn fetch_session(&self, session_id: &str) -> Result<InterviewSession> {
        let url = self.url(&format!("api/interview-sessions/{}", session_id))?;
        let response = self.with_identity(self.client.get(url)).send().await?;

        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        Err(error_from_response(response).await)
    }
}

#[async_trait]
impl AnswerSaver for HttpAnswerSaver {
    async fn save_answer(
        &self,
        session_id: &str,
        question_id: &str,
        patch: &AnswerPatch,
        previous_updated_at: DateTime<Utc>,
    ) -> Result<DiffSaveOutcome> {
        let url = self.url(&format!("api/interview-sessions/{}/answers", session_id))?;
        let body = json!({
            "questionId": question_id,
            "newAnswer": patch.to_wire(),
            "previousUpdatedAt": previous_updated_at,
        });

        let response = self
            .with_identity(self.client.patch(url))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let saved: DiffSaveResponse = response.json().await?;
                Ok(DiffSaveOutcome::Applied {
                    updated_at: saved.updated_at,
                    version: saved.version,
                })
            }
            StatusCode::CONFLICT => {
                let conflict: ConflictResponse = response.json().await?;
                Ok(DiffSaveOutcome::Conflicted(conflict.latest))
            }
            _ => Err(error_from_response(response).await),
        }
    }
}

async fn error_from_response(response: Response) -> AppError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.message,
        Err(_) => format!("Server responded with {}", status),
    };

    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::BAD_REQUEST => AppError::ValidationError(message),
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited {
            retry_after_seconds: retry_after.unwrap_or(1),
        },
        _ => AppError::TransportError(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::autosave::{AutosaveController, AutosaveStatus};
    use crate::domain::answer::AnswerValue;
    use crate::domain::interview_session::ContentType;
    use crate::infrastructure::config::AutosaveConfig;
    use crate::interfaces::http::{configure, tests::test_state, HttpState};
    use actix_web::{web, App, HttpServer};
    use std::sync::Arc;
    use std::time::Duration;

    async fn serve(state: web::Data<HttpState>) -> (String, actix_web::dev::ServerHandle) {
        let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://{}", addr), handle)
    }

    fn caller() -> Caller {
        Caller::new("u1", vec!["org-1".into()])
    }

    fn fast() -> AutosaveConfig {
        AutosaveConfig {
            debounce_ms: 50,
            saved_reset_ms: 50,
        }
    }

    fn text(value: &str) -> Option<AnswerValue> {
        Some(AnswerValue::Text(value.into()))
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let saver = HttpAnswerSaver::new("http://localhost:3001/hub", caller()).unwrap();
        assert_eq!(
            saver.url("api/interview-sessions/s1").unwrap().as_str(),
            "http://localhost:3001/hub/api/interview-sessions/s1"
        );
        assert!(HttpAnswerSaver::new("not a url", caller()).is_err());
    }

    #[actix_web::test]
    async fn test_two_tabs_autosave_over_http() {
        let state = test_state(1000).await;
        let session = state
            .sessions
            .create_session(&caller(), Some("org-1".into()), ContentType::Faq)
            .await
            .unwrap();
        let (base_url, handle) = serve(state.clone()).await;

        let saver = Arc::new(HttpAnswerSaver::new(&base_url, caller()).unwrap());
        let fetched = saver.fetch_session(&session.id).await.unwrap();
        let tab_a = AutosaveController::new(saver.clone(), fetched.snapshot(), fast());
        let tab_b = AutosaveController::new(saver.clone(), fetched.snapshot(), fast());

        tab_a.set_answer("q1", text("hello")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(tab_a.token().await.1, 1);

        // Tab B still holds the creation token.
        tab_b.set_answer("q2", text("x")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(tab_b.status(), AutosaveStatus::Conflict);
        let latest = tab_b.conflict().await.unwrap();
        assert_eq!(latest.version, 1);
        assert_eq!(latest.answers.get("q1"), text("hello").as_ref());

        tab_b.resolve_conflict(false).await.unwrap();
        tab_b.set_answer("q2", text("x")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let stored = saver.fetch_session(&session.id).await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.answers.get("q1"), text("hello").as_ref());
        assert_eq!(stored.answers.get("q2"), text("x").as_ref());

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn test_missing_session_maps_to_not_found() {
        let state = test_state(1000).await;
        let (base_url, handle) = serve(state).await;
        let saver = HttpAnswerSaver::new(&base_url, caller()).unwrap();

        let err = saver
            .save_answer("missing", "q1", &AnswerPatch::Delete, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        handle.stop(true).await;
    }
}
