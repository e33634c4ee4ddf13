pub mod auth;
pub mod client;
pub mod dto;
pub mod error;

use crate::application::use_cases::diff_save::{DiffSaveCommand, DiffSaveUseCase};
use crate::application::use_cases::interview_session::InterviewSessionUseCase;
use crate::application::use_cases::rate_limiter::{RateLimitResult, RateLimiter};
use crate::domain::caller::Caller;
use crate::domain::error::AppError;
use crate::domain::interview_session::DiffSaveOutcome;
use crate::infrastructure::event_log::{Audience, EventLog};
use actix_cors::Cors;
use actix_web::{
    delete, dev::Server, get, patch, post, web, App, HttpResponse, HttpServer, Responder,
};
use dto::{
    ConflictResponse, CreateSessionRequest, DiffSaveRequest, DiffSaveResponse, ListSessionsQuery,
    StatusRequest,
};
use std::sync::Arc;
use validator::Validate;

const MAX_BODY_BYTES: usize = 256 * 1024;

pub struct HttpState {
    pub diff_save: Arc<DiffSaveUseCase>,
    pub sessions: Arc<InterviewSessionUseCase>,
    pub rate_limiter: Arc<RateLimiter>,
    pub events: EventLog,
}

type HandlerResult = Result<HttpResponse, AppError>;

fn outcome_response(outcome: DiffSaveOutcome) -> HttpResponse {
    match outcome {
        DiffSaveOutcome::Applied {
            updated_at,
            version,
        } => HttpResponse::Ok().json(DiffSaveResponse {
            ok: true,
            updated_at,
            version,
        }),
        DiffSaveOutcome::Conflicted(latest) => {
            HttpResponse::Conflict().json(ConflictResponse::new(latest))
        }
    }
}

#[patch("/interview-sessions/{session_id}/answers")]
async fn save_answer(
    data: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
    req: web::Json<DiffSaveRequest>,
) -> HandlerResult {
    let req = req.into_inner();
    req.validate()?;

    if let RateLimitResult::Exceeded {
        retry_after_seconds,
    } = data.rate_limiter.check(&caller.user_id).await?
    {
        data.events.record(
            "WARN",
            "HttpApi",
            Audience::user(&caller),
            Some(path.as_str()),
            Some(req.question_id.as_str()),
            &format!("Save rate limited for {}", caller.user_id),
        );
        return Err(AppError::RateLimited {
            retry_after_seconds,
        });
    }

    let outcome = data
        .diff_save
        .execute(
            &caller,
            DiffSaveCommand {
                session_id: path.into_inner(),
                question_id: req.question_id,
                new_answer: req.new_answer,
                previous_updated_at: req.previous_updated_at,
            },
        )
        .await?;

    Ok(outcome_response(outcome))
}

#[post("/interview-sessions")]
async fn create_session(
    data: web::Data<HttpState>,
    caller: Caller,
    req: web::Json<CreateSessionRequest>,
) -> HandlerResult {
    let req = req.into_inner();
    let session = data
        .sessions
        .create_session(&caller, req.organization_id, req.content_type)
        .await?;
    Ok(HttpResponse::Created().json(session))
}

#[get("/interview-sessions")]
async fn list_sessions(
    data: web::Data<HttpState>,
    caller: Caller,
    query: web::Query<ListSessionsQuery>,
) -> HandlerResult {
    let sessions = data
        .sessions
        .list_sessions(&caller, query.organization_id.as_deref(), query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(sessions))
}

#[get("/interview-sessions/{session_id}")]
async fn get_session(
    data: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> HandlerResult {
    let session = data.sessions.get_session(&caller, &path).await?;
    Ok(HttpResponse::Ok().json(session))
}

#[post("/interview-sessions/{session_id}/status")]
async fn change_status(
    data: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
    req: web::Json<StatusRequest>,
) -> HandlerResult {
    let outcome = data
        .sessions
        .transition_status(&caller, &path, req.status, req.previous_updated_at)
        .await?;
    Ok(outcome_response(outcome))
}

#[delete("/interview-sessions/{session_id}")]
async fn delete_session(
    data: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> HandlerResult {
    data.sessions.delete_session(&caller, &path).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>, caller: Caller) -> impl Responder {
    HttpResponse::Ok().json(data.events.snapshot_for(&caller))
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Routes and extractor configs, shared by the server and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(MAX_BODY_BYTES)
            .error_handler(error::json_error_handler),
    )
    .app_data(web::QueryConfig::default().error_handler(error::query_error_handler))
    .service(health)
    .service(
        web::scope("/api")
            .service(save_answer)
            .service(create_session)
            .service(list_sessions)
            .service(get_session)
            .service(change_status)
            .service(delete_session)
            .service(get_logs),
    );
}

pub fn start_server(state: web::Data<HttpState>, host: &str, port: u16) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((host, port))?
    .run();

    Ok(server)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::answer::AnswerLimits;
    use crate::infrastructure::config::SaveRateLimitConfig;
    use crate::infrastructure::db::connection::init_db;
    use crate::infrastructure::db::interview_sessions::SqliteSessionStore;
    use crate::interfaces::http::auth::{ORGANIZATION_IDS_HEADER, USER_ID_HEADER};
    use crate::interfaces::http::dto::ErrorResponse;
    use crate::domain::interview_session::InterviewSession;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::{json, Value};

    pub(crate) async fn test_state(max_saves: u32) -> web::Data<HttpState> {
        let store = Arc::new(SqliteSessionStore::new(
            init_db("sqlite::memory:", 1).await.unwrap(),
        ));
        let events = EventLog::new();
        web::Data::new(HttpState {
            diff_save: Arc::new(DiffSaveUseCase::new(
                store.clone(),
                AnswerLimits::default(),
                events.clone(),
            )),
            sessions: Arc::new(InterviewSessionUseCase::new(store, events.clone())),
            rate_limiter: Arc::new(RateLimiter::in_memory(SaveRateLimitConfig {
                max_saves,
                window_seconds: 60,
            })),
            events,
        })
    }

    fn member(req: test::TestRequest) -> test::TestRequest {
        req.insert_header((USER_ID_HEADER, "u1"))
            .insert_header((ORGANIZATION_IDS_HEADER, "org-1"))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(configure)).await
        };
    }

    async fn create(app: &impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    >) -> InterviewSession {
        let req = member(test::TestRequest::post().uri("/api/interview-sessions"))
            .set_json(json!({ "organizationId": "org-1", "contentType": "service" }))
            .to_request();
        let resp = test::call_service(app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        test::read_body_json(resp).await
    }

    fn save(session_id: &str, question_id: &str, answer: Value, previous: &str) -> actix_http::Request {
        member(test::TestRequest::patch().uri(&format!(
            "/api/interview-sessions/{}/answers",
            session_id
        )))
        .set_json(json!({
            "questionId": question_id,
            "newAnswer": answer,
            "previousUpdatedAt": previous,
        }))
        .to_request()
    }

    fn token(value: &Value) -> String {
        value.as_str().unwrap().to_string()
    }

    #[actix_web::test]
    async fn test_save_then_conflict_over_http() {
        let state = test_state(100).await;
        let app = app!(state);
        let session = create(&app).await;
        let t0 = serde_json::to_value(session.updated_at).unwrap();

        let resp = test::call_service(&app, save(&session.id, "q1", json!("hello"), &token(&t0))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["version"], json!(1));
        let t1 = body["updatedAt"].clone();

        let resp = test::call_service(&app, save(&session.id, "q2", json!("x"), &token(&t1))).await;
        let body: Value = test::read_body_json(resp).await;
        let t2 = body["updatedAt"].clone();

        // Second tab still holds t1.
        let resp = test::call_service(&app, save(&session.id, "q3", json!("y"), &token(&t1))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["code"], json!("conflict"));
        assert_eq!(body["latest"]["id"], json!(session.id));
        assert_eq!(body["latest"]["version"], json!(2));
        assert_eq!(body["latest"]["updatedAt"], t2);
        assert_eq!(body["latest"]["answers"], json!({ "q1": "hello", "q2": "x" }));
    }

    #[actix_web::test]
    async fn test_null_answer_deletes_key() {
        let state = test_state(100).await;
        let app = app!(state);
        let session = create(&app).await;
        let t0 = serde_json::to_value(session.updated_at).unwrap();

        let resp = test::call_service(&app, save(&session.id, "q1", json!("hello"), &token(&t0))).await;
        let body: Value = test::read_body_json(resp).await;
        let resp = test::call_service(
            &app,
            save(&session.id, "q1", Value::Null, &token(&body["updatedAt"])),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = member(test::TestRequest::get().uri(&format!(
            "/api/interview-sessions/{}",
            session.id
        )))
        .to_request();
        let fetched: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched["answers"], json!({}));
        assert_eq!(fetched["version"], json!(2));
    }

    #[actix_web::test]
    async fn test_unknown_session_is_404() {
        let state = test_state(100).await;
        let app = app!(state);
        let resp = test::call_service(
            &app,
            save("missing", "q1", json!("hello"), "2026-10-17T09:30:00Z"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(!body.success);
        assert!(body.message.contains("missing"));
    }

    #[actix_web::test]
    async fn test_malformed_body_is_400() {
        let state = test_state(100).await;
        let app = app!(state);
        let session = create(&app).await;

        let req = member(test::TestRequest::patch().uri(&format!(
            "/api/interview-sessions/{}/answers",
            session.id
        )))
        .set_json(json!({ "questionId": "q1", "previousUpdatedAt": "yesterday" }))
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(!body.success);

        let t0 = serde_json::to_value(session.updated_at).unwrap();
        let resp = test::call_service(&app, save(&session.id, "", json!("x"), &token(&t0))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_identity_is_required() {
        let state = test_state(100).await;
        let app = app!(state);
        let req = test::TestRequest::get()
            .uri("/api/interview-sessions")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_outsider_is_forbidden() {
        let state = test_state(100).await;
        let app = app!(state);
        let session = create(&app).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/interview-sessions/{}", session.id))
            .insert_header((USER_ID_HEADER, "u9"))
            .insert_header((ORGANIZATION_IDS_HEADER, "org-2"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_rate_limit_returns_429() {
        let state = test_state(1).await;
        let app = app!(state);
        let session = create(&app).await;
        let t0 = serde_json::to_value(session.updated_at).unwrap();

        let resp = test::call_service(&app, save(&session.id, "q1", json!("a"), &token(&t0))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = test::call_service(&app, save(&session.id, "q1", json!("b"), &token(&t0))).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key("retry-after"));
    }

    #[actix_web::test]
    async fn test_status_and_delete_lifecycle() {
        let state = test_state(100).await;
        let app = app!(state);
        let session = create(&app).await;

        let req = member(test::TestRequest::post().uri(&format!(
            "/api/interview-sessions/{}/status",
            session.id
        )))
        .set_json(json!({ "status": "completed", "previousUpdatedAt": session.updated_at }))
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = member(test::TestRequest::get().uri("/api/interview-sessions?organizationId=org-1")).to_request();
        let listed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed[0]["status"], json!("completed"));

        let req = member(test::TestRequest::delete().uri(&format!(
            "/api/interview-sessions/{}",
            session.id
        )))
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = member(test::TestRequest::get().uri(&format!(
            "/api/interview-sessions/{}",
            session.id
        )))
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_logs_and_health() {
        let state = test_state(100).await;
        let app = app!(state);
        create(&app).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = member(test::TestRequest::get().uri("/api/logs")).to_request();
        let logs: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(logs[0]["source"], json!("InterviewSession"));
    }

    #[actix_web::test]
    async fn test_logs_hide_other_tenants() {
        let state = test_state(1).await;
        let app = app!(state);
        let session = create(&app).await;
        let t0 = serde_json::to_value(session.updated_at).unwrap();
        test::call_service(&app, save(&session.id, "q1", json!("a"), &token(&t0))).await;
        // Second save trips the limiter and logs the user id.
        test::call_service(&app, save(&session.id, "q1", json!("b"), &token(&t0))).await;

        let req = member(test::TestRequest::get().uri("/api/logs")).to_request();
        let logs: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(logs.as_array().unwrap().len(), 3);

        let req = test::TestRequest::get()
            .uri("/api/logs")
            .insert_header((USER_ID_HEADER, "u9"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let logs: Value = test::read_body_json(resp).await;
        assert_eq!(logs, json!([]));
    }
}
