use std::sync::Arc;

use actix_web::web;
use tracing::{error, warn};

use crate::application::use_cases::rate_limiter::RateLimiter;
use crate::application::{DiffSaveUseCase, InterviewSessionUseCase};
use crate::domain::error::Result;
use crate::domain::session_store::SessionStore;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::connection::init_db;
use crate::infrastructure::db::interview_sessions::SqliteSessionStore;
use crate::infrastructure::event_log::EventLog;
use crate::interfaces::http::HttpState;

/// Open the database and wire use cases into the state shared by HTTP workers.
pub async fn setup(config: &AppConfig) -> Result<web::Data<HttpState>> {
    let pool = init_db(&config.database.url, config.database.max_connections)
        .await
        .map_err(|err| {
            error!(error = %err, db_url = %config.database.url, "Failed to initialize database");
            err
        })?;

    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool));
    let events = EventLog::new();

    let diff_save = Arc::new(DiffSaveUseCase::new(
        store.clone(),
        config.answers.limits(),
        events.clone(),
    ));
    let sessions = Arc::new(InterviewSessionUseCase::new(store, events.clone()));
    let rate_limiter = Arc::new(RateLimiter::in_memory(config.rate_limit));

    spawn_rate_limit_sweeper(rate_limiter.clone(), config.rate_limit.window_seconds);

    Ok(web::Data::new(HttpState {
        diff_save,
        sessions,
        rate_limiter,
        events,
    }))
}

fn spawn_rate_limit_sweeper(rate_limiter: Arc<RateLimiter>, window_seconds: u64) {
    let period = std::time::Duration::from_secs(window_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = rate_limiter.cleanup_expired().await {
                warn!(error = %err, "Rate limit sweep failed");
            }
        }
    });
}
