//! Rate limiter for answer saves
//!
//! Fixed-window counting per caller:
//! - Hit counts live behind [`RateLimitStore`] so several server instances
//!   can share one counter store
//! - The bundled store is an in-process map with TTL reset
//! - Expired windows are swept by [`RateLimiter::cleanup_expired`]

use crate::domain::error::Result;
use crate::infrastructure::config::SaveRateLimitConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Hits counted in the window that started at `window_started_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u32,
    pub window_started_at: DateTime<Utc>,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one hit for `key`, opening a new window if the current one is
    /// older than `window`.
    async fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<WindowCount>;

    /// Drop windows that ended before `now`. Returns how many were removed.
    async fn purge_expired(&self, window: Duration, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: Mutex<HashMap<String, WindowCount>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<WindowCount> {
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_insert(WindowCount {
            count: 0,
            window_started_at: now,
        });

        if now - entry.window_started_at >= window {
            *entry = WindowCount {
                count: 0,
                window_started_at: now,
            };
        }
        entry.count += 1;
        Ok(*entry)
    }

    async fn purge_expired(&self, window: Duration, now: DateTime<Utc>) -> Result<u64> {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, count| now - count.window_started_at < window);
        Ok((before - windows.len()) as u64)
    }
}

/// Rate limit check result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Exceeded { retry_after_seconds: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: SaveRateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: SaveRateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn in_memory(config: SaveRateLimitConfig) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), config)
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.config.window_seconds as i64)
    }

    /// Record a save attempt for `key` and report whether it may proceed
    pub async fn check(&self, key: &str) -> Result<RateLimitResult> {
        self.check_at(key, Utc::now()).await
    }

    pub async fn check_at(&self, key: &str, now: DateTime<Utc>) -> Result<RateLimitResult> {
        let window = self.window();
        let counted = self.store.hit(key, window, now).await?;

        if counted.count > self.config.max_saves {
            let reset_at = counted.window_started_at + window;
            let retry_after = (reset_at - now).num_seconds().max(1) as u64;
            debug!(key, count = counted.count, retry_after, "Save rate limit exceeded");
            return Ok(RateLimitResult::Exceeded {
                retry_after_seconds: retry_after,
            });
        }

        Ok(RateLimitResult::Allowed)
    }

    /// Clean up expired windows (maintenance function)
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let removed = self.store.purge_expired(self.window(), Utc::now()).await?;
        info!("Cleaned up {} expired rate limit windows", removed);
        Ok(removed)
    }
}
