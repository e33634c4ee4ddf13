use crate::domain::answer::AnswerLimits;
use crate::domain::error::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "aio-hub.toml";
pub const ENV_PREFIX: &str = "AIO_HUB_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub autosave: AutosaveConfig,
    pub answers: AnswersConfig,
    pub rate_limit: SaveRateLimitConfig,
    pub log_filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before a batch is flushed.
    pub debounce_ms: u64,
    /// How long the `saved` status stays up before dropping back to `idle`.
    pub saved_reset_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswersConfig {
    pub max_answer_bytes: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaveRateLimitConfig {
    pub max_saves: u32,
    pub window_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3001,
            },
            database: DatabaseConfig {
                url: "sqlite://aio_hub.db".to_string(),
                max_connections: 4,
            },
            autosave: AutosaveConfig::default(),
            answers: AnswersConfig {
                max_answer_bytes: 64 * 1024,
                max_depth: 16,
            },
            rate_limit: SaveRateLimitConfig {
                max_saves: 120,
                window_seconds: 60,
            },
            log_filter: "info".to_string(),
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            saved_reset_ms: 1000,
        }
    }
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn saved_reset(&self) -> Duration {
        Duration::from_millis(self.saved_reset_ms)
    }
}

impl AnswersConfig {
    pub fn limits(&self) -> AnswerLimits {
        AnswerLimits {
            max_bytes: self.max_answer_bytes,
            max_depth: self.max_depth,
        }
    }
}

impl AppConfig {
    /// Defaults, then `aio-hub.toml`, then `AIO_HUB_*` variables
    /// (`AIO_HUB_SERVER__PORT=8080`).
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::figment(Path::new(CONFIG_FILE)).extract().map_err(Into::into)
    }

    pub fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
