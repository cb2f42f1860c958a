//! Configuration management
//!
//! Settings are read from environment variables with sensible defaults, so
//! the bot runs unconfigured out of the box. A `.env` file is honored when
//! the binary loads one before calling [`Config::from_env`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration for the responder bot
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Admission filter settings
    #[serde(default)]
    pub admission: AdmissionSettings,

    /// Session / reconnect settings
    #[serde(default)]
    pub session: SessionSettings,

    /// Conversation log settings
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionSettings {
    /// Debounce window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Processing-attempt ceiling per event id
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Hard cap on tracked event ids
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// The bot's own JID (events from it are ignored)
    pub self_id: Option<String>,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_attempts: default_max_attempts(),
            max_records: default_max_records(),
            self_id: None,
        }
    }
}

impl AdmissionSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl From<&AdmissionSettings> for crate::admission::AdmissionConfig {
    fn from(settings: &AdmissionSettings) -> Self {
        Self {
            window: settings.window(),
            max_attempts: settings.max_attempts,
            max_records: settings.max_records,
            self_id: settings.self_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Fixed delay before a reconnect attempt, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Where the credential blob is persisted
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl SessionSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Path to the SQLite conversation log
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_window_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    2
}

fn default_max_records() -> usize {
    1000
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_credentials_path() -> String {
    "data/credentials.json".to_string()
}

fn default_db_path() -> String {
    "data/conversations.db".to_string()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(ms) = read_env("WR_ADMISSION_WINDOW_MS")? {
            config.admission.window_ms = ms;
        }
        if let Some(attempts) = read_env("WR_MAX_ATTEMPTS")? {
            config.admission.max_attempts = attempts;
        }
        if let Some(records) = read_env("WR_MAX_RECORDS")? {
            config.admission.max_records = records;
        }
        if let Ok(self_id) = std::env::var("WR_SELF_ID") {
            if !self_id.trim().is_empty() {
                config.admission.self_id = Some(self_id);
            }
        }
        if let Some(ms) = read_env("WR_RETRY_DELAY_MS")? {
            config.session.retry_delay_ms = ms;
        }
        if let Ok(path) = std::env::var("WR_CREDENTIALS_PATH") {
            config.session.credentials_path = path;
        }
        if let Ok(path) = std::env::var("WR_DB_PATH") {
            config.store.db_path = path;
        }

        Ok(config)
    }
}

/// Read and parse an optional numeric environment variable
fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(None),
    }
}
