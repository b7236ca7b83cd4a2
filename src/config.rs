//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

const KEYRING_SERVICE: &str = "proactive-hub";

/// Reminder scheduler settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReminderConfig {
    /// Upper bound on how long the scheduler sleeps before re-scanning.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

/// Intention daemon settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IntentionConfig {
    /// Cadence at which the daemon evaluates triggers.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// How long shutdown waits for in-flight executions.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for IntentionConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

/// Language-model endpoint settings.
///
/// The API key is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Bearer token (populated at runtime).
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            request_timeout_seconds: default_request_timeout(),
            api_key: None,
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}

fn default_model() -> String {
    "llama3.2".into()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_http_host() -> String {
    "127.0.0.1".into()
}

fn default_http_port() -> u16 {
    8888
}

fn default_db_path() -> PathBuf {
    PathBuf::from("proactive-hub.db")
}

fn default_connection_buffer() -> usize {
    256
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Interface the HTTP/WebSocket server binds to.
    #[serde(default = "default_http_host")]
    pub http_host: String,
    /// Port the HTTP/WebSocket server binds to.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Outbound queue depth per connected client.
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
    /// Reminder scheduler settings.
    #[serde(default)]
    pub reminders: ReminderConfig,
    /// Intention daemon settings.
    #[serde(default)]
    pub intentions: IntentionConfig,
    /// Language-model endpoint settings.
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            db_path: default_db_path(),
            connection_buffer: default_connection_buffer(),
            reminders: ReminderConfig::default(),
            intentions: IntentionConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the model API key from OS keychain with env-var fallback.
    ///
    /// A missing key is not an error: local endpoints such as Ollama
    /// accept unauthenticated requests.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain lookup task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.agent.api_key = load_credential("llm_api_key", "LLM_API_KEY").await?;
        if self.agent.api_key.is_none() {
            warn!("no model api key configured; requests will be unauthenticated");
        }
        Ok(())
    }

    /// Idle poll bound for the reminder scheduler.
    #[must_use]
    pub fn reminder_poll_interval(&self) -> Duration {
        Duration::from_secs(self.reminders.poll_interval_seconds)
    }

    /// Trigger evaluation cadence for the intention daemon.
    #[must_use]
    pub fn intention_poll_interval(&self) -> Duration {
        Duration::from_secs(self.intentions.poll_interval_seconds)
    }

    /// Grace period granted to in-flight executions at shutdown.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.intentions.shutdown_grace_seconds)
    }

    /// Socket address string for the HTTP server.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    fn validate(&self) -> Result<()> {
        if self.reminders.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "reminders.poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.intentions.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "intentions.poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.connection_buffer == 0 {
            return Err(AppError::Config(
                "connection_buffer must be greater than zero".into(),
            ));
        }

        if self.agent.base_url.trim().is_empty() || self.agent.model.trim().is_empty() {
            return Err(AppError::Config(
                "agent.base_url and agent.model must not be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            tracing::debug!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.trim().is_empty()))
}
