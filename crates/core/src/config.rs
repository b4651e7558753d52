use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CoreError;

/// Maximum accepted upload size (5 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Client configuration for one backend deployment.
///
/// Supplied once by the embedding application and passed explicitly into
/// every component that needs it. Deserializable so it can also be read
/// from a config file; missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL without trailing slash (default: `http://localhost:8000`).
    pub base_url: String,
    /// Fixed delay between status polls, in ms (default: `2000`).
    pub poll_interval_ms: u64,
    /// Hard ceiling on status polls per job (default: `180`).
    pub max_poll_attempts: u32,
    /// Per-poll network timeout, in ms (default: `1500`).
    pub request_timeout_ms: u64,
    /// Job creation timeout, in ms (default: `10000`).
    pub submit_timeout_ms: u64,
    /// Asset upload timeout, in ms (default: `30000`).
    pub upload_timeout_ms: u64,
    /// Largest asset the uploader will send (default: 5 MiB).
    pub max_upload_bytes: u64,
    /// Opaque bearer token forwarded on every request.
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            poll_interval_ms: 2000,
            max_poll_attempts: 180,
            request_timeout_ms: 1500,
            submit_timeout_ms: 10_000,
            upload_timeout_ms: 30_000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            auth_token: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                  |
    /// |----------------------|--------------------------|
    /// | `API_BASE_URL`       | `http://localhost:8000`  |
    /// | `POLL_INTERVAL_MS`   | `2000`                   |
    /// | `MAX_POLL_ATTEMPTS`  | `180`                    |
    /// | `REQUEST_TIMEOUT_MS` | `1500`                   |
    /// | `SUBMIT_TIMEOUT_MS`  | `10000`                  |
    /// | `UPLOAD_TIMEOUT_MS`  | `30000`                  |
    /// | `MAX_UPLOAD_BYTES`   | `5242880`                |
    /// | `API_TOKEN`          | unset                    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through
    /// `lookup`, so callers can source them from anywhere.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup("API_BASE_URL").unwrap_or(defaults.base_url);
        let auth_token = lookup("API_TOKEN").filter(|t| !t.trim().is_empty());

        let config = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval_ms: parse_or(&lookup, "POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            max_poll_attempts: parse_or(&lookup, "MAX_POLL_ATTEMPTS", defaults.max_poll_attempts)?,
            request_timeout_ms: parse_or(
                &lookup,
                "REQUEST_TIMEOUT_MS",
                defaults.request_timeout_ms,
            )?,
            submit_timeout_ms: parse_or(&lookup, "SUBMIT_TIMEOUT_MS", defaults.submit_timeout_ms)?,
            upload_timeout_ms: parse_or(&lookup, "UPLOAD_TIMEOUT_MS", defaults.upload_timeout_ms)?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            auth_token,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// A status poll must time out before the next one is due, so
    /// `request_timeout_ms` has to be strictly below `poll_interval_ms`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.base_url.is_empty() {
            return Err(CoreError::Config("API_BASE_URL must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(CoreError::Config("POLL_INTERVAL_MS must be positive".into()));
        }
        if self.max_poll_attempts == 0 {
            return Err(CoreError::Config("MAX_POLL_ATTEMPTS must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 || self.request_timeout_ms >= self.poll_interval_ms {
            return Err(CoreError::Config(format!(
                "REQUEST_TIMEOUT_MS ({}) must be positive and below POLL_INTERVAL_MS ({})",
                self.request_timeout_ms, self.poll_interval_ms
            )));
        }
        if self.submit_timeout_ms == 0 || self.upload_timeout_ms == 0 {
            return Err(CoreError::Config("timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Config(format!("{key} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}
