//! Session configuration parsed from environment variables.
//!
//! Unparseable numeric values fall back to their defaults rather than
//! failing startup; only the identity API key is required, and only by the
//! REST identity bridge.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SESSION_FRESH_SECS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const TOKEN_FILE_NAME: &str = "token.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_HTTP_TIMEOUT_SECS, connect_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS }
    }
}

/// Settings for the REST identity bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Google ID token used in place of a browser popup for federated sign-in.
    pub federated_id_token: Option<String>,
}

impl IdentityConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when no API key is configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::Missing("CONTESTHUB_IDENTITY_API_KEY"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backend base URL without a trailing slash.
    pub api_url: String,
    /// File holding the persisted session token.
    pub token_path: PathBuf,
    /// How long a fetched current user is served without a network call.
    pub fresh_for: Duration,
    pub timeouts: HttpTimeouts,
    pub identity: IdentityConfig,
}

impl SessionConfig {
    /// Build typed session config from environment variables.
    ///
    /// Optional:
    /// - `CONTESTHUB_API_URL`: default `http://127.0.0.1:5000`
    /// - `CONTESTHUB_TOKEN_PATH`: default `$HOME/.contesthub/token.json`
    /// - `CONTESTHUB_SESSION_FRESH_SECS`: default 300
    /// - `CONTESTHUB_HTTP_TIMEOUT_SECS`: default 30
    /// - `CONTESTHUB_HTTP_CONNECT_TIMEOUT_SECS`: default 10
    /// - `CONTESTHUB_IDENTITY_API_KEY`, `CONTESTHUB_IDENTITY_URL`,
    ///   `CONTESTHUB_FEDERATED_ID_TOKEN`
    #[must_use]
    pub fn from_env() -> Self {
        let api_url = normalize_base_url(&std::env::var("CONTESTHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()));
        let token_path = std::env::var("CONTESTHUB_TOKEN_PATH")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map_or_else(default_token_path, PathBuf::from);
        let identity = IdentityConfig {
            api_key: env_non_empty("CONTESTHUB_IDENTITY_API_KEY"),
            base_url: normalize_base_url(
                &std::env::var("CONTESTHUB_IDENTITY_URL").unwrap_or_else(|_| DEFAULT_IDENTITY_URL.into()),
            ),
            federated_id_token: env_non_empty("CONTESTHUB_FEDERATED_ID_TOKEN"),
        };

        Self {
            api_url,
            token_path,
            fresh_for: Duration::from_secs(env_parse("CONTESTHUB_SESSION_FRESH_SECS", DEFAULT_SESSION_FRESH_SECS)),
            timeouts: HttpTimeouts {
                request_secs: env_parse("CONTESTHUB_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
                connect_secs: env_parse("CONTESTHUB_HTTP_CONNECT_TIMEOUT_SECS", DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            },
            identity,
        }
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = normalize_base_url(api_url);
        self
    }

    #[must_use]
    pub fn with_token_path(mut self, token_path: PathBuf) -> Self {
        self.token_path = token_path;
        self
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn default_token_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".contesthub").join(TOKEN_FILE_NAME)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
