//! HTTP client adapter for the contest backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every backend call goes through [`ApiClient`], which owns the base URL and
//! attaches the persisted bearer token when one exists. The orchestrator talks
//! to the backend only through the [`Backend`] trait so tests can substitute a
//! fake without a network.
//!
//! ERROR HANDLING
//! ==============
//! Non-success responses become [`ApiError::Status`] carrying the backend's
//! `message` field when the body is JSON, or the raw body text otherwise.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{HttpTimeouts, normalize_base_url};
use crate::error::ApiError;
use crate::token::TokenStore;
use crate::types::{AuthResponse, FederatedLoginRequest, LoginRequest, ProfileUpdate, RegisterRequest, User};

pub const REGISTER_PATH: &str = "/api/auth/register";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const FEDERATED_LOGIN_PATH: &str = "/api/auth/google";
pub const CURRENT_USER_PATH: &str = "/api/users/me";

/// Backend operations the session core depends on.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /api/auth/register`.
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError>;

    /// `POST /api/auth/login`.
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError>;

    /// `POST /api/auth/google`, exchanging a completed federated sign-in.
    async fn federated_login(&self, request: &FederatedLoginRequest) -> Result<AuthResponse, ApiError>;

    /// `GET /api/users/me`, authenticated by the persisted token.
    async fn current_user(&self) -> Result<User, ApiError>;

    /// `PATCH /api/users/me`.
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError>;
}

// =============================================================================
// API CLIENT
// =============================================================================

/// Bearer-authenticated JSON client rooted at a configurable base URL.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, timeouts: HttpTimeouts, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: normalize_base_url(base_url), tokens })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Start a request, attaching `Authorization: Bearer` when a token is stored.
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.endpoint(path));
        match self.tokens.load() {
            Ok(Some(token)) => builder.bearer_auth(token),
            _ => builder,
        }
    }

    /// Send a request with an optional JSON body and decode a JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-success status, or a
    /// body that does not decode into `T`.
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut builder = self.request(method.clone(), path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        debug!(%method, path, status = status.as_u16(), "backend response");
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), message: error_message_from_body(&body) });
        }
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.send_json(Method::POST, REGISTER_PATH, Some(request)).await
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.send_json(Method::POST, LOGIN_PATH, Some(request)).await
    }

    async fn federated_login(&self, request: &FederatedLoginRequest) -> Result<AuthResponse, ApiError> {
        self.send_json(Method::POST, FEDERATED_LOGIN_PATH, Some(request)).await
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        self.send_json::<(), _>(Method::GET, CURRENT_USER_PATH, None).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.send_json(Method::PATCH, CURRENT_USER_PATH, Some(update)).await
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        return base.to_owned();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Prefer the backend's `{"message": ...}` (or `{"error": ...}`) over raw text.
pub(crate) fn error_message_from_body(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["message", "error"] {
            if let Some(message) = json.get(key).and_then(serde_json::Value::as_str) {
                return message.to_owned();
            }
        }
    }
    trimmed.to_owned()
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
