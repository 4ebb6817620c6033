//! REST identity bridge for a Firebase-compatible identity toolkit.
//!
//! Password accounts use `accounts:signUp` / `accounts:signInWithPassword`.
//! Without a browser there is no popup, so federated sign-in exchanges a
//! pre-obtained Google ID token through `accounts:signInWithIdp`. Sign-out is
//! local: it drops the cached federated user and publishes `SignedOut`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{AuthStateListeners, FederatedAuthEvent, FederatedUser, IdentityProvider, Subscription};
use crate::config::{HttpTimeouts, IdentityConfig};
use crate::error::IdentityError;
use crate::http::join_url;

const SIGN_UP_PATH: &str = "accounts:signUp";
const SIGN_IN_PATH: &str = "accounts:signInWithPassword";
const SIGN_IN_IDP_PATH: &str = "accounts:signInWithIdp";
const IDP_REQUEST_URI: &str = "http://localhost";
const GOOGLE_PROVIDER_ID: &str = "google.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: &'static str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Identity provider backed by the identity toolkit REST API.
pub struct RestIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    federated_id_token: Option<String>,
    listeners: AuthStateListeners,
}

impl RestIdentityProvider {
    /// A missing API key is reported by the first call that needs it, so
    /// sign-out and event subscription work without one.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &IdentityConfig, timeouts: HttpTimeouts) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.require_api_key().ok().map(str::to_owned),
            federated_id_token: config.federated_id_token.clone(),
            listeners: AuthStateListeners::new(),
        })
    }

    fn endpoint(&self, action: &str) -> Result<String, IdentityError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(IdentityError::NotConfigured("CONTESTHUB_IDENTITY_API_KEY"))?;
        Ok(endpoint_url(&self.base_url, action, api_key))
    }

    async fn call<B: Serialize + Sync>(&self, action: &str, body: &B) -> Result<FederatedUser, IdentityError> {
        let resp = self
            .http
            .post(self.endpoint(action)?)
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.without_url().to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            let code = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            warn!(action, %code, "identity provider rejected request");
            return Err(map_provider_error(&code));
        }
        let account: AccountResponse = resp
            .json()
            .await
            .map_err(|e| IdentityError::Rejected(format!("unexpected response: {}", e.without_url())))?;
        Ok(FederatedUser {
            uid: account.local_id,
            email: account.email.unwrap_or_default(),
            display_name: account.display_name,
            photo_url: account.photo_url,
            id_token: account.id_token,
        })
    }

    fn signed_in(&self, user: FederatedUser) -> FederatedUser {
        info!(uid = %user.uid, "federated session established");
        self.listeners.publish(FederatedAuthEvent::SignedIn(user.clone()));
        user
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<FederatedUser, IdentityError> {
        let body = PasswordRequest { email, password, return_secure_token: true };
        let user = self.call(SIGN_UP_PATH, &body).await?;
        Ok(self.signed_in(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<FederatedUser, IdentityError> {
        let body = PasswordRequest { email, password, return_secure_token: true };
        let user = self.call(SIGN_IN_PATH, &body).await?;
        Ok(self.signed_in(user))
    }

    async fn sign_in_with_federated_popup(&self) -> Result<FederatedUser, IdentityError> {
        let Some(id_token) = self.federated_id_token.as_deref() else {
            return Err(IdentityError::NotConfigured("CONTESTHUB_FEDERATED_ID_TOKEN"));
        };
        let body = IdpRequest {
            post_body: idp_post_body(id_token),
            request_uri: IDP_REQUEST_URI,
            return_idp_credential: true,
            return_secure_token: true,
        };
        let user = self.call(SIGN_IN_IDP_PATH, &body).await?;
        Ok(self.signed_in(user))
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        match self.listeners.current() {
            Some(user) => info!(uid = %user.uid, "federated session ended"),
            None => debug!("sign-out without a federated session"),
        }
        self.listeners.publish(FederatedAuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self, sink: mpsc::UnboundedSender<FederatedAuthEvent>) -> Subscription {
        self.listeners.subscribe(sink)
    }
}

pub(crate) fn endpoint_url(base_url: &str, action: &str, api_key: &str) -> String {
    format!("{}?key={api_key}", join_url(base_url, action))
}

pub(crate) fn idp_post_body(id_token: &str) -> String {
    format!("id_token={id_token}&providerId={GOOGLE_PROVIDER_ID}")
}

/// Map identity toolkit error codes (e.g. `EMAIL_EXISTS`,
/// `WEAK_PASSWORD : Password should be at least 6 characters`) to errors.
pub(crate) fn map_provider_error(code: &str) -> IdentityError {
    let (head, detail) = match code.split_once(':') {
        Some((head, detail)) => (head.trim(), detail.trim()),
        None => (code.trim(), ""),
    };
    match head {
        "EMAIL_EXISTS" => IdentityError::EmailInUse,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
            IdentityError::InvalidCredentials
        }
        "WEAK_PASSWORD" => IdentityError::WeakPassword(detail.to_owned()),
        "INVALID_IDP_RESPONSE" | "FEDERATED_USER_ID_ALREADY_LINKED" => IdentityError::FederatedCancelled,
        _ => IdentityError::Rejected(head.to_owned()),
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
