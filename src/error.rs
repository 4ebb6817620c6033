//! Error taxonomy for the session core.
//!
//! ERROR HANDLING
//! ==============
//! Identity-provider and backend rejections propagate to the caller (the
//! form handler) and are never swallowed. Session fetch failures are handled
//! inside the orchestrator by clearing local state; the type exists so the
//! deduplicated fetch can hand one settled result to every waiter. Logout
//! failures surface but never roll back the local clear-down.

use std::path::PathBuf;

/// Stable machine-readable code for an error, used in CLI output and logs.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// Failure talking to the contest backend over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl ApiError {
    /// Whether the backend rejected the bearer token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_API_TRANSPORT",
            Self::Status { status: 401 | 403, .. } => "E_API_UNAUTHORIZED",
            Self::Status { .. } => "E_API_STATUS",
            Self::Decode(_) => "E_API_DECODE",
            Self::ClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// IDENTITY PROVIDER
// =============================================================================

/// Failure reported by the federated identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("email already in use")]
    EmailInUse,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("password rejected by identity provider: {0}")]
    WeakPassword(String),

    /// The federated popup was closed or no federated credential was available.
    #[error("federated sign-in cancelled")]
    FederatedCancelled,

    /// Any other provider-side rejection, carrying the provider's code.
    #[error("identity provider rejected request: {0}")]
    Rejected(String),

    #[error("identity provider unreachable: {0}")]
    Transport(String),

    #[error("identity provider not configured: {0}")]
    NotConfigured(&'static str),
}

impl ErrorCode for IdentityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmailInUse => "E_IDP_EMAIL_IN_USE",
            Self::InvalidCredentials => "E_IDP_INVALID_CREDENTIALS",
            Self::WeakPassword(_) => "E_IDP_WEAK_PASSWORD",
            Self::FederatedCancelled => "E_IDP_FEDERATED_CANCELLED",
            Self::Rejected(_) => "E_IDP_REJECTED",
            Self::Transport(_) => "E_IDP_TRANSPORT",
            Self::NotConfigured(_) => "E_IDP_NOT_CONFIGURED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

// =============================================================================
// SESSION FETCH
// =============================================================================

/// `/api/users/me` failed while a token was present.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session fetch failed: {0}")]
pub struct SessionFetchError(#[from] pub ApiError);

impl SessionFetchError {
    /// The backend rejected the token itself, as opposed to a transport or
    /// server failure.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.0.is_unauthorized()
    }
}

impl ErrorCode for SessionFetchError {
    fn error_code(&self) -> &'static str {
        self.0.error_code()
    }

    fn retryable(&self) -> bool {
        self.0.retryable()
    }
}

// =============================================================================
// TOKEN STORE
// =============================================================================

/// Failure reading or writing the persisted session token.
#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("token file {path} I/O failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token file encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Errors returned by the auth orchestrator's imperative operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A precondition on the caller's input failed; nothing was attempted.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The federated phase was rejected; the backend was not contacted.
    #[error("identity provider error: {0}")]
    IdentityProvider(#[source] IdentityError),

    /// The backend rejected register/login after the federated phase succeeded.
    #[error("backend auth error: {0}")]
    BackendAuth(#[source] ApiError),

    /// The sign-out call threw. Local session state was still cleared.
    #[error("logout error: {0}")]
    Logout(#[source] IdentityError),

    #[error("token store error: {0}")]
    TokenStore(#[from] TokenStoreError),

    /// A logout or shutdown happened while the operation was in flight; its
    /// result was discarded.
    #[error("operation superseded by a newer session change")]
    Superseded,
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::IdentityProvider(inner) => inner.error_code(),
            Self::Logout(_) => "E_LOGOUT",
            Self::BackendAuth(inner) => inner.error_code(),
            Self::TokenStore(_) => "E_TOKEN_STORE",
            Self::Superseded => "E_SUPERSEDED",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::IdentityProvider(inner) | Self::Logout(inner) => inner.retryable(),
            Self::BackendAuth(inner) => inner.retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
