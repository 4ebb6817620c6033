//! Client-side session layer for the contest platform.
//!
//! SYSTEM CONTEXT
//! ==============
//! [`AuthService`] reconciles the persisted session token, the current-user
//! cache and federated auth events into one `{user, loading}` view.
//! [`guard`](guard::guard) turns that view into route decisions. The HTTP
//! adapter and identity bridge sit behind traits so the orchestrator can be
//! driven by fakes in tests.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod identity;
pub mod token;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use auth::{AuthService, AuthState};
pub use config::SessionConfig;
pub use error::{ApiError, AuthError, ErrorCode, IdentityError, SessionFetchError, TokenStoreError};
pub use guard::{GuardDecision, guard, guard_with, return_destination};
pub use http::{ApiClient, Backend};
pub use identity::rest::RestIdentityProvider;
pub use identity::{FederatedAuthEvent, FederatedUser, IdentityProvider};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{Capability, ProfileUpdate, Role, User};
