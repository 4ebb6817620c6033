//! Route guard for protected destinations.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every protected route applies the same decision to the orchestrator's
//! `{user, loading}` view. The guard is a pure function of that view and the
//! attempted path; it holds no state of its own. Role checks happen here,
//! once, against the capability table on [`Role`](crate::types::Role).

use serde::Serialize;

use crate::auth::AuthState;
use crate::types::Capability;

/// Login destination for unauthenticated navigation.
pub const LOGIN_ROUTE: &str = "/login";

/// Where a completed login lands when no destination was remembered.
pub const HOME_ROUTE: &str = "/";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Auth is still resolving; render a neutral waiting state.
    Wait,
    /// Signed out; go to `to`, carrying the attempted path.
    Redirect { to: String, from: String },
    /// Signed in, but the role lacks the required capability.
    Forbidden { required: Capability },
    Render,
}

/// Decide what to do with navigation to `attempted`.
#[must_use]
pub fn guard(state: &AuthState, attempted: &str) -> GuardDecision {
    guard_with(state, attempted, None)
}

/// Like [`guard`], additionally requiring `required` of the user's role.
#[must_use]
pub fn guard_with(state: &AuthState, attempted: &str, required: Option<Capability>) -> GuardDecision {
    if state.loading {
        return GuardDecision::Wait;
    }
    let Some(user) = state.user.as_ref() else {
        return GuardDecision::Redirect { to: LOGIN_ROUTE.to_owned(), from: attempted.to_owned() };
    };
    match required {
        Some(capability) if !user.can(capability) => GuardDecision::Forbidden { required: capability },
        _ => GuardDecision::Render,
    }
}

/// True once auth has loaded and no user is present.
#[must_use]
pub fn should_redirect_unauth(state: &AuthState) -> bool {
    !state.loading && state.user.is_none()
}

/// Post-login destination for a remembered `from` path. Empty paths, paths
/// that are not site-relative, and the login page itself fall back home.
#[must_use]
pub fn return_destination(from: Option<&str>) -> String {
    match from.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !is_login_path(path) => path.to_owned(),
        _ => HOME_ROUTE.to_owned(),
    }
}

fn is_login_path(path: &str) -> bool {
    let bare = path.split(['?', '#']).next().unwrap_or(path);
    bare.trim_end_matches('/') == LOGIN_ROUTE
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
