//! Identity provider bridge: federated accounts and auth-state events.
//!
//! DESIGN
//! ======
//! The provider is an external collaborator: only account creation, password
//! sign-in, federated sign-in, sign-out, and an auth-state stream matter here.
//! Auth-state changes are delivered as [`FederatedAuthEvent`] values on a
//! channel the subscriber owns, instead of a callback, so the orchestrator can
//! consume them from a single task. Subscribing replays the last known state,
//! matching how hosted identity SDKs report the restored session on startup.
//! A provider that has not yet learned its state replays nothing.

pub mod rest;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::IdentityError;

/// A signed-in federated identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedUser {
    /// Provider-assigned user id.
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    /// Provider-issued ID token, presented to the backend for federated login.
    pub id_token: String,
}

/// Auth-state notification from the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FederatedAuthEvent {
    /// A federated session now exists.
    SignedIn(FederatedUser),
    /// No federated session.
    SignedOut,
}

impl FederatedAuthEvent {
    #[must_use]
    pub fn has_session(&self) -> bool {
        matches!(self, Self::SignedIn(_))
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<FederatedUser, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<FederatedUser, IdentityError>;

    /// Federated (Google) sign-in. In a browser this is the popup flow.
    async fn sign_in_with_federated_popup(&self) -> Result<FederatedUser, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Deliver auth-state events to `sink` until the returned handle is
    /// unsubscribed or dropped.
    fn subscribe(&self, sink: mpsc::UnboundedSender<FederatedAuthEvent>) -> Subscription;
}

// =============================================================================
// LISTENER REGISTRY
// =============================================================================

/// Fan-out of auth-state events to subscribers, remembering the last event so
/// new subscribers get it replayed. Until the first event is published the
/// provider's state is unknown and nothing is replayed.
#[derive(Clone, Default)]
pub struct AuthStateListeners {
    inner: Arc<Mutex<ListenersInner>>,
}

#[derive(Default)]
struct ListenersInner {
    next_id: u64,
    sinks: HashMap<u64, mpsc::UnboundedSender<FederatedAuthEvent>>,
    last: Option<FederatedAuthEvent>,
}

impl AuthStateListeners {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ListenersInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `sink` and replay the last known state to it.
    pub fn subscribe(&self, sink: mpsc::UnboundedSender<FederatedAuthEvent>) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let delivered = match inner.last.clone() {
            Some(event) => sink.send(event).is_ok(),
            None => !sink.is_closed(),
        };
        if delivered {
            inner.sinks.insert(id, sink);
        }
        Subscription { id, listeners: Arc::downgrade(&self.inner) }
    }

    /// Record the new state and notify every live subscriber.
    pub fn publish(&self, event: FederatedAuthEvent) {
        let mut inner = self.lock();
        inner.sinks.retain(|_, sink| sink.send(event.clone()).is_ok());
        inner.last = Some(event);
    }

    /// The signed-in federated user, if the last event was a sign-in.
    #[must_use]
    pub fn current(&self) -> Option<FederatedUser> {
        match &self.lock().last {
            Some(FederatedAuthEvent::SignedIn(user)) => Some(user.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().sinks.len()
    }
}

/// Unsubscribe handle. Dropping it also unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<ListenersInner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.listeners.upgrade() {
            inner.lock().unwrap_or_else(PoisonError::into_inner).sinks.remove(&self.id);
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
