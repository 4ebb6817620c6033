//! Auth orchestrator: the single source of truth for who is logged in.
//!
//! SYSTEM CONTEXT
//! ==============
//! Three signals update independently: the persisted session token, the
//! session cache, and federated auth events from the identity provider.
//! [`AuthService`] reconciles them into one [`AuthState`] `{user, loading}`
//! view consumed by route guards and user-aware rendering.
//!
//! DESIGN
//! ======
//! The service is constructed once by whoever owns the UI root and passed
//! around explicitly. Federated events arrive on a channel the service owns
//! and are consumed by one task, so the reconciliation rule lives in exactly
//! one place ([`AuthService::handle_federated_event`]):
//! - session exists + token present: re-fetch the current user
//! - session exists + no token: ignore (the token is the backend's trust anchor)
//! - no session + no fetch in flight: user becomes `None`, readiness set
//!
//! Readiness is one-way: `loading` starts `true` and flips to `false` when
//! the first resolution settles, and never goes back.
//!
//! ERROR HANDLING
//! ==============
//! Register/login are two-phase (identity provider, then backend) and fail
//! fast on phase one. A failed current-user fetch is never surfaced: it
//! clears the token and the user. Logout always ends the local session, even
//! when the provider's sign-out fails.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{FetchResult, SessionCache};
use crate::error::{AuthError, ErrorCode, SessionFetchError};
use crate::http::Backend;
use crate::identity::{FederatedAuthEvent, FederatedUser, IdentityProvider, Subscription};
use crate::token::TokenStore;
use crate::types::{AuthResponse, FederatedLoginRequest, LoginRequest, ProfileUpdate, RegisterRequest, User};

/// Authentication state tracking the current user and readiness.
///
/// `loading` is `true` until the first resolution of the current user
/// settles; no authorization decision should be made while it is set.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthState {
    pub user: Option<User>,
    pub loading: bool,
}

impl AuthState {
    /// State before the first resolution attempt.
    #[must_use]
    pub fn initial() -> Self {
        Self { user: None, loading: true }
    }

    #[must_use]
    pub fn ready(user: Option<User>) -> Self {
        Self { user, loading: false }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}

struct Worker {
    subscription: Subscription,
    task: JoinHandle<()>,
}

pub struct AuthService {
    backend: Arc<dyn Backend>,
    identity: Arc<dyn IdentityProvider>,
    tokens: Arc<dyn TokenStore>,
    cache: SessionCache,
    state: watch::Sender<AuthState>,
    /// Bumped by logout and shutdown; operations that started under an older
    /// epoch discard their results.
    epoch: AtomicU64,
    shut_down: AtomicBool,
    /// Serializes token and cache updates so a failed fetch cannot clear a
    /// session committed after it started. Never held across an await.
    commit_lock: Mutex<()>,
    worker: Mutex<Option<Worker>>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        identity: Arc<dyn IdentityProvider>,
        tokens: Arc<dyn TokenStore>,
        fresh_for: Duration,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(AuthState::initial());
        Arc::new(Self {
            backend,
            identity,
            tokens,
            cache: SessionCache::new(fresh_for),
            state,
            epoch: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            commit_lock: Mutex::new(()),
            worker: Mutex::new(None),
        })
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Subscribe to federated auth events and spawn the consumer task, which
    /// also performs the initial resolution of the current user. Calling
    /// `start` twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() || self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.identity.subscribe(tx);
        let task = tokio::spawn(run_consumer(Arc::downgrade(self), rx));
        *worker = Some(Worker { subscription, task });
        debug!("auth service started");
    }

    /// Unsubscribe from federated events, stop the consumer task, and mark
    /// in-flight operations stale.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            worker.subscription.unsubscribe();
            worker.task.abort();
        }
        debug!("auth service shut down");
    }

    // =========================================================================
    // STATE ACCESS
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.state.borrow().loading
    }

    /// Wait until the first resolution has settled and return the state.
    pub async fn wait_ready(&self) -> AuthState {
        let mut rx = self.watch();
        match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    fn publish(&self, user: Option<User>) {
        self.state.send_replace(AuthState::ready(user));
    }

    fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        !self.shut_down.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// `Ok(None)` without a network call when no token is stored.
    fn fetcher(&self) -> impl FnOnce() -> BoxFuture<'static, FetchResult> + Send + use<> {
        let backend = Arc::clone(&self.backend);
        let tokens = Arc::clone(&self.tokens);
        move || {
            async move {
                if !tokens.is_present() {
                    return Ok(None);
                }
                backend.current_user().await.map(Some).map_err(SessionFetchError)
            }
            .boxed()
        }
    }

    /// Resolve the current user through the cache, serving a fresh value
    /// without a network call.
    pub async fn resolve(&self) -> Option<User> {
        let generation = self.cache.generation();
        let result = self.cache.read(self.fetcher()).await;
        self.settle(generation, result)
    }

    /// Re-fetch the current user, ignoring freshness but joining any fetch
    /// already in flight.
    pub async fn refresh(&self) -> Option<User> {
        let generation = self.cache.generation();
        let result = self.cache.refetch(self.fetcher()).await;
        self.settle(generation, result)
    }

    /// Apply a fetch result. A result from before the last cache write or
    /// invalidation is dropped in favor of the state that write produced.
    fn settle(&self, generation: u64, result: FetchResult) -> Option<User> {
        let _commit = self.lock_commits();
        if self.shut_down.load(Ordering::SeqCst) || self.cache.generation() != generation {
            return self.current_user();
        }
        match result {
            Ok(user) => {
                self.publish(user.clone());
                user
            }
            Err(err) => {
                warn!(
                    error = %err,
                    code = err.error_code(),
                    status = ?err.0.status(),
                    unauthorized = err.is_unauthorized(),
                    "current user fetch failed; clearing session"
                );
                if let Err(e) = self.tokens.clear() {
                    error!(error = %e, "failed to remove session token");
                }
                self.cache.write(None);
                self.publish(None);
                None
            }
        }
    }

    /// Apply the reconciliation rule to one federated auth event.
    pub async fn handle_federated_event(&self, event: FederatedAuthEvent) {
        match event {
            FederatedAuthEvent::SignedIn(federated) => {
                if self.tokens.is_present() {
                    debug!(uid = %federated.uid, "federated session with token; refreshing current user");
                    self.refresh().await;
                } else {
                    debug!(uid = %federated.uid, "federated session without token; ignoring");
                }
            }
            FederatedAuthEvent::SignedOut => {
                if self.cache.is_fetching() {
                    debug!("federated sign-out while fetch in flight; deferring to fetch");
                } else {
                    let _commit = self.lock_commits();
                    self.set_user_unlocked(None);
                }
            }
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Create a federated account, then the backend account.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] for a malformed email or empty password.
    /// - [`AuthError::IdentityProvider`] if account creation is rejected; the
    ///   backend is not contacted.
    /// - [`AuthError::BackendAuth`] if the backend rejects registration. The
    ///   federated identity then exists without a backend record; no token is
    ///   persisted and the current user is unchanged.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        photo: Option<&str>,
    ) -> Result<User, AuthError> {
        let email = validate_credentials(email, password)?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        self.identity
            .create_account(&email, password)
            .await
            .map_err(AuthError::IdentityProvider)?;

        let request = RegisterRequest {
            name: name.trim().to_owned(),
            email: email.clone(),
            password: password.to_owned(),
            photo: photo.map(str::to_owned),
        };
        let response = self.backend.register(&request).await.map_err(|e| {
            warn!(%email, error = %e, "backend registration failed after federated account creation");
            AuthError::BackendAuth(e)
        })?;
        let user = self.commit_session(epoch, response)?;
        info!(user_id = %user.id, "registered");
        Ok(user)
    }

    /// Federated sign-in, then backend login.
    ///
    /// # Errors
    ///
    /// Same two-phase policy as [`AuthService::register`].
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = validate_credentials(email, password)?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        self.identity
            .sign_in(&email, password)
            .await
            .map_err(AuthError::IdentityProvider)?;

        let request = LoginRequest { email: email.clone(), password: password.to_owned() };
        let response = self.backend.login(&request).await.map_err(|e| {
            warn!(%email, error = %e, "backend login failed after federated sign-in");
            AuthError::BackendAuth(e)
        })?;
        let user = self.commit_session(epoch, response)?;
        info!(user_id = %user.id, "logged in");
        Ok(user)
    }

    /// Federated (Google) sign-in, then exchange the federated identity for a
    /// backend session so the user ends up with a usable token.
    ///
    /// # Errors
    ///
    /// [`AuthError::IdentityProvider`] if the federated flow fails (the backend
    /// is not contacted), [`AuthError::BackendAuth`] if the exchange fails.
    pub async fn google_sign_in(&self) -> Result<User, AuthError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let federated = self
            .identity
            .sign_in_with_federated_popup()
            .await
            .map_err(AuthError::IdentityProvider)?;

        let request = federated_login_request(federated);
        let response = self.backend.federated_login(&request).await.map_err(|e| {
            warn!(email = %request.email, error = %e, "backend federated login failed");
            AuthError::BackendAuth(e)
        })?;
        let user = self.commit_session(epoch, response)?;
        info!(user_id = %user.id, "signed in with federated provider");
        Ok(user)
    }

    /// End the session: remove the token, clear every cached view, then ask
    /// the identity provider to sign out.
    ///
    /// # Errors
    ///
    /// [`AuthError::Logout`] if the provider's sign-out fails, or
    /// [`AuthError::TokenStore`] if the token could not be removed. Local
    /// state is cleared either way.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let token_result = {
            let _commit = self.lock_commits();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            let token_result = self.tokens.clear();
            self.cache.invalidate_all();
            self.publish(None);
            token_result
        };
        if let Err(e) = &token_result {
            error!(error = %e, "failed to remove session token during logout");
        }

        match self.identity.sign_out().await {
            Ok(()) => {
                info!("logged out");
                token_result.map_err(AuthError::TokenStore)
            }
            Err(e) => {
                warn!(error = %e, "identity provider sign-out failed; local session cleared");
                Err(AuthError::Logout(e))
            }
        }
    }

    /// Replace the current user without a network round trip, e.g. after a
    /// profile edit that does not change identity.
    pub fn set_user(&self, user: User) {
        let _commit = self.lock_commits();
        self.set_user_unlocked(Some(user));
    }

    fn set_user_unlocked(&self, user: Option<User>) {
        self.cache.write(user.clone());
        self.publish(user);
    }

    /// `PATCH /api/users/me`, then write the result through [`AuthService::set_user`].
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] when nothing would change or no session
    /// exists, [`AuthError::BackendAuth`] if the backend rejects the update.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, AuthError> {
        if update.is_empty() {
            return Err(AuthError::Validation("profile update has no fields".into()));
        }
        if !self.tokens.is_present() {
            return Err(AuthError::Validation("not signed in".into()));
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        let user = self.backend.update_profile(update).await.map_err(AuthError::BackendAuth)?;
        let _commit = self.lock_commits();
        if !self.is_current(epoch) {
            return Err(AuthError::Superseded);
        }
        self.set_user_unlocked(Some(user.clone()));
        info!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    fn commit_session(&self, epoch: u64, response: AuthResponse) -> Result<User, AuthError> {
        let _commit = self.lock_commits();
        if !self.is_current(epoch) {
            debug!("discarding session from superseded operation");
            return Err(AuthError::Superseded);
        }
        self.tokens.save(&response.token)?;
        self.set_user_unlocked(Some(response.user.clone()));
        Ok(response.user)
    }
}

impl Drop for AuthService {
    fn drop(&mut self) {
        let worker = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            worker.task.abort();
        }
    }
}

/// Single consumer of federated auth events. The initial resolution runs
/// alongside the first events so a replayed "session exists" joins the same
/// in-flight fetch instead of issuing a second one.
async fn run_consumer(service: Weak<AuthService>, mut events: mpsc::UnboundedReceiver<FederatedAuthEvent>) {
    let initial = {
        let service = service.clone();
        async move {
            if let Some(service) = service.upgrade() {
                service.resolve().await;
            }
        }
    };
    tokio::pin!(initial);
    let mut resolved = false;

    loop {
        tokio::select! {
            biased;
            () = &mut initial, if !resolved => resolved = true,
            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(service) = service.upgrade() else { break };
                service.handle_federated_event(event).await;
            }
        }
    }
    debug!("federated event consumer stopped");
}

fn validate_credentials(email: &str, password: &str) -> Result<String, AuthError> {
    let email = email.trim();
    if !is_well_formed_email(email) {
        return Err(AuthError::Validation(format!("malformed email: {email}")));
    }
    if password.is_empty() {
        return Err(AuthError::Validation("password must not be empty".into()));
    }
    Ok(email.to_owned())
}

pub(crate) fn is_well_formed_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn federated_login_request(federated: FederatedUser) -> FederatedLoginRequest {
    let name = federated
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| federated.email.split('@').next().unwrap_or_default().to_owned());
    FederatedLoginRequest { name, email: federated.email, photo: federated.photo_url, id_token: federated.id_token }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
