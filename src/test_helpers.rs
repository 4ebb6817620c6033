//! Test doubles for the backend and the identity provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use crate::error::{ApiError, IdentityError};
use crate::http::Backend;
use crate::identity::{AuthStateListeners, FederatedAuthEvent, FederatedUser, IdentityProvider, Subscription};
use crate::types::{AuthResponse, FederatedLoginRequest, LoginRequest, ProfileUpdate, RegisterRequest, Role, User};

pub fn sample_user(id: &str, role: Role) -> User {
    User {
        id: id.to_owned(),
        name: format!("User {id}"),
        email: format!("{id}@example.com"),
        photo: None,
        role,
        participation_count: 0,
        win_count: 0,
        bio: None,
    }
}

pub fn auth_response(token: &str, user: User) -> AuthResponse {
    AuthResponse { token: token.to_owned(), user }
}

pub fn federated_user(email: &str) -> FederatedUser {
    FederatedUser {
        uid: format!("fed-{email}"),
        email: email.to_owned(),
        display_name: Some("Fed User".to_owned()),
        photo_url: None,
        id_token: "fed-id-token".to_owned(),
    }
}

fn unauthorized() -> ApiError {
    ApiError::Status { status: 401, message: "Unauthorized".to_owned() }
}

// =============================================================================
// FAKE BACKEND
// =============================================================================

/// Scripted backend with per-endpoint call counters and optional gates that
/// hold a call in flight until released.
pub struct FakeBackend {
    pub register_result: Mutex<Result<AuthResponse, ApiError>>,
    pub login_result: Mutex<Result<AuthResponse, ApiError>>,
    pub federated_result: Mutex<Result<AuthResponse, ApiError>>,
    pub me_result: Mutex<Result<User, ApiError>>,
    pub update_result: Mutex<Result<User, ApiError>>,
    pub register_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub federated_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub last_register: Mutex<Option<RegisterRequest>>,
    pub last_federated: Mutex<Option<FederatedLoginRequest>>,
    pub me_gate: Mutex<Option<Arc<Notify>>>,
    pub login_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            register_result: Mutex::new(Ok(auth_response("tok-register", sample_user("u1", Role::User)))),
            login_result: Mutex::new(Ok(auth_response("tok-login", sample_user("u1", Role::User)))),
            federated_result: Mutex::new(Ok(auth_response("tok-google", sample_user("g1", Role::User)))),
            me_result: Mutex::new(Err(unauthorized())),
            update_result: Mutex::new(Err(unauthorized())),
            register_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            federated_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            last_register: Mutex::new(None),
            last_federated: Mutex::new(None),
            me_gate: Mutex::new(None),
            login_gate: Mutex::new(None),
        }
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_me(&self, result: Result<User, ApiError>) {
        *self.me_result.lock().unwrap() = result;
    }

    pub fn set_login(&self, result: Result<AuthResponse, ApiError>) {
        *self.login_result.lock().unwrap() = result;
    }

    pub fn set_register(&self, result: Result<AuthResponse, ApiError>) {
        *self.register_result.lock().unwrap() = result;
    }

    pub fn set_federated(&self, result: Result<AuthResponse, ApiError>) {
        *self.federated_result.lock().unwrap() = result;
    }

    pub fn set_update(&self, result: Result<User, ApiError>) {
        *self.update_result.lock().unwrap() = result;
    }

    /// Hold `/api/users/me` calls until the returned gate is notified.
    pub fn gate_me(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.me_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold login calls until the returned gate is notified.
    pub fn gate_login(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.login_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn me_calls(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn federated_calls(&self) -> usize {
        self.federated_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_register.lock().unwrap() = Some(request.clone());
        self.register_result.lock().unwrap().clone()
    }

    async fn login(&self, _request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.login_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.login_result.lock().unwrap().clone()
    }

    async fn federated_login(&self, request: &FederatedLoginRequest) -> Result<AuthResponse, ApiError> {
        self.federated_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_federated.lock().unwrap() = Some(request.clone());
        self.federated_result.lock().unwrap().clone()
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.me_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.me_result.lock().unwrap().clone()
    }

    async fn update_profile(&self, _update: &ProfileUpdate) -> Result<User, ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.update_result.lock().unwrap().clone()
    }
}

// =============================================================================
// FAKE IDENTITY PROVIDER
// =============================================================================

/// Scripted identity provider that publishes auth-state events like the real
/// bridge, plus [`FakeIdentity::emit`] for driving events directly.
pub struct FakeIdentity {
    pub listeners: AuthStateListeners,
    pub create_result: Mutex<Result<FederatedUser, IdentityError>>,
    pub sign_in_result: Mutex<Result<FederatedUser, IdentityError>>,
    pub popup_result: Mutex<Result<FederatedUser, IdentityError>>,
    pub sign_out_result: Mutex<Result<(), IdentityError>>,
    pub create_calls: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            listeners: AuthStateListeners::new(),
            create_result: Mutex::new(Ok(federated_user("u1@example.com"))),
            sign_in_result: Mutex::new(Ok(federated_user("u1@example.com"))),
            popup_result: Mutex::new(Ok(federated_user("g1@example.com"))),
            sign_out_result: Mutex::new(Ok(())),
            create_calls: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeIdentity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: FederatedAuthEvent) {
        self.listeners.publish(event);
    }

    pub fn set_create(&self, result: Result<FederatedUser, IdentityError>) {
        *self.create_result.lock().unwrap() = result;
    }

    pub fn set_sign_in(&self, result: Result<FederatedUser, IdentityError>) {
        *self.sign_in_result.lock().unwrap() = result;
    }

    pub fn set_popup(&self, result: Result<FederatedUser, IdentityError>) {
        *self.popup_result.lock().unwrap() = result;
    }

    pub fn set_sign_out(&self, result: Result<(), IdentityError>) {
        *self.sign_out_result.lock().unwrap() = result;
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn create_account(&self, _email: &str, _password: &str) -> Result<FederatedUser, IdentityError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.create_result.lock().unwrap().clone();
        if let Ok(user) = &result {
            self.listeners.publish(FederatedAuthEvent::SignedIn(user.clone()));
        }
        result
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<FederatedUser, IdentityError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.sign_in_result.lock().unwrap().clone();
        if let Ok(user) = &result {
            self.listeners.publish(FederatedAuthEvent::SignedIn(user.clone()));
        }
        result
    }

    async fn sign_in_with_federated_popup(&self) -> Result<FederatedUser, IdentityError> {
        let result = self.popup_result.lock().unwrap().clone();
        if let Ok(user) = &result {
            self.listeners.publish(FederatedAuthEvent::SignedIn(user.clone()));
        }
        result
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.sign_out_result.lock().unwrap().clone();
        if result.is_ok() {
            self.listeners.publish(FederatedAuthEvent::SignedOut);
        }
        result
    }

    fn subscribe(&self, sink: mpsc::UnboundedSender<FederatedAuthEvent>) -> Subscription {
        self.listeners.subscribe(sink)
    }
}
