use super::*;
use axum::Json;
use axum::Router;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

// =============================================================================
// Pure helpers
// =============================================================================

#[test]
fn endpoint_url_appends_key() {
    assert_eq!(
        endpoint_url("https://idp.test/v1/", "accounts:signUp", "k1"),
        "https://idp.test/v1/accounts:signUp?key=k1"
    );
}

#[test]
fn idp_post_body_names_google_provider() {
    assert_eq!(idp_post_body("abc"), "id_token=abc&providerId=google.com");
}

#[test]
fn map_provider_error_known_codes() {
    assert_eq!(map_provider_error("EMAIL_EXISTS"), IdentityError::EmailInUse);
    assert_eq!(map_provider_error("INVALID_LOGIN_CREDENTIALS"), IdentityError::InvalidCredentials);
    assert_eq!(map_provider_error("EMAIL_NOT_FOUND"), IdentityError::InvalidCredentials);
    assert_eq!(
        map_provider_error("WEAK_PASSWORD : Password should be at least 6 characters"),
        IdentityError::WeakPassword("Password should be at least 6 characters".into())
    );
}

#[test]
fn map_provider_error_unknown_code_is_rejected() {
    assert_eq!(map_provider_error("USER_DISABLED"), IdentityError::Rejected("USER_DISABLED".into()));
}

#[tokio::test]
async fn calls_without_api_key_are_not_configured() {
    let config = IdentityConfig { api_key: None, base_url: "http://idp.test".into(), federated_id_token: None };
    let idp = RestIdentityProvider::new(&config, HttpTimeouts::default()).unwrap();
    let err = idp.sign_in("a@example.com", "pw").await.unwrap_err();
    assert_eq!(err, IdentityError::NotConfigured("CONTESTHUB_IDENTITY_API_KEY"));
    idp.sign_out().await.unwrap();
}

// =============================================================================
// Mock identity toolkit
// =============================================================================

fn account(email: &str) -> Value {
    json!({ "localId": "uid-1", "email": email, "idToken": "idt-1", "displayName": "Alice" })
}

fn rejection(code: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": { "code": 400, "message": code } }))).into_response()
}

async fn toolkit(uri: Uri, Json(body): Json<Value>) -> Response {
    if uri.query() != Some("key=test-key") {
        return rejection("API_KEY_INVALID");
    }
    let email = body["email"].as_str().unwrap_or_default();
    match uri.path() {
        "/v1/accounts:signUp" if email == "taken@example.com" => rejection("EMAIL_EXISTS"),
        "/v1/accounts:signUp" => Json(account(email)).into_response(),
        "/v1/accounts:signInWithPassword" if body["password"] == "right" => Json(account(email)).into_response(),
        "/v1/accounts:signInWithPassword" => rejection("INVALID_LOGIN_CREDENTIALS"),
        "/v1/accounts:signInWithIdp" if body["postBody"] == "id_token=g-token&providerId=google.com" => {
            Json(account("g@example.com")).into_response()
        }
        _ => rejection("INVALID_IDP_RESPONSE"),
    }
}

async fn spawn_toolkit() -> String {
    let router = Router::new().fallback(toolkit);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn provider(base_url: &str, federated_id_token: Option<&str>) -> RestIdentityProvider {
    let config = IdentityConfig {
        api_key: Some("test-key".into()),
        base_url: base_url.into(),
        federated_id_token: federated_id_token.map(str::to_owned),
    };
    RestIdentityProvider::new(&config, HttpTimeouts::default()).unwrap()
}

#[tokio::test]
async fn create_account_publishes_signed_in() {
    let base = spawn_toolkit().await;
    let idp = provider(&base, None);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = idp.subscribe(tx);

    let user = idp.create_account("alice@example.com", "secret").await.unwrap();
    assert_eq!(user.uid, "uid-1");
    assert_eq!(user.id_token, "idt-1");
    assert!(rx.recv().await.unwrap().has_session());
}

#[tokio::test]
async fn create_account_email_in_use() {
    let base = spawn_toolkit().await;
    let idp = provider(&base, None);
    let err = idp.create_account("taken@example.com", "secret").await.unwrap_err();
    assert_eq!(err, IdentityError::EmailInUse);
}

#[tokio::test]
async fn sign_in_wrong_password() {
    let base = spawn_toolkit().await;
    let idp = provider(&base, None);
    let err = idp.sign_in("alice@example.com", "wrong").await.unwrap_err();
    assert_eq!(err, IdentityError::InvalidCredentials);
    assert!(idp.listeners.current().is_none());
}

#[tokio::test]
async fn sign_in_then_sign_out() {
    let base = spawn_toolkit().await;
    let idp = provider(&base, None);
    idp.sign_in("alice@example.com", "right").await.unwrap();
    assert!(idp.listeners.current().is_some());
    idp.sign_out().await.unwrap();
    assert!(idp.listeners.current().is_none());
}

#[tokio::test]
async fn federated_sign_in_exchanges_id_token() {
    let base = spawn_toolkit().await;
    let idp = provider(&base, Some("g-token"));
    let user = idp.sign_in_with_federated_popup().await.unwrap();
    assert_eq!(user.email, "g@example.com");
    assert_eq!(user.display_name.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn federated_sign_in_without_token_is_not_configured() {
    let base = spawn_toolkit().await;
    let idp = provider(&base, None);
    let err = idp.sign_in_with_federated_popup().await.unwrap_err();
    assert_eq!(err, IdentityError::NotConfigured("CONTESTHUB_FEDERATED_ID_TOKEN"));
}

#[tokio::test]
async fn transport_failure_does_not_leak_api_key() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let idp = provider(&format!("http://{addr}/v1"), None);
    let err = idp.sign_in("alice@example.com", "right").await.unwrap_err();
    let IdentityError::Transport(message) = err else {
        panic!("expected transport error, got {err:?}");
    };
    assert!(!message.contains("test-key"), "message leaked key: {message}");
}
