use super::*;
use crate::test_helpers::sample_user;
use crate::types::Role;

fn signed_in(role: Role) -> AuthState {
    AuthState::ready(Some(sample_user("u1", role)))
}

// =============================================================================
// guard
// =============================================================================

#[test]
fn loading_waits_even_without_user() {
    assert_eq!(guard(&AuthState::initial(), "/dashboard"), GuardDecision::Wait);
}

#[test]
fn loading_waits_even_with_user() {
    let state = AuthState { user: Some(sample_user("u1", Role::Admin)), loading: true };
    assert_eq!(guard_with(&state, "/admin", Some(Capability::ModerateUsers)), GuardDecision::Wait);
}

#[test]
fn signed_out_redirects_to_login_with_attempted_path() {
    let decision = guard(&AuthState::ready(None), "/dashboard/profile");
    assert_eq!(
        decision,
        GuardDecision::Redirect { to: "/login".into(), from: "/dashboard/profile".into() }
    );
}

#[test]
fn redirect_then_login_returns_to_attempted_path() {
    let GuardDecision::Redirect { from, .. } = guard(&AuthState::ready(None), "/dashboard/profile") else {
        panic!("expected redirect");
    };
    let after_login = signed_in(Role::User);
    assert_eq!(guard(&after_login, &from), GuardDecision::Render);
    assert_eq!(return_destination(Some(&from)), "/dashboard/profile");
}

#[test]
fn signed_in_renders() {
    assert_eq!(guard(&signed_in(Role::User), "/dashboard"), GuardDecision::Render);
}

#[test]
fn missing_capability_is_forbidden() {
    let decision = guard_with(&signed_in(Role::User), "/contests/new", Some(Capability::CreateContests));
    assert_eq!(decision, GuardDecision::Forbidden { required: Capability::CreateContests });
}

#[test]
fn creator_may_create_but_not_moderate() {
    let creator = signed_in(Role::Creator);
    assert_eq!(guard_with(&creator, "/contests/new", Some(Capability::CreateContests)), GuardDecision::Render);
    assert_eq!(
        guard_with(&creator, "/admin/users", Some(Capability::ModerateUsers)),
        GuardDecision::Forbidden { required: Capability::ModerateUsers }
    );
}

#[test]
fn admin_passes_every_capability() {
    let admin = signed_in(Role::Admin);
    for capability in Role::Admin.capabilities() {
        assert_eq!(guard_with(&admin, "/admin", Some(*capability)), GuardDecision::Render);
    }
}

#[test]
fn decision_serializes_with_tag() {
    let json = serde_json::to_value(GuardDecision::Forbidden { required: Capability::ModerateContests }).unwrap();
    assert_eq!(json, serde_json::json!({ "decision": "forbidden", "required": "moderate_contests" }));
    let json = serde_json::to_value(GuardDecision::Wait).unwrap();
    assert_eq!(json, serde_json::json!({ "decision": "wait" }));
}

// =============================================================================
// helpers
// =============================================================================

#[test]
fn should_redirect_only_when_loaded_and_signed_out() {
    assert!(!should_redirect_unauth(&AuthState::initial()));
    assert!(should_redirect_unauth(&AuthState::ready(None)));
    assert!(!should_redirect_unauth(&signed_in(Role::User)));
}

#[test]
fn return_destination_defaults_home() {
    assert_eq!(return_destination(None), "/");
    assert_eq!(return_destination(Some("")), "/");
    assert_eq!(return_destination(Some("/login")), "/");
    assert_eq!(return_destination(Some("/login/?next=x")), "/");
    assert_eq!(return_destination(Some("https://evil.test/")), "/");
    assert_eq!(return_destination(Some("//evil.test/")), "/");
}

#[test]
fn return_destination_keeps_query() {
    assert_eq!(return_destination(Some("/contests?page=2")), "/contests?page=2");
}
