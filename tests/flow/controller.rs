//! Controller edge cases: replay guard, exchange failures, cleanup, sync.

use std::sync::Arc;
use std::time::Duration;

use feed_oidc::{
    AccessToken, CallbackOutcome, CallbackParams, FlowPhase, IdentitySync, KeyValueStore,
    MemoryStore, OidcError, OidcFlowController, OidcFlowOptions, OIDC_STATE_KEY,
    PKCE_VERIFIER_KEY, TOKEN_STORAGE_KEY,
};
use serde_json::json;

use crate::common::*;

fn callback(code: &str, state: &str) -> CallbackParams {
    CallbackParams {
        code: Some(code.to_string()),
        state: Some(state.to_string()),
        ..Default::default()
    }
}

// ============================================================================
// Replay / CSRF guard
// ============================================================================

#[tokio::test]
async fn state_mismatch_never_reaches_transport() {
    let mut h = harness();
    h.controller.initiate(false).unwrap();
    h.transport.reply(
        TOKEN_URL,
        200,
        token_response(&token_with(NOW + 3600, &["feed_user"])),
    );

    let err = h
        .controller
        .handle_callback(&callback("abc123", "forged-state"))
        .await
        .unwrap_err();

    assert!(matches!(err, OidcError::StateMismatch));
    assert_eq!(
        err.to_string(),
        "Invalid authentication state. Please try logging in again."
    );
    assert!(h.transport.requests().is_empty());
    assert!(h.ephemeral.is_empty());
    assert!(h.tokens.is_empty());
    assert_eq!(h.controller.phase(), FlowPhase::Idle);
}

#[tokio::test]
async fn callback_without_stored_flow_is_rejected() {
    let mut h = harness();
    let err = h
        .controller
        .handle_callback(&callback("abc123", "some-state"))
        .await
        .unwrap_err();
    assert!(matches!(err, OidcError::StateMismatch));
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn stored_state_without_verifier_is_rejected() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.ephemeral.remove(PKCE_VERIFIER_KEY).unwrap();

    let err = h
        .controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap_err();
    assert!(matches!(err, OidcError::StateMismatch));
    assert!(h.transport.requests().is_empty());
    assert!(h.ephemeral.is_empty());
}

#[tokio::test]
async fn replayed_callback_after_success_is_rejected() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport.reply(
        TOKEN_URL,
        200,
        token_response(&token_with(NOW + 3600, &["feed_user"])),
    );
    let params = callback("abc123", &request.state);

    h.controller.handle_callback(&params).await.unwrap();
    let err = h.controller.handle_callback(&params).await.unwrap_err();

    assert!(matches!(err, OidcError::StateMismatch));
    assert_eq!(h.transport.requests_to(TOKEN_URL).len(), 1);
}

#[tokio::test]
async fn second_initiate_supersedes_first() {
    let mut h = harness();
    let first = h.controller.initiate(false).unwrap();
    let second = h.controller.initiate(false).unwrap();
    assert_ne!(first.state, second.state);

    let err = h
        .controller
        .handle_callback(&callback("abc123", &first.state))
        .await
        .unwrap_err();
    assert!(matches!(err, OidcError::StateMismatch));
}

// ============================================================================
// Not a callback
// ============================================================================

#[tokio::test]
async fn missing_code_or_state_is_not_a_callback() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.controller.mark_redirected();

    let only_state = CallbackParams {
        state: Some(request.state.clone()),
        ..Default::default()
    };
    let only_code = CallbackParams {
        code: Some("abc123".to_string()),
        ..Default::default()
    };
    for params in [CallbackParams::default(), only_state, only_code] {
        let outcome = h.controller.handle_callback(&params).await.unwrap();
        assert!(matches!(outcome, CallbackOutcome::NotACallback));
    }

    // The pending flow is left alone.
    assert_eq!(h.controller.phase(), FlowPhase::AwaitingCallback);
    assert!(h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap().is_some());
    assert!(h.ephemeral.get(OIDC_STATE_KEY).unwrap().is_some());
    assert!(h.transport.requests().is_empty());
}

// ============================================================================
// Exchange failures
// ============================================================================

#[tokio::test]
async fn non_success_status_carries_status_and_body() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport
        .reply(TOKEN_URL, 400, r#"{"error":"invalid_grant"}"#);

    let err = h
        .controller
        .handle_callback(&callback("stale-code", &request.state))
        .await
        .unwrap_err();

    match &err {
        OidcError::ExchangeFailed { status, body } => {
            assert_eq!(*status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected ExchangeFailed, got {other:?}"),
    }
    assert!(h.ephemeral.is_empty());
    assert!(h.tokens.is_empty());
}

#[tokio::test]
async fn empty_error_body_is_described() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport.reply(TOKEN_URL, 503, "");

    let err = h
        .controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Token exchange failed (503): No response body."
    );
}

#[tokio::test]
async fn success_without_access_token_is_an_error() {
    for body in [
        json!({ "token_type": "Bearer" }).to_string(),
        json!({ "access_token": null }).to_string(),
        "not json".to_string(),
    ] {
        let mut h = harness();
        let request = h.controller.initiate(false).unwrap();
        h.transport.reply(TOKEN_URL, 200, body);

        let err = h
            .controller
            .handle_callback(&callback("abc123", &request.state))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::MissingAccessToken));
        assert_ne!(
            err.to_string(),
            OidcError::AuthorizationDenied.to_string()
        );
        assert!(h.ephemeral.is_empty());
        assert!(h.tokens.is_empty());
    }
}

#[tokio::test]
async fn transport_failure_is_reported_generically() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport.fail(TOKEN_URL, "connection reset by peer");

    let err = h
        .controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap_err();
    assert!(matches!(err, OidcError::Transport(_)));
    assert!(err.user_message().starts_with("Token exchange failed"));
    assert!(h.ephemeral.is_empty());
}

#[tokio::test]
async fn token_without_required_role_is_denied() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport.reply(
        TOKEN_URL,
        200,
        token_response(&token_with(NOW + 3600, &["other_role"])),
    );

    let err = h
        .controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap_err();
    assert!(matches!(err, OidcError::AuthorizationDenied));
    assert!(h.tokens.is_empty());
}

#[tokio::test]
async fn undecodable_token_is_denied() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport
        .reply(TOKEN_URL, 200, token_response("opaque-reference-token"));

    let err = h
        .controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap_err();
    assert!(matches!(err, OidcError::AuthorizationDenied));
}

#[tokio::test]
async fn token_expiring_now_is_denied() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport.reply(
        TOKEN_URL,
        200,
        token_response(&token_with(NOW, &["feed_user"])),
    );

    let err = h
        .controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap_err();
    assert!(matches!(err, OidcError::AuthorizationDenied));
}

#[tokio::test]
async fn roles_read_from_configured_claims_path() {
    let mut h = harness_with(
        endpoints().with_roles_claim_path(["resource_access", "feed-frontend", "roles"]),
    );
    let request = h.controller.initiate(false).unwrap();
    let token = make_token(&json!({
        "exp": NOW + 600,
        "resource_access": { "feed-frontend": { "roles": ["feed_user"] } }
    }));
    h.transport.reply(TOKEN_URL, 200, token_response(&token));

    let outcome = h
        .controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap();
    assert!(matches!(outcome, CallbackOutcome::Authenticated { .. }));
}

// ============================================================================
// Cleanup on every exit path
// ============================================================================

#[tokio::test]
async fn flow_state_erased_when_exchange_is_cancelled() {
    let ephemeral = Arc::new(MemoryStore::new());
    let tokens = Arc::new(MemoryStore::new());
    let mut options = OidcFlowOptions::new(
        endpoints(),
        Arc::new(HangingTransport),
        ephemeral.clone(),
        tokens.clone(),
    );
    options.clock = Some(Arc::new(FixedClock(NOW)));
    let mut controller = OidcFlowController::new(options).unwrap();

    let request = controller.initiate(false).unwrap();
    let params = callback("abc123", &request.state);
    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        controller.handle_callback(&params),
    )
    .await;

    assert!(timed_out.is_err());
    assert!(ephemeral.is_empty());
    assert!(tokens.is_empty());
}

#[tokio::test]
async fn token_store_failure_fails_flow_and_clears_state() {
    let transport = FakeTransport::new();
    let ephemeral = Arc::new(MemoryStore::new());
    let mut options = OidcFlowOptions::new(
        endpoints(),
        transport.clone(),
        ephemeral.clone(),
        Arc::new(ReadOnlyStore::default()),
    );
    options.clock = Some(Arc::new(FixedClock(NOW)));
    let mut controller = OidcFlowController::new(options).unwrap();

    let request = controller.initiate(false).unwrap();
    transport.reply(
        TOKEN_URL,
        200,
        token_response(&token_with(NOW + 3600, &["feed_user"])),
    );
    let err = controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap_err();

    assert!(matches!(err, OidcError::Storage(_)));
    assert!(ephemeral.is_empty());
    assert_eq!(controller.phase(), FlowPhase::Idle);
}

#[tokio::test]
async fn ephemeral_store_failure_aborts_initiate() {
    let mut options = OidcFlowOptions::new(
        endpoints(),
        FakeTransport::new(),
        Arc::new(ReadOnlyStore::default()),
        Arc::new(MemoryStore::new()),
    );
    options.clock = Some(Arc::new(FixedClock(NOW)));
    let mut controller = OidcFlowController::new(options).unwrap();

    let err = controller.initiate(false).unwrap_err();
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(controller.phase(), FlowPhase::Idle);
}

// ============================================================================
// Identity sync (best effort)
// ============================================================================

fn sync_harness() -> (Harness, String) {
    let mut h = harness_with(endpoints().with_user_sync_url(SYNC_URL));
    let request = h.controller.initiate(false).unwrap();
    h.transport.reply(
        TOKEN_URL,
        200,
        token_response(&token_with(NOW + 3600, &["feed_user"])),
    );
    (h, request.state)
}

fn into_identity_sync(outcome: CallbackOutcome) -> (AccessToken, Option<IdentitySync>) {
    match outcome {
        CallbackOutcome::Authenticated {
            token,
            identity_sync,
        } => (token, identity_sync),
        CallbackOutcome::NotACallback => panic!("expected Authenticated"),
    }
}

#[tokio::test]
async fn identity_sync_sends_bearer_token() {
    let (mut h, state) = sync_harness();
    h.transport.reply(SYNC_URL, 201, "");

    let outcome = h
        .controller
        .handle_callback(&callback("abc123", &state))
        .await
        .unwrap();

    // Nothing is sent until the caller runs the sync.
    assert!(h.transport.requests_to(SYNC_URL).is_empty());

    let (token, sync) = into_identity_sync(outcome);
    let sync = sync.expect("sync url configured");
    assert_eq!(sync.url(), SYNC_URL);
    sync.run().await;

    let sent = h.transport.requests_to(SYNC_URL);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].header("Authorization"),
        Some(format!("Bearer {}", token.raw).as_str())
    );
    assert!(sent[0].body.is_empty());

    let urls: Vec<String> = h.transport.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec![TOKEN_URL.to_string(), SYNC_URL.to_string()]);
}

#[tokio::test]
async fn unresponsive_sync_endpoint_does_not_hold_back_login() {
    let (mut h, state) = sync_harness();
    h.transport.hang(SYNC_URL);

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        h.controller.handle_callback(&callback("abc123", &state)),
    )
    .await
    .expect("login resolves without waiting on identity sync")
    .unwrap();

    let (token, sync) = into_identity_sync(outcome);
    assert_eq!(h.controller.phase(), FlowPhase::Authenticated);
    assert_eq!(
        h.tokens.get(TOKEN_STORAGE_KEY).unwrap().as_deref(),
        Some(token.raw.as_str())
    );

    // Spawned and abandoned, the sync hangs on its own.
    let task = tokio::spawn(sync.expect("sync url configured").run());
    let pending = tokio::time::timeout(Duration::from_millis(20), task).await;
    assert!(pending.is_err());
    assert_eq!(h.transport.requests_to(SYNC_URL).len(), 1);
}

#[tokio::test]
async fn identity_sync_failure_is_swallowed() {
    let (mut h, state) = sync_harness();
    h.transport.fail(SYNC_URL, "user service down");

    let outcome = h
        .controller
        .handle_callback(&callback("abc123", &state))
        .await
        .unwrap();
    let (_, sync) = into_identity_sync(outcome);
    sync.expect("sync url configured").run().await;

    assert_eq!(h.controller.phase(), FlowPhase::Authenticated);
    assert!(h.tokens.get(TOKEN_STORAGE_KEY).unwrap().is_some());
    assert_eq!(h.transport.requests_to(SYNC_URL).len(), 1);
}

#[tokio::test]
async fn identity_sync_rejection_is_ignored() {
    let (mut h, state) = sync_harness();
    h.transport.reply(SYNC_URL, 500, "boom");

    let outcome = h
        .controller
        .handle_callback(&callback("abc123", &state))
        .await
        .unwrap();
    let (_, sync) = into_identity_sync(outcome);
    sync.expect("sync url configured").run().await;

    assert_eq!(h.controller.phase(), FlowPhase::Authenticated);
}

#[tokio::test]
async fn no_sync_without_sync_url() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport.reply(
        TOKEN_URL,
        200,
        token_response(&token_with(NOW + 3600, &["feed_user"])),
    );
    let outcome = h
        .controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap();

    let (token, sync) = into_identity_sync(outcome);
    assert!(sync.is_none());
    assert!(h.controller.identity_sync(&token).is_none());
    assert_eq!(h.transport.requests().len(), 1);
}

// ============================================================================
// Session restore / logout
// ============================================================================

#[test]
fn restore_session_returns_valid_token() {
    let h = harness();
    let raw = token_with(NOW + 100, &["feed_user"]);
    h.tokens.set(TOKEN_STORAGE_KEY, &raw).unwrap();

    let token = h.controller.restore_session().unwrap().expect("session");
    assert_eq!(token.raw, raw);
    assert_eq!(token.claims.unwrap().exp, Some(NOW + 100));
}

#[test]
fn restore_session_drops_invalid_tokens() {
    for raw in [
        token_with(NOW - 10, &["feed_user"]),
        token_with(NOW + 100, &["other_role"]),
        "garbage".to_string(),
    ] {
        let h = harness();
        h.tokens.set(TOKEN_STORAGE_KEY, &raw).unwrap();
        assert!(h.controller.restore_session().unwrap().is_none());
        assert!(h.tokens.is_empty());
    }
}

#[test]
fn restore_session_without_token() {
    let h = harness();
    assert!(h.controller.restore_session().unwrap().is_none());
}

#[tokio::test]
async fn logout_forgets_token() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    h.transport.reply(
        TOKEN_URL,
        200,
        token_response(&token_with(NOW + 3600, &["feed_user"])),
    );
    h.controller
        .handle_callback(&callback("abc123", &request.state))
        .await
        .unwrap();

    h.controller.logout().unwrap();
    assert!(h.tokens.is_empty());
    assert_eq!(h.controller.phase(), FlowPhase::Idle);
    assert!(h.controller.restore_session().unwrap().is_none());
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn invalid_configuration_is_rejected() {
    let mut bad = endpoints();
    bad.verifier_bytes = 8;
    let options = OidcFlowOptions::new(
        bad,
        FakeTransport::new(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
    );
    let err = OidcFlowController::new(options).err().expect("rejected");
    assert!(matches!(err, OidcError::Config(_)));
}

#[test]
fn initiate_builds_expected_authorization_url() {
    let mut h = harness();
    let request = h.controller.initiate(false).unwrap();
    let url = url::Url::parse(&request.url).unwrap();
    assert_eq!(url.path(), "/realms/feed/protocol/openid-connect/auth");

    let pairs: std::collections::HashMap<String, String> =
        url.query_pairs().into_owned().collect();
    assert_eq!(pairs["state"], request.state);
    assert_eq!(pairs["code_challenge_method"], "S256");
    assert_eq!(pairs["code_challenge"].len(), 43);
    assert_eq!(pairs["redirect_uri"], "https://feed.example.com/login");
}
