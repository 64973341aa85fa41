//! Authorization-code + PKCE flow controller.
//!
//! Phases: `Idle -> AwaitingRedirect -> AwaitingCallback -> ExchangingCode ->
//! {Authenticated | Error}`. `Error` drops straight back to `Idle`.
//!
//! The verifier/state pair lives in the ephemeral store between `initiate`
//! and `handle_callback`. Once a callback carries a code and state, that pair
//! is erased exactly once when the attempt ends, whatever the outcome, via
//! [`FlowStateGuard`].

use std::fmt;
use std::sync::Arc;

use feed_auth::{AccessToken, ClaimsInspector, OsRandom, PkceGenerator, RandomSource};
use feed_crypto::DigestEngine;
use serde_json::Value;
use zeroize::Zeroize;

use crate::callback::CallbackParams;
use crate::clock::{Clock, SystemClock};
use crate::config::{OidcEndpoints, OIDC_STATE_KEY, PKCE_VERIFIER_KEY, TOKEN_STORAGE_KEY};
use crate::error::{OidcError, Result};
use crate::request::{build_authorization_url, token_request_body, AuthorizationRequest};
use crate::storage::traits::KeyValueStore;
use crate::transport::Transport;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Where the controller is in the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Idle,
    AwaitingRedirect,
    AwaitingCallback,
    ExchangingCode,
    Authenticated,
    Error,
}

/// Non-error result of [`OidcFlowController::handle_callback`].
#[derive(Debug)]
pub enum CallbackOutcome {
    /// The query carried no `code`/`state`; any pending flow is left as is.
    NotACallback,
    /// The token was validated and committed to the durable store.
    ///
    /// `identity_sync` is present when a `user_sync_url` is configured. It has
    /// not been started: spawn it, bound it with a timeout, or drop it.
    Authenticated {
        token: AccessToken,
        identity_sync: Option<IdentitySync>,
    },
}

/// Best-effort "register this identity" call, detached from the controller.
///
/// Owns everything it needs, so the returned future is `'static + Send`.
/// Failures are logged and swallowed.
#[must_use = "identity sync does nothing unless `run` is awaited or spawned"]
pub struct IdentitySync {
    transport: Arc<dyn Transport>,
    url: String,
    authorization: String,
}

impl IdentitySync {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn run(self) {
        let headers = [("Authorization".to_string(), self.authorization)];
        match self.transport.post(&self.url, &headers, String::new()).await {
            Ok(response) if response.is_success() => {
                tracing::debug!(status = response.status, "identity sync accepted");
            }
            Ok(response) => {
                tracing::debug!(status = response.status, "identity sync rejected; ignoring");
            }
            Err(e) => {
                tracing::debug!(error = %e, "identity sync failed; ignoring");
            }
        }
    }
}

impl fmt::Debug for IdentitySync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySync")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Collaborators and configuration for [`OidcFlowController`].
pub struct OidcFlowOptions {
    pub endpoints: OidcEndpoints,
    pub transport: Arc<dyn Transport>,
    /// Flow-scoped storage for the verifier and expected state.
    pub ephemeral_store: Arc<dyn KeyValueStore>,
    /// Long-lived storage for the committed access token.
    pub token_store: Arc<dyn KeyValueStore>,
    /// Defaults to [`OsRandom`].
    pub random: Option<Arc<dyn RandomSource>>,
    /// Defaults to [`SystemClock`].
    pub clock: Option<Arc<dyn Clock>>,
    /// Defaults to [`DigestEngine::detect`].
    pub digest: Option<DigestEngine>,
}

impl OidcFlowOptions {
    pub fn new(
        endpoints: OidcEndpoints,
        transport: Arc<dyn Transport>,
        ephemeral_store: Arc<dyn KeyValueStore>,
        token_store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            endpoints,
            transport,
            ephemeral_store,
            token_store,
            random: None,
            clock: None,
            digest: None,
        }
    }
}

/// Erases the stored verifier/state when dropped.
///
/// Dropping covers every exit: normal return, `?`, a panic unwinding through
/// the exchange, and the exchange future being dropped mid-await.
struct FlowStateGuard {
    store: Arc<dyn KeyValueStore>,
}

impl FlowStateGuard {
    fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn load(&self) -> Result<(Option<String>, Option<String>)> {
        let verifier = self.store.get(PKCE_VERIFIER_KEY)?;
        let state = self.store.get(OIDC_STATE_KEY)?;
        Ok((verifier, state))
    }
}

impl Drop for FlowStateGuard {
    fn drop(&mut self) {
        erase_flow_state(self.store.as_ref());
    }
}

fn erase_flow_state(store: &dyn KeyValueStore) {
    for key in [PKCE_VERIFIER_KEY, OIDC_STATE_KEY] {
        if let Err(e) = store.remove(key) {
            tracing::warn!(key, error = %e, "failed to erase OIDC flow state");
        }
    }
}

/// Drives one OIDC login at a time against injected storage and transport.
pub struct OidcFlowController {
    endpoints: OidcEndpoints,
    generator: PkceGenerator,
    inspector: ClaimsInspector,
    transport: Arc<dyn Transport>,
    ephemeral: Arc<dyn KeyValueStore>,
    tokens: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    phase: FlowPhase,
}

impl OidcFlowController {
    /// Validate the configuration and assemble the controller.
    pub fn new(options: OidcFlowOptions) -> Result<Self> {
        options.endpoints.validate()?;

        let random = options.random.unwrap_or_else(|| Arc::new(OsRandom));
        let digest = options.digest.unwrap_or_else(DigestEngine::detect);
        tracing::debug!(backend = digest.backend_name(), "OIDC digest backend selected");

        let inspector = ClaimsInspector::new(options.endpoints.roles_claim_path.iter().cloned());

        Ok(Self {
            generator: PkceGenerator::new(random, digest),
            inspector,
            transport: options.transport,
            ephemeral: options.ephemeral_store,
            tokens: options.token_store,
            clock: options.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            endpoints: options.endpoints,
            phase: FlowPhase::Idle,
        })
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    /// Start a flow: fresh PKCE material and state, persisted to the
    /// ephemeral store, and the authorization URL to redirect to.
    ///
    /// `is_signup` biases the identity provider toward account creation.
    pub fn initiate(&mut self, is_signup: bool) -> Result<AuthorizationRequest> {
        let pkce = self.generator.generate(self.endpoints.verifier_bytes)?;
        let state = self.generator.generate_state(self.endpoints.state_bytes)?;
        let url = build_authorization_url(&self.endpoints, &pkce, &state, is_signup)?;

        let persisted = self
            .ephemeral
            .set(PKCE_VERIFIER_KEY, &pkce.verifier)
            .and_then(|()| self.ephemeral.set(OIDC_STATE_KEY, &state));
        if let Err(e) = persisted {
            erase_flow_state(self.ephemeral.as_ref());
            return Err(self.fail(e.into()));
        }

        self.transition(FlowPhase::AwaitingRedirect);
        tracing::info!(signup = is_signup, "OIDC authorization request prepared");
        Ok(AuthorizationRequest {
            url: url.into(),
            state,
        })
    }

    /// Record that the user agent has been sent to the authorization URL.
    pub fn mark_redirected(&mut self) {
        if self.phase == FlowPhase::AwaitingRedirect {
            self.transition(FlowPhase::AwaitingCallback);
        }
    }

    /// Process the redirect back from the identity provider.
    ///
    /// The `state` check happens before any network call. Once a code and
    /// state are present, the stored verifier/state are erased when this
    /// returns, on success and failure alike.
    ///
    /// A query without `code` or `state` (and without `error`) is not a
    /// callback: it yields [`CallbackOutcome::NotACallback`] and leaves the
    /// phase and any pending verifier/state as they were, so a page load that
    /// happens mid-flow does not abandon the login.
    ///
    /// Only the token exchange is awaited. The identity sync is handed back
    /// unstarted in the outcome.
    pub async fn handle_callback(&mut self, params: &CallbackParams) -> Result<CallbackOutcome> {
        if let Some(error) = &params.error {
            erase_flow_state(self.ephemeral.as_ref());
            return Err(self.fail(OidcError::Provider {
                error: error.clone(),
                description: params.error_description.clone(),
            }));
        }

        let (Some(code), Some(returned_state)) = (&params.code, &params.state) else {
            return Ok(CallbackOutcome::NotACallback);
        };

        let guard = FlowStateGuard::new(self.ephemeral.clone());
        let (verifier, expected_state) = match guard.load() {
            Ok(stored) => stored,
            Err(e) => return Err(self.fail(e)),
        };

        let mut verifier = match (verifier, expected_state) {
            (Some(verifier), Some(expected)) if expected == *returned_state => verifier,
            _ => {
                tracing::warn!("OIDC callback state mismatch; aborting before token exchange");
                return Err(self.fail(OidcError::StateMismatch));
            }
        };

        self.transition(FlowPhase::ExchangingCode);
        let result = self.exchange_code(code, &verifier).await;
        verifier.zeroize();
        drop(guard);

        match result {
            Ok(token) => {
                self.transition(FlowPhase::Authenticated);
                tracing::info!("OIDC login complete");
                let identity_sync = self.identity_sync(&token);
                Ok(CallbackOutcome::Authenticated {
                    token,
                    identity_sync,
                })
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Exchange `code` for a token, validate it, and commit it.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<AccessToken> {
        let headers = [("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())];
        let body = token_request_body(&self.endpoints, code, verifier);

        let response = self
            .transport
            .post(&self.endpoints.token_url, &headers, body)
            .await
            .map_err(|e| OidcError::Transport(e.message))?;

        if !response.is_success() {
            return Err(OidcError::ExchangeFailed {
                status: response.status,
                body: response.text,
            });
        }

        let raw = extract_access_token(&response.text).ok_or(OidcError::MissingAccessToken)?;
        let token = self.inspector.inspect(raw);

        let now = self.clock.now_seconds();
        if token.is_expired(now) || !token.is_authorized(&self.endpoints.required_roles) {
            tracing::warn!(
                expired = token.is_expired(now),
                "discarding token that failed authorization checks"
            );
            return Err(OidcError::AuthorizationDenied);
        }

        self.tokens.set(TOKEN_STORAGE_KEY, &token.raw)?;
        Ok(token)
    }

    /// Identity sync for `token`, if a `user_sync_url` is configured.
    pub fn identity_sync(&self, token: &AccessToken) -> Option<IdentitySync> {
        let url = self.endpoints.user_sync_url.clone()?;
        Some(IdentitySync {
            transport: self.transport.clone(),
            url,
            authorization: token.bearer_header(),
        })
    }

    /// Load the committed token, dropping it if it is no longer valid.
    pub fn restore_session(&self) -> Result<Option<AccessToken>> {
        let Some(raw) = self.tokens.get(TOKEN_STORAGE_KEY)? else {
            return Ok(None);
        };
        let token = self.inspector.inspect(raw);
        let now = self.clock.now_seconds();
        if token.is_expired(now) || !token.is_authorized(&self.endpoints.required_roles) {
            tracing::info!("stored access token expired or unauthorized; removing");
            self.tokens.remove(TOKEN_STORAGE_KEY)?;
            return Ok(None);
        }
        Ok(Some(token))
    }

    /// Forget the committed token.
    pub fn logout(&mut self) -> Result<()> {
        self.tokens.remove(TOKEN_STORAGE_KEY)?;
        self.transition(FlowPhase::Idle);
        Ok(())
    }

    fn transition(&mut self, to: FlowPhase) {
        if self.phase != to {
            tracing::debug!(from = ?self.phase, to = ?to, "OIDC flow transition");
            self.phase = to;
        }
    }

    /// Pass through `Error` back to `Idle` and hand the error back.
    fn fail(&mut self, error: OidcError) -> OidcError {
        tracing::warn!(error = %error, "OIDC flow failed");
        self.transition(FlowPhase::Error);
        self.transition(FlowPhase::Idle);
        error
    }
}

/// Non-empty string `access_token` from a token endpoint JSON body.
fn extract_access_token(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.get("access_token")?
        .as_str()
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
