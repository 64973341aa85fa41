//! Static OIDC client configuration.

use std::collections::BTreeSet;

use feed_auth::{encoded_len, DEFAULT_ROLES_CLAIM_PATH, MAX_VERIFIER_LENGTH, MIN_VERIFIER_LENGTH};
use serde::{Deserialize, Serialize};

use crate::error::{OidcError, Result};

/// Durable-store key holding the committed access token.
pub const TOKEN_STORAGE_KEY: &str = "feed_access_token";

/// Ephemeral-store key holding the in-flight PKCE verifier.
pub const PKCE_VERIFIER_KEY: &str = "feed_pkce_verifier";

/// Ephemeral-store key holding the expected `state` value.
pub const OIDC_STATE_KEY: &str = "feed_oidc_state";

/// Default OAuth client id of the feed web frontend.
pub const DEFAULT_CLIENT_ID: &str = "feed-frontend";

/// Default space-delimited scope list.
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// Roles allowed to use the feed.
pub const DEFAULT_REQUIRED_ROLES: &[&str] = &["feed_user", "feed_moderator", "feed_admin"];

/// Random bytes behind the PKCE verifier (86 chars once encoded).
pub const DEFAULT_VERIFIER_BYTES: usize = 64;

/// Random bytes behind the `state` parameter.
pub const DEFAULT_STATE_BYTES: usize = 32;

/// Endpoints and policy for one OIDC client. Not mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_required_roles")]
    pub required_roles: BTreeSet<String>,
    /// Object keys leading to the role array inside the token payload.
    #[serde(default = "default_roles_claim_path")]
    pub roles_claim_path: Vec<String>,
    /// Endpoint told about each successful login (best effort).
    #[serde(default)]
    pub user_sync_url: Option<String>,
    #[serde(default = "default_verifier_bytes")]
    pub verifier_bytes: usize,
    #[serde(default = "default_state_bytes")]
    pub state_bytes: usize,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_required_roles() -> BTreeSet<String> {
    DEFAULT_REQUIRED_ROLES.iter().map(|r| r.to_string()).collect()
}

fn default_roles_claim_path() -> Vec<String> {
    DEFAULT_ROLES_CLAIM_PATH.iter().map(|s| s.to_string()).collect()
}

fn default_verifier_bytes() -> usize {
    DEFAULT_VERIFIER_BYTES
}

fn default_state_bytes() -> usize {
    DEFAULT_STATE_BYTES
}

impl OidcEndpoints {
    /// Keycloak realm endpoints served from `origin`, redirecting back to
    /// `{origin}/login`.
    pub fn keycloak(origin: &str, realm: &str, client_id: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        let base = format!("{origin}/realms/{realm}/protocol/openid-connect");
        Self {
            authorize_url: format!("{base}/auth"),
            token_url: format!("{base}/token"),
            client_id: client_id.to_string(),
            redirect_uri: format!("{origin}/login"),
            scope: default_scope(),
            required_roles: default_required_roles(),
            roles_claim_path: default_roles_claim_path(),
            user_sync_url: None,
            verifier_bytes: DEFAULT_VERIFIER_BYTES,
            state_bytes: DEFAULT_STATE_BYTES,
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let endpoints: Self =
            serde_json::from_str(json).map_err(|e| OidcError::Config(e.to_string()))?;
        endpoints.validate()?;
        Ok(endpoints)
    }

    pub fn with_user_sync_url(mut self, url: impl Into<String>) -> Self {
        self.user_sync_url = Some(url.into());
        self
    }

    pub fn with_required_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_roles_claim_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles_claim_path = path.into_iter().map(Into::into).collect();
        self
    }

    /// Check the configuration can drive a flow.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if value.trim().is_empty() {
                return Err(OidcError::Config(format!("{field} must not be empty")));
            }
        }
        url::Url::parse(&self.authorize_url)
            .map_err(|e| OidcError::Config(format!("authorize_url: {e}")))?;
        url::Url::parse(&self.token_url)
            .map_err(|e| OidcError::Config(format!("token_url: {e}")))?;

        if self.required_roles.is_empty() {
            return Err(OidcError::Config(
                "required_roles must name at least one role".to_string(),
            ));
        }
        if self.roles_claim_path.is_empty() {
            return Err(OidcError::Config(
                "roles_claim_path must not be empty".to_string(),
            ));
        }

        let chars = encoded_len(self.verifier_bytes);
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&chars) {
            return Err(OidcError::Config(format!(
                "verifier_bytes {} encodes to {chars} chars, must be {MIN_VERIFIER_LENGTH}..={MAX_VERIFIER_LENGTH}",
                self.verifier_bytes
            )));
        }
        if self.state_bytes == 0 {
            return Err(OidcError::Config("state_bytes must be positive".to_string()));
        }
        Ok(())
    }
}
