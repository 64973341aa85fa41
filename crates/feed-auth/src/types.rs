use std::collections::BTreeSet;

/// PKCE verifier/challenge pair for one authorization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceMaterial {
    /// Random base64url secret, 43-128 chars. Sent only to the token endpoint.
    pub verifier: String,
    /// `base64url(SHA-256(verifier))`, sent on the authorization request.
    pub challenge: String,
    /// Always `"S256"`.
    pub method: &'static str,
}

/// Claims read from an access token payload without verifying its signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedClaims {
    /// Expiry, seconds since the Unix epoch.
    pub exp: Option<i64>,
    /// Role names found at the configured claims path.
    pub roles: Option<BTreeSet<String>>,
}

impl DecodedClaims {
    /// Expired when `exp` is missing or `exp <= now_seconds`.
    pub fn is_expired(&self, now_seconds: i64) -> bool {
        match self.exp {
            Some(exp) => exp <= now_seconds,
            None => true,
        }
    }

    /// True iff at least one decoded role is in `required`.
    pub fn has_any_role(&self, required: &BTreeSet<String>) -> bool {
        self.roles
            .as_ref()
            .is_some_and(|roles| roles.iter().any(|role| required.contains(role)))
    }
}

/// A compact JWT access token and its (optional) decoded claims.
///
/// `claims` is `None` when the payload segment could not be decoded; such a
/// token is treated exactly like one without `exp`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub raw: String,
    pub claims: Option<DecodedClaims>,
}

impl AccessToken {
    pub fn is_expired(&self, now_seconds: i64) -> bool {
        self.claims
            .as_ref()
            .map_or(true, |claims| claims.is_expired(now_seconds))
    }

    pub fn is_authorized(&self, required: &BTreeSet<String>) -> bool {
        self.claims
            .as_ref()
            .is_some_and(|claims| claims.has_any_role(required))
    }

    /// Value for an HTTP `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.raw)
    }
}

// Keep the raw token out of logs and panic messages.
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("raw", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}
