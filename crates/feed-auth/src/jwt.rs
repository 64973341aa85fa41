//! Unsigned inspection of compact JWT access tokens.
//!
//! Only the payload segment is read. Any structural problem (missing
//! segment, bad base64url, bad JSON, non-object payload) yields `None`; it is
//! never an error.

use std::collections::BTreeSet;

use feed_crypto::base64url_decode;
use serde_json::{Map, Value};

use crate::types::{AccessToken, DecodedClaims};

/// Where Keycloak puts realm roles: `{"realm_access": {"roles": [...]}}`.
pub const DEFAULT_ROLES_CLAIM_PATH: &[&str] = &["realm_access", "roles"];

/// Decodes token payloads and answers expiry/authorization questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimsInspector {
    roles_path: Vec<String>,
}

impl Default for ClaimsInspector {
    fn default() -> Self {
        Self::new(DEFAULT_ROLES_CLAIM_PATH.iter().map(|s| s.to_string()))
    }
}

impl ClaimsInspector {
    /// Inspector reading roles from the nested object path `roles_path`.
    pub fn new(roles_path: impl IntoIterator<Item = String>) -> Self {
        Self {
            roles_path: roles_path.into_iter().collect(),
        }
    }

    pub fn roles_path(&self) -> &[String] {
        &self.roles_path
    }

    /// Decode the payload (segment 1) of a compact JWT.
    pub fn decode_payload(&self, token: &str) -> Option<DecodedClaims> {
        let segment = token.split('.').nth(1).filter(|s| !s.is_empty())?;
        let bytes = base64url_decode(segment).ok()?;
        let payload: Value = serde_json::from_slice(&bytes).ok()?;
        let obj = payload.as_object()?;

        Some(DecodedClaims {
            exp: read_exp(obj),
            roles: self.read_roles(obj),
        })
    }

    /// Decode `raw` into an [`AccessToken`].
    pub fn inspect(&self, raw: impl Into<String>) -> AccessToken {
        let raw = raw.into();
        let claims = self.decode_payload(&raw);
        AccessToken { raw, claims }
    }

    /// True if the payload is undecodable, has no `exp`, or `exp <= now`.
    pub fn is_expired(&self, token: &str, now_seconds: i64) -> bool {
        self.decode_payload(token)
            .map_or(true, |claims| claims.is_expired(now_seconds))
    }

    /// True iff the decoded roles intersect `required_roles`.
    pub fn is_authorized(&self, token: &str, required_roles: &BTreeSet<String>) -> bool {
        self.decode_payload(token)
            .is_some_and(|claims| claims.has_any_role(required_roles))
    }

    fn read_roles(&self, obj: &Map<String, Value>) -> Option<BTreeSet<String>> {
        let (last, parents) = self.roles_path.split_last()?;
        let mut current = obj;
        for key in parents {
            current = current.get(key)?.as_object()?;
        }
        let roles = current.get(last)?.as_array()?;
        Some(
            roles
                .iter()
                .filter_map(|role| role.as_str().map(str::to_string))
                .collect(),
        )
    }
}

/// `exp` as whole seconds. Fractional values are truncated; anything
/// non-numeric counts as absent.
fn read_exp(obj: &Map<String, Value>) -> Option<i64> {
    let exp = obj.get("exp")?;
    exp.as_i64()
        .or_else(|| exp.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}
