//! Authorization request URL and token-exchange form body.

use url::{form_urlencoded, Url};

use crate::config::OidcEndpoints;
use crate::error::{OidcError, Result};
use feed_auth::PkceMaterial;

/// Where to send the user agent to start a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Fully built authorization endpoint URL.
    pub url: String,
    /// The `state` value embedded in `url`.
    pub state: String,
}

/// Build the authorization endpoint URL.
///
/// `is_signup` adds `kc_action=register` so Keycloak opens account creation.
pub fn build_authorization_url(
    endpoints: &OidcEndpoints,
    pkce: &PkceMaterial,
    state: &str,
    is_signup: bool,
) -> Result<Url> {
    let mut url = Url::parse(&endpoints.authorize_url)
        .map_err(|e| OidcError::Config(format!("authorize_url: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &endpoints.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &endpoints.scope)
            .append_pair("redirect_uri", &endpoints.redirect_uri)
            .append_pair("code_challenge_method", pkce.method)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("state", state);
        if is_signup {
            query.append_pair("kc_action", "register");
        }
    }
    Ok(url)
}

/// Form-encoded body for the `authorization_code` grant.
pub fn token_request_body(endpoints: &OidcEndpoints, code: &str, verifier: &str) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", &endpoints.client_id)
        .append_pair("grant_type", "authorization_code")
        .append_pair("code", code)
        .append_pair("redirect_uri", &endpoints.redirect_uri)
        .append_pair("code_verifier", verifier)
        .finish()
}
