//! Parameters delivered to the redirect URI.

use url::form_urlencoded;

use crate::error::{OidcError, Result};

/// Query parameters of an authorization-response redirect.
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Parse the query of a full redirect URL.
    pub fn from_url(redirect: &str) -> Result<Self> {
        let url = url::Url::parse(redirect)
            .map_err(|e| OidcError::Config(format!("invalid redirect URL: {e}")))?;
        Ok(Self::from_query(url.query().unwrap_or("")))
    }

    /// True when the identity provider reported an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
