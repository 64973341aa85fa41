use thiserror::Error;

/// Failure modes of an OIDC flow attempt.
///
/// The `Display` text is suitable to show the user directly. Claim decode
/// failures never surface here; they are folded into "expired"/"unauthorized".
#[derive(Debug, Error)]
pub enum OidcError {
    /// The identity provider redirected back with an `error` parameter.
    #[error("Authentication failed: {}", provider_message(.error, .description.as_deref()))]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// The callback `state` did not match the stored one, or nothing was stored.
    #[error("Invalid authentication state. Please try logging in again.")]
    StateMismatch,

    /// The token endpoint answered with a non-2xx status.
    #[error("Token exchange failed ({status}): {}", non_empty_body(.body))]
    ExchangeFailed { status: u16, body: String },

    /// A 2xx token response without a usable `access_token`.
    #[error("Token endpoint did not return an access token.")]
    MissingAccessToken,

    /// The token is expired or carries none of the required roles.
    #[error("Authenticated user is not authorized.")]
    AuthorizationDenied,

    /// Network or connection failure talking to the token endpoint.
    #[error("Token exchange failed: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid OIDC configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] feed_auth::AuthError),
}

impl OidcError {
    /// Message for end users. Transport failures read like exchange failures.
    pub fn user_message(&self) -> String {
        match self {
            OidcError::Transport(_) => {
                "Token exchange failed. Please try logging in again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

fn provider_message(error: &str, description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!("{error}: {d}"),
        _ => error.to_string(),
    }
}

fn non_empty_body(body: &str) -> &str {
    if body.is_empty() {
        "No response body."
    } else {
        body
    }
}

/// Key/value store failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, OidcError>;
