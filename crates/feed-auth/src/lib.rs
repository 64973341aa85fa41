//! Client-side authentication primitives for the feed OIDC flow.
//!
//! This crate provides:
//! - PKCE (RFC 7636) verifier/challenge generation, S256 only
//! - Anti-CSRF state tokens
//! - Unsigned inspection of JWT access-token claims (expiry, roles)
//!
//! Token signatures are NOT verified here. Claims are only trusted because
//! the token came straight from the token endpoint.

mod error;
mod jwt;
mod pkce;
mod random;
mod types;

pub use error::AuthError;
pub use jwt::{ClaimsInspector, DEFAULT_ROLES_CLAIM_PATH};
pub use pkce::{
    compute_code_challenge, encoded_len, PkceGenerator, MAX_VERIFIER_LENGTH, MIN_VERIFIER_LENGTH,
    PKCE_METHOD_S256,
};
pub use random::{OsRandom, RandomSource};
pub use types::{AccessToken, DecodedClaims, PkceMaterial};
