//! PKCE (RFC 7636) utilities, S256 method.

use std::sync::Arc;

use crate::error::AuthError;
use crate::random::{draw, RandomSource};
use crate::types::PkceMaterial;
use feed_crypto::{base64url_encode, DigestEngine};
use zeroize::Zeroize;

/// The only supported challenge method.
pub const PKCE_METHOD_S256: &str = "S256";

/// RFC 7636 lower bound on verifier length, in characters.
pub const MIN_VERIFIER_LENGTH: usize = 43;

/// RFC 7636 upper bound on verifier length, in characters.
pub const MAX_VERIFIER_LENGTH: usize = 128;

/// Number of unpadded base64url characters for `bytes` input bytes.
pub const fn encoded_len(bytes: usize) -> usize {
    (bytes * 4 + 2) / 3
}

/// Generate a code challenge from a verifier: `base64url(SHA-256(verifier))`.
pub fn compute_code_challenge(verifier: &str, engine: &DigestEngine) -> String {
    base64url_encode(&engine.digest(verifier.as_bytes()))
}

/// Produces verifiers, challenges and state tokens from a random source.
pub struct PkceGenerator {
    rng: Arc<dyn RandomSource>,
    engine: DigestEngine,
}

impl PkceGenerator {
    pub fn new(rng: Arc<dyn RandomSource>, engine: DigestEngine) -> Self {
        Self { rng, engine }
    }

    pub fn engine(&self) -> &DigestEngine {
        &self.engine
    }

    /// Generate a fresh verifier from `verifier_bytes` random bytes and its
    /// S256 challenge.
    ///
    /// `verifier_bytes` must encode to 43-128 characters (32..=96 bytes).
    pub fn generate(&self, verifier_bytes: usize) -> Result<PkceMaterial, AuthError> {
        let chars = encoded_len(verifier_bytes);
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&chars) {
            return Err(AuthError::InvalidVerifierLength {
                bytes: verifier_bytes,
                chars,
                min: MIN_VERIFIER_LENGTH,
                max: MAX_VERIFIER_LENGTH,
            });
        }

        let mut bytes = draw(self.rng.as_ref(), verifier_bytes)?;
        let verifier = base64url_encode(&bytes);
        bytes.zeroize();
        let challenge = compute_code_challenge(&verifier, &self.engine);
        Ok(PkceMaterial {
            verifier,
            challenge,
            method: PKCE_METHOD_S256,
        })
    }

    /// Generate a random anti-CSRF state parameter of `byte_len` bytes.
    pub fn generate_state(&self, byte_len: usize) -> Result<String, AuthError> {
        if byte_len == 0 {
            return Err(AuthError::InvalidStateLength);
        }
        let bytes = draw(self.rng.as_ref(), byte_len)?;
        Ok(base64url_encode(&bytes))
    }
}

impl std::fmt::Debug for PkceGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceGenerator")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
