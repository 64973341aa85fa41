//! SHA-256 backend selection.
//!
//! `DigestEngine` holds an optional accelerated backend picked by a
//! capability probe at construction time. The software implementation in
//! [`crate::sha256`] is always present and is used whenever the accelerated
//! backend is missing or reports a failure.

use std::fmt;

use crate::error::CryptoError;
use crate::sha256::sha256;

/// SHA-256 output length in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Known-answer input used to probe a backend before trusting it.
const PROBE_INPUT: &[u8] = b"abc";

/// A SHA-256 implementation.
pub trait Sha256Backend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Hash `data`. Implementations must be bit-exact with FIPS 180-4.
    fn digest(&self, data: &[u8]) -> Result<[u8; DIGEST_LENGTH], CryptoError>;
}

/// Pure-Rust fallback. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareSha256;

impl Sha256Backend for SoftwareSha256 {
    fn name(&self) -> &'static str {
        "software"
    }

    fn digest(&self, data: &[u8]) -> Result<[u8; DIGEST_LENGTH], CryptoError> {
        Ok(sha256(data))
    }
}

/// `sha2`-backed implementation; picks up CPU SHA extensions where the
/// platform exposes them.
#[cfg(feature = "accelerated")]
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceleratedSha256;

#[cfg(feature = "accelerated")]
impl Sha256Backend for AcceleratedSha256 {
    fn name(&self) -> &'static str {
        "sha2"
    }

    fn digest(&self, data: &[u8]) -> Result<[u8; DIGEST_LENGTH], CryptoError> {
        use sha2::{Digest, Sha256};
        let mut out = [0u8; DIGEST_LENGTH];
        out.copy_from_slice(&Sha256::digest(data));
        Ok(out)
    }
}

/// SHA-256 with accelerated/software selection.
pub struct DigestEngine {
    primary: Option<Box<dyn Sha256Backend>>,
    fallback: SoftwareSha256,
}

impl DigestEngine {
    /// Probe for the accelerated backend and use it when it agrees with the
    /// software implementation on a known answer.
    #[cfg(feature = "accelerated")]
    pub fn detect() -> Self {
        Self::with_backend(Box::new(AcceleratedSha256))
    }

    /// Without the `accelerated` feature there is nothing to probe.
    #[cfg(not(feature = "accelerated"))]
    pub fn detect() -> Self {
        Self::software()
    }

    /// Software-only engine.
    pub fn software() -> Self {
        Self {
            primary: None,
            fallback: SoftwareSha256,
        }
    }

    /// Use `backend` as the primary path if it passes the known-answer probe.
    pub fn with_backend(backend: Box<dyn Sha256Backend>) -> Self {
        let expected = sha256(PROBE_INPUT);
        let primary = match backend.digest(PROBE_INPUT) {
            Ok(got) if got == expected => Some(backend),
            Ok(_) => {
                tracing::warn!(
                    backend = backend.name(),
                    "digest backend failed known-answer probe; using software SHA-256"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    backend = backend.name(),
                    error = %e,
                    "digest backend unavailable; using software SHA-256"
                );
                None
            }
        };
        Self {
            primary,
            fallback: SoftwareSha256,
        }
    }

    /// Name of the backend that serves digests first.
    pub fn backend_name(&self) -> &'static str {
        match &self.primary {
            Some(backend) => backend.name(),
            None => self.fallback.name(),
        }
    }

    /// Whether an accelerated backend passed the probe.
    pub fn is_accelerated(&self) -> bool {
        self.primary.is_some()
    }

    /// Hash `data`, falling back to software if the primary backend fails.
    pub fn digest(&self, data: &[u8]) -> [u8; DIGEST_LENGTH] {
        if let Some(backend) = &self.primary {
            match backend.digest(data) {
                Ok(hash) => return hash,
                Err(e) => {
                    tracing::warn!(
                        backend = backend.name(),
                        error = %e,
                        "accelerated digest failed; falling back to software"
                    );
                }
            }
        }
        sha256(data)
    }
}

impl Default for DigestEngine {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Debug for DigestEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestEngine")
            .field("backend", &self.backend_name())
            .finish()
    }
}
