//! Hashing and encoding primitives for the feed OIDC client.
//!
//! - SHA-256 with an accelerated backend and a pure software fallback
//! - base64url (unpadded) encode/decode

pub mod base64url;
pub mod digest;
pub mod error;
pub mod sha256;

pub use base64url::{base64url_decode, base64url_encode};
pub use digest::{DigestEngine, Sha256Backend, SoftwareSha256, DIGEST_LENGTH};
#[cfg(feature = "accelerated")]
pub use digest::AcceleratedSha256;
pub use error::CryptoError;
pub use sha256::sha256;
