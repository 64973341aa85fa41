use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Digest backend {backend} failed: {reason}")]
    DigestFailed {
        backend: &'static str,
        reason: String,
    },

    #[error("Base64 decode error: {0}")]
    Base64Decode(String),
}

impl From<base64ct::Error> for CryptoError {
    fn from(e: base64ct::Error) -> Self {
        CryptoError::Base64Decode(e.to_string())
    }
}
