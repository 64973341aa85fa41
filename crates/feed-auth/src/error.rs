use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Random number generation failed: {0}")]
    RngFailed(String),

    #[error("Random source returned {got} bytes, expected {expected}")]
    ShortRandom { expected: usize, got: usize },

    #[error("Invalid verifier length: {bytes} bytes encode to {chars} chars (must be {min}..={max})")]
    InvalidVerifierLength {
        bytes: usize,
        chars: usize,
        min: usize,
        max: usize,
    },

    #[error("Invalid state length: must be at least 1 byte")]
    InvalidStateLength,

    #[error("Crypto error: {0}")]
    Crypto(#[from] feed_crypto::CryptoError),
}
