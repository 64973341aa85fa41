use crate::error::AuthError;

/// Cryptographically secure byte source.
pub trait RandomSource: Send + Sync {
    /// Return exactly `n` random bytes.
    fn next_bytes(&self, n: usize) -> Result<Vec<u8>, AuthError>;
}

/// Operating-system CSPRNG via `getrandom`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn next_bytes(&self, n: usize) -> Result<Vec<u8>, AuthError> {
        let mut bytes = vec![0u8; n];
        getrandom::getrandom(&mut bytes).map_err(|e| AuthError::RngFailed(e.to_string()))?;
        Ok(bytes)
    }
}

/// Draw `n` bytes and check the source honoured the requested length.
pub(crate) fn draw(rng: &dyn RandomSource, n: usize) -> Result<Vec<u8>, AuthError> {
    let bytes = rng.next_bytes(n)?;
    if bytes.len() != n {
        return Err(AuthError::ShortRandom {
            expected: n,
            got: bytes.len(),
        });
    }
    Ok(bytes)
}
