use base64ct::{Base64UrlUnpadded, Encoding};

use crate::error::CryptoError;

/// Base64url encode bytes without padding.
pub fn base64url_encode(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Base64url decode a string to bytes.
///
/// Accepts unpadded input, or input padded with one or two `=` to a multiple
/// of four characters. Unused low bits in a trailing partial group are
/// ignored, so `"YR"` decodes like `"YQ"`.
pub fn base64url_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    let mut unpadded = strip_padding(s)?.to_string();
    let unused_bits = match unpadded.len() % 4 {
        2 => 4,
        3 => 2,
        _ => 0,
    };
    if unused_bits > 0 {
        if let Some(last) = unpadded.pop() {
            unpadded.push(clear_low_bits(last, unused_bits));
        }
    }
    Ok(Base64UrlUnpadded::decode_vec(&unpadded)?)
}

fn strip_padding(s: &str) -> Result<&str, CryptoError> {
    let trimmed = s.trim_end_matches('=');
    match s.len() - trimmed.len() {
        0 => Ok(s),
        1 | 2 if s.len() % 4 == 0 => Ok(trimmed),
        _ => Err(CryptoError::Base64Decode("invalid padding".to_string())),
    }
}

/// `c` with its low `bits` sextet bits zeroed. Non-alphabet characters pass
/// through for the decoder to reject.
fn clear_low_bits(c: char, bits: u32) -> char {
    let Some(value) = ALPHABET.iter().position(|&a| char::from(a) == c) else {
        return c;
    };
    char::from(ALPHABET[value & !((1 << bits) - 1)])
}
