//! # Generate
//!
//! Generate random strings for use in authorization codes, tokens, state,
//! and nonces. Values are drawn from the operating system RNG: nonces bind
//! proofs to sessions, so predictability or collision is a correctness
//! violation rather than a performance concern.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use rand::rngs::OsRng;

const TOKEN_LEN: usize = 32;

/// Generates a base64url-encoded random string for a nonce.
#[must_use]
pub fn nonce() -> String {
    random_token()
}

/// Generates a base64url-encoded random string for `issuer_state`, client
/// state, and by-reference URI tokens.
#[must_use]
pub fn uri_token() -> String {
    random_token()
}

/// Generates a base64url-encoded random string for an authorization code or
/// pre-authorized code.
#[must_use]
pub fn auth_code() -> String {
    random_token()
}

/// Generates a 6-digit numeric transaction code (one-time PIN).
#[must_use]
pub fn tx_code() -> String {
    let mut rng = OsRng;
    (0..6).map(|_| char::from(b'0' + (rng.next_u32() % 10) as u8)).collect()
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn token_shape() {
        let nonce = nonce();
        assert_eq!(nonce.len(), 43); // 32 bytes, base64url, unpadded
        assert!(!nonce.contains('='));
    }

    #[test]
    fn tx_code_shape() {
        let code = tx_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
