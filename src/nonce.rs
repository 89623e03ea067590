//! # Nonce Binding
//!
//! Single-use nonces bind a holder's proof-of-possession to a specific
//! session or access token. A nonce is issued against a binding key,
//! redeemed at most once, and expires with the access window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::session::Expire;
use crate::{Result, generate};

/// Issues and validates single-use nonces. Process-wide; safe to share
/// across concurrent request handlers.
#[derive(Clone, Debug, Default)]
pub struct NonceBinder {
    entries: Arc<Mutex<HashMap<String, NonceEntry>>>,
}

#[derive(Clone, Debug)]
struct NonceEntry {
    bound_to: String,
    expires_at: DateTime<Utc>,
}

impl NonceBinder {
    /// Create an empty binder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh nonce bound to `bound_to` (a session id or access
    /// token). The nonce is unpredictable and unique among live entries.
    #[must_use]
    pub fn issue(&self, bound_to: &str) -> String {
        let mut entries = self.lock();
        loop {
            let nonce = generate::nonce();
            if entries.contains_key(&nonce) {
                continue;
            }
            entries.insert(nonce.clone(), NonceEntry {
                bound_to: bound_to.to_string(),
                expires_at: Utc::now() + Expire::Access.duration(),
            });
            return nonce;
        }
    }

    /// Redeem a nonce, returning the key it was bound to. Single-use: a
    /// second redemption fails.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownNonce` when the nonce has no live entry and
    /// `Error::InvalidOrExpiredNonce` when the entry has expired.
    pub fn redeem(&self, nonce: &str) -> Result<String> {
        let Some(entry) = self.lock().remove(nonce) else {
            return Err(Error::UnknownNonce("nonce has no live mapping entry".to_string()));
        };
        if entry.expires_at < Utc::now() {
            return Err(Error::InvalidOrExpiredNonce("nonce has expired".to_string()));
        }
        Ok(entry.bound_to)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, NonceEntry>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_use() {
        let binder = NonceBinder::new();
        let nonce = binder.issue("token-1");

        assert_eq!(binder.redeem(&nonce).expect("should redeem"), "token-1");
        assert!(matches!(binder.redeem(&nonce), Err(Error::UnknownNonce(_))));
    }

    #[test]
    fn unique() {
        let binder = NonceBinder::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(binder.issue("token")));
        }
    }
}
