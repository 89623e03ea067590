//! # Token Registry
//!
//! Maps session identifiers — and, after promotion, access tokens — to the
//! credential data pre-staged for them. Decouples "what will be issued"
//! from "to whom, when presented": staging happens when an offer is
//! accepted, promotion when the token is issued, and lookup when a proof
//! arrives.
//!
//! Promotion is a one-time, one-way transfer: the staged entries move from
//! the session key to the token key, so at most one redemption path exists
//! per token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::Result;
use crate::error::Error;
use crate::oid4vci::types::IssuanceSessionData;

/// Process-wide mapping from session id / access token to pre-staged
/// credential data. Safe to share across concurrent request handlers.
#[derive(Clone, Debug, Default)]
pub struct TokenRegistry {
    entries: Arc<Mutex<HashMap<String, Vec<IssuanceSessionData>>>>,
}

impl TokenRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage credential data against a session id, replacing anything
    /// previously staged for it.
    pub fn stage(&self, session_id: &str, data: Vec<IssuanceSessionData>) {
        self.lock().insert(session_id.to_string(), data);
    }

    /// Transfer the staged entries from `session_id` to `token`. The
    /// transfer consumes the session key: after promotion only `token`
    /// resolves, and a second promotion for the same session fails.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoPendingCredential` if nothing is staged for
    /// `session_id`.
    pub fn promote(&self, session_id: &str, token: &str) -> Result<()> {
        let mut entries = self.lock();
        let Some(data) = entries.remove(session_id) else {
            return Err(Error::NoPendingCredential(format!(
                "no credential data staged for session {session_id}"
            )));
        };
        entries.insert(token.to_string(), data);
        Ok(())
    }

    /// Look up the entries staged against a key, without consuming them —
    /// deferred polling may re-read the same entries.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Vec<IssuanceSessionData>> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<IssuanceSessionData>>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
