//! # Sessions
//!
//! Sessions persist request information between steps in an issuance or
//! presentation flow. A session is a value snapshot: mutation replaces the
//! stored value for its id atomically, never updates it in place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A session tracks one authorization flow from initialization to its
/// terminal state. `T` holds the flow-specific state machine.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Session<T> {
    /// Unique, opaque session identifier. The primary store key.
    pub id: String,

    /// Alternate request-state token (client `state`, access token) the
    /// session can be located by when the caller does not hold the id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_state: Option<String>,

    /// Time the session was created.
    pub created_at: DateTime<Utc>,

    /// Time the session should expire.
    pub expires_at: DateTime<Utc>,

    /// Flow state, including any verification or issuance outcome.
    pub body: T,
}

impl<T> Session<T> {
    /// Create a session with a generated (uuid v4) identifier.
    #[must_use]
    pub fn new(body: T, expire: Expire) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), body, expire)
    }

    /// Create a session keyed by a caller-supplied identifier (a
    /// by-reference uri token, a deferred transaction id).
    #[must_use]
    pub fn with_id(id: impl Into<String>, body: T, expire: Expire) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            request_state: None,
            created_at: now,
            expires_at: now + expire.duration(),
            body,
        }
    }

    /// Determines whether the session has expired or not.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.signed_duration_since(Utc::now()).num_seconds() < 0
    }
}

/// The duration for which a session is valid.
pub enum Expire {
    /// Authorization flow expiration (offer accepted, token not yet
    /// issued).
    Authorization,

    /// Access expiration (token issued, credential not yet collected).
    Access,

    /// Authorization Request expiration (presentation flow).
    Request,
}

impl Expire {
    /// Duration of the session state.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        match self {
            Self::Authorization | Self::Request => TimeDelta::try_minutes(5).unwrap_or_default(),
            Self::Access => TimeDelta::try_minutes(15).unwrap_or_default(),
        }
    }
}

/// The `SessionStore` trait is implemented to provide concrete storage and
/// retrieval of sessions between requests.
///
/// `get` after `put` for the same id returns the most recently put value;
/// put/get/remove for a single id are atomic. Expiration is checked by
/// callers, not the store: `get` returns expired sessions and the engines
/// treat them as absent.
pub trait SessionStore: Send + Sync {
    /// Store a session keyed by its id, replacing any previous value.
    fn put<T: Serialize + Send + Sync>(
        &self, session: &Session<T>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Retrieve a session by id.
    fn get<T: DeserializeOwned>(
        &self, id: &str,
    ) -> impl Future<Output = Result<Option<Session<T>>>> + Send;

    /// Remove and return a session by id.
    fn remove<T: DeserializeOwned>(
        &self, id: &str,
    ) -> impl Future<Output = Result<Option<Session<T>>>> + Send;

    /// Locate a session by its alternate request-state token. A linear scan
    /// is acceptable; an index is an optimization.
    fn find_by_request_state<T: DeserializeOwned>(
        &self, token: &str,
    ) -> impl Future<Output = Result<Option<Session<T>>>> + Send;
}

/// In-memory, process-wide session store. Suitable for single-process
/// deployments and tests; durable deployments implement [`SessionStore`]
/// over their own storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, StoredSession>>>,
}

#[derive(Debug)]
struct StoredSession {
    data: Vec<u8>,
    request_state: Option<String>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredSession>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    async fn put<T: Serialize + Send + Sync>(&self, session: &Session<T>) -> Result<()> {
        let data = serde_json::to_vec(session)?;
        let stored = StoredSession { data, request_state: session.request_state.clone() };
        self.lock().insert(session.id.clone(), stored);
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, id: &str) -> Result<Option<Session<T>>> {
        let data = self.lock().get(id).map(|stored| stored.data.clone());
        data.map(|bytes| Ok(serde_json::from_slice(&bytes)?)).transpose()
    }

    async fn remove<T: DeserializeOwned>(&self, id: &str) -> Result<Option<Session<T>>> {
        let removed = self.lock().remove(id);
        removed.map(|stored| Ok(serde_json::from_slice(&stored.data)?)).transpose()
    }

    async fn find_by_request_state<T: DeserializeOwned>(
        &self, token: &str,
    ) -> Result<Option<Session<T>>> {
        let data = self
            .lock()
            .values()
            .find(|stored| stored.request_state.as_deref() == Some(token))
            .map(|stored| stored.data.clone());
        data.map(|bytes| Ok(serde_json::from_slice(&bytes)?)).transpose()
    }
}
