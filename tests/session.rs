//! Session store semantics: read-your-write visibility, alternate-token
//! lookup, and expired sessions being treated as absent by the engines.

mod utils;

use chrono::{TimeDelta, Utc};
use oid4vc_engine::oid4vci::{IssuanceEngine, IssuanceState, IssuerConfig};
use oid4vc_engine::{Expire, MemoryStore, Session, SessionStore};
use utils::{ISSUER, MockProvider};

#[tokio::test]
async fn read_your_write() {
    let store = MemoryStore::new();
    let session = Session::new("flow state".to_string(), Expire::Authorization);

    store.put(&session).await.expect("should save");
    let found: Session<String> =
        store.get(&session.id).await.expect("should read").expect("session exists");
    assert_eq!(found, session);

    // replacement is whole-value
    let mut updated = session.clone();
    updated.body = "updated state".to_string();
    store.put(&updated).await.expect("should save");
    let found: Session<String> =
        store.get(&session.id).await.expect("should read").expect("session exists");
    assert_eq!(found.body, "updated state");

    let removed: Session<String> =
        store.remove(&session.id).await.expect("should remove").expect("session exists");
    assert_eq!(removed.body, "updated state");
    assert!(store.get::<String>(&session.id).await.expect("should read").is_none());
}

#[tokio::test]
async fn find_by_request_state() {
    let store = MemoryStore::new();
    let mut session = Session::new("flow state".to_string(), Expire::Access);
    session.request_state = Some("access-token-1".to_string());
    store.put(&session).await.expect("should save");

    let found: Session<String> = store
        .find_by_request_state("access-token-1")
        .await
        .expect("should read")
        .expect("session exists");
    assert_eq!(found.id, session.id);

    assert!(
        store.find_by_request_state::<String>("unknown").await.expect("should read").is_none()
    );
}

#[tokio::test]
async fn expired_session_is_absent() {
    let store = MemoryStore::new();
    let engine = IssuanceEngine::new(ISSUER, IssuerConfig::default(), MockProvider, store.clone());

    let mut session = Session::new(
        IssuanceState::Pending {
            subject_id: "normal_user".to_string(),
            offer: oid4vc_engine::oid4vci::CredentialOffer {
                credential_issuer: ISSUER.to_string(),
                credential_configuration_ids: vec!["EmployeeID_JWT".to_string()],
                grants: None,
            },
        },
        Expire::Authorization,
    );
    session.expires_at = Utc::now() - TimeDelta::try_minutes(1).unwrap();
    store.put(&session).await.expect("should save");

    // the store still holds the value; the engine treats it as absent
    assert!(
        store.get::<IssuanceState>(&session.id).await.expect("should read").is_some()
    );
    assert!(engine.session(&session.id).await.is_err());
}
