//! End-to-end issuance flows: offer creation and resolution, token
//! promotion, proof-bound credential requests, and deferred issuance.

mod utils;

use oid4vc_engine::oid4vci::{
    CreateOfferRequest, CredentialRequest, CredentialResponse, GrantType, IssuanceEngine,
    IssuanceSessionData, IssuanceState, IssuerConfig, SendType,
};
use oid4vc_engine::{CredentialFormat, Error, Kind, MemoryStore};
use serde_json::json;
use utils::{ISSUER, MockProvider, holder_proof};

fn engine() -> IssuanceEngine<MockProvider, MemoryStore> {
    IssuanceEngine::new(ISSUER, IssuerConfig::default(), MockProvider, MemoryStore::new())
}

fn staged_data() -> Vec<IssuanceSessionData> {
    vec![IssuanceSessionData {
        key_id: "issuer-key-1".to_string(),
        issuer: ISSUER.to_string(),
        request: json!({
            "credential_type": "EmployeeID",
            "claims": {"given_name": "Alice", "family_name": "Holder"},
        }),
    }]
}

#[tokio::test]
async fn offer_by_value() {
    let engine = engine();

    let response = engine
        .create_offer(CreateOfferRequest {
            subject_id: Some("normal_user".to_string()),
            credential_configuration_ids: vec!["EmployeeID_JWT".to_string()],
            grant_types: Some(vec![GrantType::PreAuthorizedCode]),
            tx_code_required: true,
            send_type: SendType::ByVal,
        })
        .await
        .expect("should create offer");

    let offer = response.offer_type.as_object().expect("offer is by value");
    assert_eq!(offer.credential_issuer, ISSUER);
    assert_eq!(offer.credential_configuration_ids, vec!["EmployeeID_JWT"]);

    let grant = offer.pre_authorized_code().expect("pre-authorized grant");
    assert_eq!(grant.tx_code.expect("tx code metadata").length, Some(6));
    assert_eq!(response.tx_code.expect("tx code").len(), 6);

    // the offer context is retrievable by the pre-authorized code
    let session = engine.session(&grant.pre_authorized_code).await.expect("session exists");
    assert!(matches!(session.body, IssuanceState::Offered { .. }));
}

#[tokio::test]
async fn offer_by_reference() {
    let engine = engine();

    let response = engine
        .create_offer(CreateOfferRequest {
            subject_id: Some("normal_user".to_string()),
            credential_configuration_ids: vec!["EmployeeID_JWT".to_string()],
            grant_types: Some(vec![GrantType::PreAuthorizedCode]),
            tx_code_required: false,
            send_type: SendType::ByRef,
        })
        .await
        .expect("should create offer");

    let uri = response.offer_type.as_uri().expect("offer is by reference");
    assert!(uri.starts_with(&format!("{ISSUER}/credential_offer/")));

    let offer = engine.resolve_offer(uri).await.expect("should resolve");
    assert_eq!(offer.credential_issuer, ISSUER);
    assert!(offer.pre_authorized_code().is_some());
}

#[tokio::test]
async fn resolve_offer_by_value_locator() {
    let engine = engine();

    let response = engine
        .create_offer(CreateOfferRequest {
            subject_id: Some("normal_user".to_string()),
            credential_configuration_ids: vec!["EmployeeID_JWT".to_string()],
            grant_types: Some(vec![GrantType::PreAuthorizedCode]),
            tx_code_required: false,
            send_type: SendType::ByVal,
        })
        .await
        .expect("should create offer");
    let offer = response.offer_type.as_object().expect("offer is by value");

    let locator = format!("openid-credential-offer://?{}", offer.to_querystring());
    let resolved = engine.resolve_offer(&locator).await.expect("should resolve");
    assert_eq!(&resolved, offer);

    let err = engine.resolve_offer("nonsense").await.expect_err("should not resolve");
    assert!(matches!(err, Error::OfferResolution(_)));
}

#[tokio::test]
async fn promote_exactly_once() {
    let engine = engine();
    let offer = oid4vc_engine::oid4vci::CredentialOffer {
        credential_issuer: ISSUER.to_string(),
        credential_configuration_ids: vec!["EmployeeID_JWT".to_string()],
        grants: None,
    };
    let session = engine.start_authorization(&offer, "normal_user").await.expect("should start");

    engine.stage_credential(&session.id, staged_data());
    engine.promote_session_to_token(&session.id, "token-1").await.expect("should promote");

    // the staged entry was consumed by the first promotion
    let err = engine
        .promote_session_to_token(&session.id, "token-2")
        .await
        .expect_err("second promotion fails");
    assert!(matches!(err, Error::NoPendingCredential(_)));
}

#[tokio::test]
async fn issue_jwt_credential() {
    let engine = engine();
    let offer = oid4vc_engine::oid4vci::CredentialOffer {
        credential_issuer: ISSUER.to_string(),
        credential_configuration_ids: vec!["EmployeeID_JWT".to_string()],
        grants: None,
    };
    let session = engine.start_authorization(&offer, "normal_user").await.expect("should start");
    engine.stage_credential(&session.id, staged_data());
    let c_nonce =
        engine.promote_session_to_token(&session.id, "token-1").await.expect("should promote");

    let response = engine
        .issue_credential(CredentialRequest {
            format: CredentialFormat::JwtVcJson,
            doctype: None,
            proof: holder_proof(&c_nonce),
        })
        .await
        .expect("should issue");

    let CredentialResponse::Issued { format, credential, .. } = response else {
        panic!("issuance should not be deferred");
    };
    assert_eq!(format, CredentialFormat::JwtVcJson);
    let Kind::String(jws) = credential else {
        panic!("credential should be an encoded JWS");
    };
    assert_eq!(jws.split('.').count(), 3);

    // the session reflects issuance
    let session = engine.session(&session.id).await.expect("session exists");
    assert!(matches!(session.body, IssuanceState::Issued { .. }));
}

#[tokio::test]
async fn issue_mdoc_credential() {
    let engine = engine();
    engine.stage_credential("session-1", staged_data());
    let c_nonce =
        engine.promote_session_to_token("session-1", "token-1").await.expect("should promote");

    let response = engine
        .issue_credential(CredentialRequest {
            format: CredentialFormat::MsoMdoc,
            doctype: Some("org.iso.18013.5.1.mDL".to_string()),
            proof: holder_proof(&c_nonce),
        })
        .await
        .expect("should issue");

    let CredentialResponse::Issued { format, .. } = response else {
        panic!("issuance should not be deferred");
    };
    assert_eq!(format, CredentialFormat::MsoMdoc);
}

#[tokio::test]
async fn mdoc_requires_doctype() {
    let engine = engine();
    engine.stage_credential("session-1", staged_data());
    let c_nonce =
        engine.promote_session_to_token("session-1", "token-1").await.expect("should promote");

    let err = engine
        .issue_credential(CredentialRequest {
            format: CredentialFormat::MsoMdoc,
            doctype: None,
            proof: holder_proof(&c_nonce),
        })
        .await
        .expect_err("should not issue");
    assert!(matches!(err, Error::UnsupportedFormat(_)));
}

#[tokio::test]
async fn failed_format_leaves_nonce_live() {
    let engine = engine();
    engine.stage_credential("session-1", staged_data());
    let c_nonce =
        engine.promote_session_to_token("session-1", "token-1").await.expect("should promote");

    // an unsupported format/doctype combination fails before the nonce is
    // redeemed
    let err = engine
        .issue_credential(CredentialRequest {
            format: CredentialFormat::MsoMdoc,
            doctype: None,
            proof: holder_proof(&c_nonce),
        })
        .await
        .expect_err("should not issue");
    assert!(matches!(err, Error::UnsupportedFormat(_)));

    // a corrected retry with the same c_nonce issues
    let response = engine
        .issue_credential(CredentialRequest {
            format: CredentialFormat::JwtVcJson,
            doctype: None,
            proof: holder_proof(&c_nonce),
        })
        .await
        .expect("retry should issue");
    assert!(!response.is_deferred());
}

#[tokio::test]
async fn unknown_nonce_rejected() {
    let engine = engine();
    engine.stage_credential("session-1", staged_data());
    engine.promote_session_to_token("session-1", "token-1").await.expect("should promote");

    let err = engine
        .issue_credential(CredentialRequest {
            format: CredentialFormat::JwtVcJson,
            doctype: None,
            proof: holder_proof("abc"),
        })
        .await
        .expect_err("should not issue");
    assert!(matches!(err, Error::UnknownNonce(_)));
}

#[tokio::test]
async fn nonce_is_single_use() {
    let engine = engine();
    engine.stage_credential("session-1", staged_data());
    let c_nonce =
        engine.promote_session_to_token("session-1", "token-1").await.expect("should promote");

    let request = CredentialRequest {
        format: CredentialFormat::JwtVcJson,
        doctype: None,
        proof: holder_proof(&c_nonce),
    };
    engine.issue_credential(request.clone()).await.expect("first request issues");

    let err = engine.issue_credential(request).await.expect_err("replay fails");
    assert!(matches!(err, Error::UnknownNonce(_)));
}

#[tokio::test]
async fn deferred_issuance() {
    let engine = IssuanceEngine::new(
        ISSUER,
        IssuerConfig { deferred: true },
        MockProvider,
        MemoryStore::new(),
    );
    let offer = oid4vc_engine::oid4vci::CredentialOffer {
        credential_issuer: ISSUER.to_string(),
        credential_configuration_ids: vec!["EmployeeID_JWT".to_string()],
        grants: None,
    };
    let session = engine.start_authorization(&offer, "normal_user").await.expect("should start");
    engine.stage_credential(&session.id, staged_data());
    let c_nonce =
        engine.promote_session_to_token(&session.id, "token-1").await.expect("should promote");

    let response = engine
        .issue_credential(CredentialRequest {
            format: CredentialFormat::JwtVcJson,
            doctype: None,
            proof: holder_proof(&c_nonce),
        })
        .await
        .expect("should defer");
    let CredentialResponse::Deferred { credential_id } = response else {
        panic!("issuance should be deferred");
    };

    // deferral is not issuance
    let pending = engine.session(&session.id).await.expect("session exists");
    assert!(matches!(pending.body, IssuanceState::TokenIssued { .. }));

    let response = engine.poll_deferred(&credential_id).await.expect("should issue");
    assert!(!response.is_deferred());

    // the successful poll records the outcome against the session
    let issued = engine.session(&session.id).await.expect("session exists");
    assert!(matches!(issued.body, IssuanceState::Issued { .. }));

    // the transaction completed with the successful poll
    let err = engine.poll_deferred(&credential_id).await.expect_err("transaction is complete");
    assert!(matches!(err, Error::UnknownCredentialId(_)));
}
