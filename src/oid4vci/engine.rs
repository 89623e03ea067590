//! # Issuance Engine
//!
//! Orchestrates credential-offer resolution, authorization, token-to-
//! credential mapping, and (optionally) deferred issuance. All state lives
//! in the injected [`SessionStore`] and the engine-owned [`TokenRegistry`]
//! and [`NonceBinder`]; no locks are held across provider calls.

use anyhow::Context as _;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use ciborium::Value as Cbor;
use serde_json::{Value, json};

use crate::error::{Error, invalid, server};
use crate::format::{self, CredentialFormat, GenerationPath};
use crate::nonce::NonceBinder;
use crate::oid4vci::registry::TokenRegistry;
use crate::oid4vci::types::{
    AuthorizationCodeGrant, CreateOfferRequest, CreateOfferResponse, CredentialOffer,
    CredentialRequest, CredentialResponse, DeferredIssuance, GrantType, Grants,
    IssuanceSessionData, IssuanceState, OfferType, PreAuthorizedCodeGrant, SendType, TxCode,
};
use crate::provider::Provider;
use crate::session::{Expire, Session, SessionStore};
use crate::{JwtType, Kind, Result, generate, proof};

/// Deployment-level issuance configuration.
#[derive(Clone, Debug, Default)]
pub struct IssuerConfig {
    /// When set, `issue_credential` defers generation and returns a
    /// credential id for later polling instead of the credential itself.
    pub deferred: bool,
}

/// Issuer-side session engine.
#[derive(Clone, Debug)]
pub struct IssuanceEngine<P: Provider, S: SessionStore> {
    issuer: String,
    config: IssuerConfig,
    provider: P,
    store: S,
    registry: TokenRegistry,
    nonces: NonceBinder,
}

impl<P: Provider, S: SessionStore> IssuanceEngine<P, S> {
    /// Create an engine for the given issuer identifier.
    pub fn new(issuer: impl Into<String>, config: IssuerConfig, provider: P, store: S) -> Self {
        Self {
            issuer: issuer.into(),
            config,
            provider,
            store,
            registry: TokenRegistry::new(),
            nonces: NonceBinder::new(),
        }
    }

    /// The engine's token registry.
    #[must_use]
    pub const fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// The engine's nonce binder.
    #[must_use]
    pub const fn nonces(&self) -> &NonceBinder {
        &self.nonces
    }

    /// Generate a Credential Offer for use in invoking an issuance flow
    /// with a wallet, by value or by reference.
    ///
    /// # Errors
    ///
    /// Returns an error when the request names no credentials, or when
    /// pre-authorization is requested without a subject.
    pub async fn create_offer(&self, request: CreateOfferRequest) -> Result<CreateOfferResponse> {
        tracing::debug!("create_offer");

        if request.credential_configuration_ids.is_empty() {
            return Err(invalid!("no credentials requested"));
        }
        let grant_types = request.grant_types.clone().unwrap_or_default();
        let pre_authorized = grant_types.contains(&GrantType::PreAuthorizedCode);
        if pre_authorized && request.subject_id.is_none() {
            return Err(invalid!("`subject_id` is required for pre-authorization"));
        }

        let auth_code = generate::auth_code();
        let tx_code = (request.tx_code_required && pre_authorized).then(generate::tx_code);

        let mut grants = Grants::default();
        if pre_authorized {
            grants.pre_authorized_code = Some(PreAuthorizedCodeGrant {
                pre_authorized_code: auth_code.clone(),
                tx_code: tx_code.as_ref().map(|_| TxCode {
                    input_mode: Some("numeric".to_string()),
                    length: Some(6),
                    description: Some("Please provide the one-time code received".to_string()),
                }),
            });
        }
        if grant_types.contains(&GrantType::AuthorizationCode) {
            grants.authorization_code =
                Some(AuthorizationCodeGrant { issuer_state: Some(auth_code.clone()) });
        }
        let has_grants =
            grants.pre_authorized_code.is_some() || grants.authorization_code.is_some();

        let offer = CredentialOffer {
            credential_issuer: self.issuer.clone(),
            credential_configuration_ids: request.credential_configuration_ids.clone(),
            grants: has_grants.then_some(grants),
        };

        // save offer context keyed by the code the wallet will present
        if has_grants {
            let session = Session::with_id(
                &auth_code,
                IssuanceState::Offered {
                    offer: offer.clone(),
                    subject_id: request.subject_id.clone(),
                    tx_code: tx_code.clone(),
                },
                Expire::Authorization,
            );
            self.store.put(&session).await.context("saving offer state")?;
        }

        if request.send_type == SendType::ByVal {
            return Ok(CreateOfferResponse { offer_type: OfferType::Object(offer), tx_code });
        }

        // save the offer for retrieval via the by-reference uri
        let uri_token = generate::uri_token();
        let session = Session::with_id(&uri_token, offer, Expire::Authorization);
        self.store.put(&session).await.context("saving offer")?;

        Ok(CreateOfferResponse {
            offer_type: OfferType::Uri(format!("{}/credential_offer/{uri_token}", self.issuer)),
            tx_code,
        })
    }

    /// Resolve a Credential Offer locator — a by-value query string or a
    /// by-reference URI — into a concrete offer.
    ///
    /// # Errors
    ///
    /// Returns `Error::OfferResolution` when the locator is malformed or
    /// references an offer that cannot be found (or has expired).
    pub async fn resolve_offer(&self, locator: &str) -> Result<CredentialOffer> {
        let locator = locator.trim();
        let locator = locator.strip_prefix("openid-credential-offer://?").unwrap_or(locator);

        if let Some(uri) = locator.strip_prefix("credential_offer_uri=") {
            let decoded: String = serde_urlencoded::from_str::<Vec<(String, String)>>(locator)
                .ok()
                .and_then(|pairs| pairs.into_iter().next().map(|(_, v)| v))
                .unwrap_or_else(|| uri.to_string());
            return self.stored_offer(&decoded).await;
        }
        if locator.contains("/credential_offer/") {
            return self.stored_offer(locator).await;
        }
        if let Some(value) = locator.strip_prefix("credential_offer=") {
            // the parameter value is itself a urlencoded offer, either raw
            // or percent-encoded
            if value.contains("credential_issuer=") {
                return value.parse().map_err(|e| {
                    Error::OfferResolution(format!("malformed credential offer: {e}"))
                });
            }
            let decoded: String = serde_urlencoded::from_str::<Vec<(String, String)>>(&format!(
                "v={value}"
            ))
            .ok()
            .and_then(|pairs| pairs.into_iter().next().map(|(_, v)| v))
            .unwrap_or_else(|| value.to_string());
            return decoded
                .parse()
                .map_err(|e| Error::OfferResolution(format!("malformed credential offer: {e}")));
        }
        if locator.contains("credential_issuer=") {
            return locator
                .parse()
                .map_err(|e| Error::OfferResolution(format!("malformed credential offer: {e}")));
        }

        Err(Error::OfferResolution("unrecognized credential offer locator".to_string()))
    }

    async fn stored_offer(&self, uri: &str) -> Result<CredentialOffer> {
        let Some(id) = uri.rsplit('/').next().filter(|id| !id.is_empty()) else {
            return Err(Error::OfferResolution("offer uri has no identifier".to_string()));
        };
        let session: Option<Session<CredentialOffer>> =
            self.store.get(id).await.context("retrieving offer")?;
        let Some(session) = session.filter(|s| !s.is_expired()) else {
            return Err(Error::OfferResolution(format!("no offer found for {id}")));
        };
        Ok(session.body)
    }

    /// Start an authorization flow for a Holder accepting an offer,
    /// creating a pending session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be saved.
    pub async fn start_authorization(
        &self, offer: &CredentialOffer, holder_id: &str,
    ) -> Result<Session<IssuanceState>> {
        let session = Session::new(
            IssuanceState::Pending {
                subject_id: holder_id.to_string(),
                offer: offer.clone(),
            },
            Expire::Authorization,
        );
        self.store.put(&session).await.context("saving session")?;
        Ok(session)
    }

    /// Stage credential data against a session, to be issued once the
    /// session is promoted and a valid proof arrives.
    pub fn stage_credential(&self, session_id: &str, data: Vec<IssuanceSessionData>) {
        self.registry.stage(session_id, data);
    }

    /// Promote a session to an issued access token: the staged credential
    /// data transfers to the token key, the session becomes locatable by
    /// the token, and a fresh `c_nonce` is issued for the Holder's proof.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoPendingCredential` if nothing was staged for the
    /// session (including when it was already promoted).
    pub async fn promote_session_to_token(&self, session_id: &str, token: &str) -> Result<String> {
        self.registry.promote(session_id, token)?;

        // move the session to token-issued, indexed by the token
        let removed: Option<Session<IssuanceState>> =
            self.store.remove(session_id).await.context("retrieving session")?;
        if let Some(session) = removed.filter(|s| !s.is_expired()) {
            let subject_id = match &session.body {
                IssuanceState::Pending { subject_id, .. }
                | IssuanceState::TokenIssued { subject_id }
                | IssuanceState::Issued { subject_id } => subject_id.clone(),
                IssuanceState::Offered { subject_id, .. } => {
                    subject_id.clone().unwrap_or_default()
                }
            };
            let mut updated = session;
            updated.request_state = Some(token.to_string());
            updated.expires_at = Utc::now() + Expire::Access.duration();
            updated.body = IssuanceState::TokenIssued { subject_id };
            self.store.put(&updated).await.context("saving session")?;
        }

        Ok(self.nonces.issue(token))
    }

    /// Issue the credential requested by a Holder, or defer issuance when
    /// the deployment runs in deferred mode.
    ///
    /// The request's format and proof are validated first: an unsupported
    /// format/doctype combination or a malformed proof fails before any
    /// state is touched, leaving the Holder's nonce live for a corrected
    /// retry. The staged registry entry is read, not consumed.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedFormat` for format/doctype combinations
    /// the engine cannot issue, `Error::InvalidProof` for unusable proofs,
    /// and `Error::UnknownNonce` / `Error::InvalidOrExpiredNonce` for nonce
    /// failures.
    pub async fn issue_credential(&self, request: CredentialRequest) -> Result<CredentialResponse> {
        format::resolve(request.format, request.doctype.as_deref())?;
        let verified = proof::verify(&request.proof, &self.provider).await?;
        let nonce = verified.nonce;

        // the nonce either keys the registry directly or resolves through
        // its single-use binding to an access token
        let key = if self.registry.lookup(&nonce).is_some() {
            nonce
        } else {
            self.nonces.redeem(&nonce)?
        };
        let Some(data) = self.registry.lookup(&key) else {
            return Err(Error::UnknownNonce(format!("no credential data staged for {key}")));
        };
        if data.is_empty() {
            return Err(Error::UnknownNonce(format!("no credential data staged for {key}")));
        }

        if self.config.deferred {
            let credential_id = uuid::Uuid::new_v4().to_string();
            let deferred = Session::with_id(
                &credential_id,
                DeferredIssuance { request, data, token: key },
                Expire::Access,
            );
            self.store.put(&deferred).await.context("saving deferred state")?;
            return Ok(CredentialResponse::Deferred { credential_id });
        }

        let response = self.generate(&request, &data[0]).await?;
        self.record_issued(&key).await?;
        Ok(response)
    }

    /// Re-run generation for a previously deferred credential request.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownCredentialId` when no deferred transaction
    /// exists for the id (or it has expired).
    pub async fn poll_deferred(&self, credential_id: &str) -> Result<CredentialResponse> {
        let state: Option<Session<DeferredIssuance>> =
            self.store.get(credential_id).await.context("retrieving deferred state")?;
        let Some(state) = state.filter(|s| !s.is_expired()) else {
            return Err(Error::UnknownCredentialId(format!(
                "no deferred transaction for {credential_id}"
            )));
        };
        let Some(first) = state.body.data.first() else {
            return Err(server!("deferred state holds no staged data"));
        };

        let response = self.generate(&state.body.request, first).await?;
        self.record_issued(&state.body.token).await?;

        // generation succeeded; the transaction is complete
        self.store
            .remove::<DeferredIssuance>(credential_id)
            .await
            .context("purging deferred state")?;

        Ok(response)
    }

    /// Current state of a session: not-found and expired sessions are
    /// indistinguishable to callers.
    ///
    /// # Errors
    ///
    /// Returns an error when the session does not exist or has expired.
    pub async fn session(&self, id: &str) -> Result<Session<IssuanceState>> {
        let session: Option<Session<IssuanceState>> =
            self.store.get(id).await.context("retrieving session")?;
        session
            .filter(|s| !s.is_expired())
            .ok_or_else(|| invalid!("session {id} not found or expired"))
    }

    async fn generate(
        &self, request: &CredentialRequest, data: &IssuanceSessionData,
    ) -> Result<CredentialResponse> {
        match format::resolve(request.format, request.doctype.as_deref())? {
            GenerationPath::Jwt => self.generate_jwt(request.format, data).await,
            GenerationPath::Mdoc => {
                let doctype = request.doctype.as_deref().unwrap_or_default();
                self.generate_mdoc(doctype, data).await
            }
        }
    }

    // Sign the staged claims dataset as a compact JWS.
    async fn generate_jwt(
        &self, format: CredentialFormat, data: &IssuanceSessionData,
    ) -> Result<CredentialResponse> {
        let kid = self
            .provider
            .verification_method(&data.key_id)
            .await
            .context("resolving verification method")?;
        let header = json!({"alg": "ES256", "typ": JwtType::Jwt.to_string(), "kid": kid});

        let mut claims = data.request.clone();
        if let Value::Object(map) = &mut claims {
            map.insert("iss".to_string(), Value::String(data.issuer.clone()));
            map.insert("iat".to_string(), json!(Utc::now().timestamp()));
        }

        let header_b64 = Base64UrlUnpadded::encode_string(
            &serde_json::to_vec(&header).context("encoding header")?,
        );
        let claims_b64 = Base64UrlUnpadded::encode_string(
            &serde_json::to_vec(&claims).context("encoding claims")?,
        );
        let msg = format!("{header_b64}.{claims_b64}");
        let signature =
            self.provider.sign(&data.key_id, msg.as_bytes()).await.context("signing credential")?;
        let jws = format!("{msg}.{}", Base64UrlUnpadded::encode_string(&signature));

        Ok(CredentialResponse::Issued {
            format,
            credential: Kind::String(jws),
            custom_parameters: None,
        })
    }

    // Sign the staged claims dataset as a COSE_Sign1 envelope.
    async fn generate_mdoc(
        &self, doctype: &str, data: &IssuanceSessionData,
    ) -> Result<CredentialResponse> {
        // ES256 protected header
        let protected_map = Cbor::Map(vec![(Cbor::Integer(1.into()), Cbor::Integer((-7).into()))]);
        let mut protected = Vec::new();
        ciborium::ser::into_writer(&protected_map, &mut protected)
            .context("encoding protected header")?;

        let payload_value = json!({
            "docType": doctype,
            "issuer": data.issuer,
            "claims": data.request,
        });
        let mut payload = Vec::new();
        ciborium::ser::into_writer(&payload_value, &mut payload).context("encoding payload")?;

        // Sig_structure for COSE_Sign1 with no external AAD
        let sig_structure = Cbor::Array(vec![
            Cbor::Text("Signature1".to_string()),
            Cbor::Bytes(protected.clone()),
            Cbor::Bytes(vec![]),
            Cbor::Bytes(payload.clone()),
        ]);
        let mut msg = Vec::new();
        ciborium::ser::into_writer(&sig_structure, &mut msg).context("encoding Sig_structure")?;
        let signature =
            self.provider.sign(&data.key_id, &msg).await.context("signing credential")?;

        let cose_sign1 = Cbor::Tag(
            18,
            Box::new(Cbor::Array(vec![
                Cbor::Bytes(protected),
                Cbor::Map(vec![]),
                Cbor::Bytes(payload),
                Cbor::Bytes(signature),
            ])),
        );
        let mut envelope = Vec::new();
        ciborium::ser::into_writer(&cose_sign1, &mut envelope).context("encoding COSE_Sign1")?;

        Ok(CredentialResponse::Issued {
            format: CredentialFormat::MsoMdoc,
            credential: Kind::String(Base64UrlUnpadded::encode_string(&envelope)),
            custom_parameters: None,
        })
    }

    // Transition the session located by the token to issued. Sessions keyed
    // directly by nonce (pre-authorized flows) have no token index to update.
    async fn record_issued(&self, token: &str) -> Result<()> {
        let found: Option<Session<IssuanceState>> =
            self.store.find_by_request_state(token).await.context("locating session")?;
        if let Some(session) = found.filter(|s| !s.is_expired()) {
            let subject_id = match &session.body {
                IssuanceState::Pending { subject_id, .. }
                | IssuanceState::TokenIssued { subject_id }
                | IssuanceState::Issued { subject_id } => subject_id.clone(),
                IssuanceState::Offered { subject_id, .. } => {
                    subject_id.clone().unwrap_or_default()
                }
            };
            let mut updated = session;
            updated.body = IssuanceState::Issued { subject_id };
            self.store.put(&updated).await.context("saving session")?;
        }
        Ok(())
    }
}
