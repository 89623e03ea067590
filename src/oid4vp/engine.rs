//! # Presentation Engine
//!
//! Orchestrates the verifier side of a presentation exchange: building the
//! Authorization Request Object, tracking the session it opens, and
//! verifying the Wallet's Authorization Response against the Presentation
//! Definition and any registered policies.

use std::sync::Arc;

use anyhow::Context as _;
use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::json;

use crate::error::invalid;
use crate::oid4vp::matching;
use crate::oid4vp::policy::{
    DefinitionConformance, DefinitionLocation, InlineDefinition, PresentationPolicy,
};
use crate::oid4vp::types::{
    AuthorizationResponse, PresentationDefinition, PresentationState, RequestObject, ResponseMode,
    ResponseTarget, ResponseType, VerificationResult,
};
use crate::provider::Provider;
use crate::session::{Expire, Session, SessionStore};
use crate::{JwtType, Result, generate};

/// Deployment-level verification configuration.
#[derive(Clone, Debug, Default)]
pub struct VerifierConfig {
    /// When set, a by-reference Authorization Request also embeds the
    /// Presentation Definition inline. Some interoperability profiles
    /// require the duplicate.
    pub echo_inline_definition: bool,
}

/// Per-request options for building an Authorization Request.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// What the Wallet must present.
    pub definition: PresentationDefinition,

    /// The mechanism the Wallet returns its response by.
    pub response_mode: ResponseMode,
}

/// An opened presentation session and the Authorization Request that
/// drives it.
#[derive(Clone, Debug)]
pub struct InitializedAuthorization {
    /// The session tracking the exchange.
    pub session_id: String,

    /// The request to deliver to the Wallet.
    pub request: RequestObject,
}

/// Verifier-side session engine.
#[derive(Clone)]
pub struct PresentationEngine<P: Provider, S: SessionStore> {
    verifier: String,
    config: VerifierConfig,
    provider: P,
    store: S,
    policies: Vec<Arc<dyn PresentationPolicy>>,
    location: Arc<dyn DefinitionLocation>,
}

impl<P: Provider, S: SessionStore> PresentationEngine<P, S> {
    /// Create an engine for the given verifier identifier, with the
    /// baseline definition-conformance policy and inline definitions.
    pub fn new(verifier: impl Into<String>, config: VerifierConfig, provider: P, store: S) -> Self {
        Self {
            verifier: verifier.into(),
            config,
            provider,
            store,
            policies: vec![Arc::new(DefinitionConformance)],
            location: Arc::new(InlineDefinition),
        }
    }

    /// Register an additional policy, evaluated after those already
    /// registered.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn PresentationPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Replace the definition location strategy.
    #[must_use]
    pub fn with_location(mut self, location: Arc<dyn DefinitionLocation>) -> Self {
        self.location = location;
        self
    }

    /// Open a presentation session and build the Authorization Request to
    /// send to the Wallet.
    ///
    /// The response mode determines which return endpoint the request
    /// carries: redirect-based modes populate `redirect_uri`, direct-post
    /// modes populate `response_uri`, never both.
    ///
    /// # Errors
    ///
    /// Returns an error when the definition requests nothing, or the
    /// session cannot be saved.
    pub async fn initialize_authorization(
        &self, options: RequestOptions,
    ) -> Result<InitializedAuthorization> {
        tracing::debug!("initialize_authorization");

        if options.definition.input_descriptors.is_empty() {
            return Err(invalid!("presentation definition has no input descriptors"));
        }

        let state = generate::uri_token();
        let mut request = RequestObject {
            response_type: ResponseType::VpToken,
            client_id: self.verifier.clone(),
            response_mode: options.response_mode,
            redirect_uri: None,
            response_uri: None,
            nonce: generate::nonce(),
            state: Some(state.clone()),
            scope: None,
            presentation_definition: None,
            presentation_definition_uri: None,
        };
        match options.response_mode.target() {
            ResponseTarget::Redirect => {
                request.redirect_uri = Some(format!("{}/callback", self.verifier));
            }
            ResponseTarget::Response => {
                request.response_uri = Some(format!("{}/post", self.verifier));
            }
        }
        match self.location.reference_uri(&options.definition) {
            Some(uri) => {
                request.presentation_definition_uri = Some(uri);
                if self.config.echo_inline_definition {
                    request.presentation_definition = Some(options.definition.clone());
                }
            }
            None => request.presentation_definition = Some(options.definition.clone()),
        }

        let mut session = Session::new(
            PresentationState::RequestIssued {
                request: request.clone(),
                definition: options.definition,
            },
            Expire::Request,
        );
        session.request_state = Some(state);
        self.store.put(&session).await.context("saving session")?;

        Ok(InitializedAuthorization { session_id: session.id, request })
    }

    /// Verify a Wallet's Authorization Response and record the outcome.
    ///
    /// The response is decoded and parsed before any state is touched; a
    /// malformed response fails without mutating the session. A response
    /// that parses but fails a policy records a failed outcome, and the
    /// session remains queryable either way.
    ///
    /// # Errors
    ///
    /// Returns an error when the response names no live session or its
    /// envelopes cannot be decoded.
    pub async fn verify(&self, response: AuthorizationResponse) -> Result<VerificationResult> {
        tracing::debug!("verify");

        let Some(state) = response.state.as_deref() else {
            return Err(invalid!("authorization response carries no state"));
        };
        let found: Option<Session<PresentationState>> =
            self.store.find_by_request_state(state).await.context("locating session")?;
        let Some(session) = found.filter(|s| !s.is_expired()) else {
            return Err(invalid!("no presentation session for state {state}"));
        };
        let PresentationState::RequestIssued { request, definition } = session.body.clone() else {
            return Err(invalid!("presentation session is not awaiting a response"));
        };
        if response.vp_token.is_empty() {
            return Err(invalid!("vp_token is empty"));
        }

        // fail fast on undecodable envelopes, before any state moves
        matching::presented_types(&response.vp_token.to_vec())?;

        let mut received = session.clone();
        received.body = PresentationState::ResponseReceived {
            request: request.clone(),
            definition: definition.clone(),
        };
        self.store.put(&received).await.context("saving session")?;

        let result = self.evaluate(&response, &request, &definition);

        let mut verified = received;
        verified.body =
            PresentationState::Verified { request, result: result.clone() };
        self.store.put(&verified).await.context("saving session")?;

        Ok(result)
    }

    // Run the nonce binding check and the registered policies, mapping the
    // first failure into a recorded outcome.
    fn evaluate(
        &self, response: &AuthorizationResponse, request: &RequestObject,
        definition: &PresentationDefinition,
    ) -> VerificationResult {
        for token in response.vp_token.to_vec() {
            if matching::envelope_nonce(&token).ok().flatten().as_deref() != Some(&request.nonce) {
                return VerificationResult {
                    verified: false,
                    missing_credential_types: vec![],
                    detail: Some("presentation is not bound to the request nonce".to_string()),
                };
            }
        }

        for policy in &self.policies {
            match policy.evaluate(response, request, definition) {
                Ok(()) => {}
                Err(crate::Error::PresentationMismatch { missing_credential_types }) => {
                    return VerificationResult {
                        verified: false,
                        missing_credential_types,
                        detail: None,
                    };
                }
                Err(e) => {
                    return VerificationResult {
                        verified: false,
                        missing_credential_types: vec![],
                        detail: Some(format!("{}: {e}", policy.name())),
                    };
                }
            }
        }

        VerificationResult { verified: true, missing_credential_types: vec![], detail: None }
    }

    /// Current state of a session: not-found and expired sessions are
    /// indistinguishable to callers.
    ///
    /// # Errors
    ///
    /// Returns an error when the session does not exist or has expired.
    pub async fn session(&self, id: &str) -> Result<Session<PresentationState>> {
        let session: Option<Session<PresentationState>> =
            self.store.get(id).await.context("retrieving session")?;
        session
            .filter(|s| !s.is_expired())
            .ok_or_else(|| invalid!("session {id} not found or expired"))
    }

    /// The Presentation Definition referenced by an open session, for
    /// serving by-reference requests.
    ///
    /// # Errors
    ///
    /// Returns an error when the session does not exist, has expired, or
    /// no longer carries a definition.
    pub async fn definition(&self, session_id: &str) -> Result<PresentationDefinition> {
        let session = self.session(session_id).await?;
        match session.body {
            PresentationState::RequestIssued { definition, .. }
            | PresentationState::ResponseReceived { definition, .. } => Ok(definition),
            _ => Err(invalid!("session {session_id} carries no presentation definition")),
        }
    }

    /// Sign an Authorization Request as a Request Object JWT
    /// (`oauth-authz-req+jwt`), for delivery by reference via `request_uri`.
    ///
    /// # Errors
    ///
    /// Returns an error when the verification method cannot be resolved or
    /// signing fails.
    pub async fn sign_request(&self, request: &RequestObject, key_id: &str) -> Result<String> {
        let kid = self
            .provider
            .verification_method(key_id)
            .await
            .context("resolving verification method")?;
        let header =
            json!({"alg": "ES256", "typ": JwtType::OauthAuthzReqJwt.to_string(), "kid": kid});

        let header_b64 = Base64UrlUnpadded::encode_string(
            &serde_json::to_vec(&header).context("encoding header")?,
        );
        let claims_b64 = Base64UrlUnpadded::encode_string(
            &serde_json::to_vec(request).context("encoding request object")?,
        );
        let msg = format!("{header_b64}.{claims_b64}");
        let signature =
            self.provider.sign(key_id, msg.as_bytes()).await.context("signing request object")?;

        Ok(format!("{msg}.{}", Base64UrlUnpadded::encode_string(&signature)))
    }
}
