//! Request and response types for the presentation engine.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{OneMany, urlencode};

/// The type of response expected from the Wallet (as Authorization Server).
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ResponseType {
    /// A VP Token is returned in an Authorization Response.
    #[default]
    #[serde(rename = "vp_token")]
    VpToken,

    /// A VP Token and a Self-Issued ID Token are returned in an
    /// Authorization Response (provided `scope` is set to "openid").
    #[serde(rename = "vp_token id_token")]
    VpTokenIdToken,

    /// A VP Token is returned in a Token Response.
    #[serde(rename = "code")]
    Code,
}

/// Inform the Wallet of the mechanism to use when returning an
/// Authorization Response.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ResponseMode {
    /// The response parameters are encoded in the query string of the
    /// redirect URI.
    #[serde(rename = "query")]
    Query,

    /// The response parameters are encoded in the fragment of the redirect
    /// URI.
    #[default]
    #[serde(rename = "fragment")]
    Fragment,

    /// The response parameters are posted to the redirect URI by the
    /// Wallet's user agent.
    #[serde(rename = "form_post")]
    FormPost,

    /// The Wallet sends the Authorization Response to an endpoint
    /// controlled by the Verifier as an HTTPS POST request.
    #[serde(rename = "direct_post")]
    DirectPost,

    /// As `direct_post`, except the response is a JWT (JARM).
    #[serde(rename = "direct_post.jwt")]
    DirectPostJwt,
}

/// Which URI field an Authorization Request populates for a response mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseTarget {
    /// The Wallet returns via the Verifier's redirection endpoint
    /// (`redirect_uri`).
    Redirect,

    /// The Wallet posts directly to the Verifier (`response_uri`).
    Response,
}

impl ResponseMode {
    /// The fixed response-mode → URI-field table. Exactly one of
    /// `redirect_uri` / `response_uri` is populated per mode.
    #[must_use]
    pub const fn target(self) -> ResponseTarget {
        match self {
            Self::Query | Self::Fragment | Self::FormPost => ResponseTarget::Redirect,
            Self::DirectPost | Self::DirectPostJwt => ResponseTarget::Response,
        }
    }
}

/// `RequestObject` is used by the Verifier to send an Authorization Request
/// to the Wallet.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RequestObject {
    /// The type of response expected from the Wallet.
    pub response_type: ResponseType,

    /// The Verifier's `client_id`.
    pub client_id: String,

    /// Inform the Wallet of the mechanism to use when returning an
    /// Authorization Response.
    pub response_mode: ResponseMode,

    /// The Verifier's redirection endpoint. Populated for redirect-based
    /// response modes; mutually exclusive with `response_uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// The endpoint the Wallet posts the Authorization Response to.
    /// Populated for direct-post response modes; mutually exclusive with
    /// `redirect_uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_uri: Option<String>,

    /// The nonce securely binding the Verifiable Presentation(s) provided
    /// by the Wallet to this transaction.
    pub nonce: String,

    /// State is used to maintain state between the Authorization Request
    /// and subsequent callback from the Wallet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// A pre-defined scope value representing a Presentation Definition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// The Presentation Definition, embedded inline. Mutually exclusive
    /// with `presentation_definition_uri` (except under the echo-inline
    /// profile override).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<PresentationDefinition>,

    /// A resolvable URI the Presentation Definition can be retrieved from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_definition_uri: Option<String>,
}

impl RequestObject {
    /// URL-encode the Authorization Request as an HTTP query string.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    pub fn url_encode(&self) -> Result<String> {
        urlencode::to_string(self)
    }

    /// Convert a url-encoded query string into a `RequestObject`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be decoded.
    pub fn url_decode(s: &str) -> Result<Self> {
        urlencode::from_str(s)
    }
}

/// A Presentation Definition: the Verifier's declarative requirement for
/// which credential types and fields must be presented. Immutable once
/// created for a session.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    /// A unique identifier for the definition.
    pub id: String,

    /// The purpose shown to the End-User when prompting for consent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Requirements for the credentials to be presented.
    pub input_descriptors: Vec<InputDescriptor>,
}

impl PresentationDefinition {
    /// The set of credential types the definition requires, parsed from
    /// input descriptor constraints. Order follows descriptor order;
    /// duplicates are removed.
    #[must_use]
    pub fn requested_types(&self) -> Vec<String> {
        let mut types = vec![];
        for descriptor in &self.input_descriptors {
            for hint in descriptor.credential_types_hint() {
                if !types.contains(&hint) {
                    types.push(hint);
                }
            }
        }
        types
    }
}

/// A requirement for a single credential within a Presentation Definition.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct InputDescriptor {
    /// A unique identifier for the descriptor within the definition.
    pub id: String,

    /// The purpose shown to the End-User for this descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Constraints the presented credential must satisfy.
    pub constraints: Constraints,
}

impl InputDescriptor {
    /// Credential types this descriptor constrains to, parsed from field
    /// filters over `type`/`vct` paths.
    #[must_use]
    pub fn credential_types_hint(&self) -> Vec<String> {
        let mut hints = vec![];
        for field in &self.constraints.fields {
            if !field.is_type_path() {
                continue;
            }
            let Some(filter) = &field.filter else { continue };
            if let Some(t) = filter.get("const").and_then(Value::as_str) {
                hints.push(t.to_string());
            }
            if let Some(t) =
                filter.get("contains").and_then(|v| v.get("const")).and_then(Value::as_str)
            {
                hints.push(t.to_string());
            }
        }
        hints
    }

    /// Whether a submitted (decoded) credential object structurally
    /// satisfies every required field of this descriptor.
    #[must_use]
    pub fn matches_object(&self, object: &Value) -> bool {
        self.constraints
            .fields
            .iter()
            .filter(|field| !field.optional.unwrap_or(false))
            .all(|field| field.matches_object(object))
    }
}

/// Constraints on the fields of a presented credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Constraints {
    /// Per-field requirements.
    pub fields: Vec<ConstraintsField>,
}

/// A single field requirement: one or more JSON paths, optionally filtered.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConstraintsField {
    /// JSON paths the field may be found at, in order of preference.
    pub path: Vec<String>,

    /// A JSON Schema fragment constraining the field value (`const`,
    /// `contains.const`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,

    /// Whether the field is optional. Defaults to required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

impl ConstraintsField {
    /// Whether any of the field's paths addresses the credential type
    /// (`$.type`, `$.vc.type`, `$.vct`).
    #[must_use]
    pub fn is_type_path(&self) -> bool {
        self.path.iter().any(|p| {
            p.split(&['.', '[']).next_back().is_some_and(|leaf| {
                leaf.trim_end_matches(']') == "type" || leaf.trim_end_matches(']') == "vct"
            })
        })
    }

    fn matches_object(&self, object: &Value) -> bool {
        self.path.iter().any(|path| {
            let Some(value) = lookup_path(object, path) else {
                return false;
            };
            self.filter.as_ref().is_none_or(|filter| filter_matches(filter, value))
        })
    }
}

// Resolve a simple JSONPath (`$.a.b`) against an object.
fn lookup_path<'a>(object: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = object;
    for segment in path.trim_start_matches('$').split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment)?;
    }
    Some(current)
}

fn filter_matches(filter: &Value, value: &Value) -> bool {
    if let Some(expected) = filter.get("const") {
        return value == expected
            || value.as_array().is_some_and(|arr| arr.contains(expected));
    }
    if let Some(expected) = filter.get("contains").and_then(|c| c.get("const")) {
        return value.as_array().is_some_and(|arr| arr.contains(expected));
    }
    // unconstrained filters only require presence
    true
}

/// The Wallet's Authorization Response to a presentation request.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthorizationResponse {
    /// The Verifiable Presentation(s): one or more encoded envelopes.
    pub vp_token: OneMany<String>,

    /// Mapping of the presented credentials to the definition's input
    /// descriptors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<PresentationSubmission>,

    /// The `state` value from the Authorization Request, used to locate
    /// the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Maps presented credentials to the input descriptors they satisfy.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    /// A unique identifier for the submission.
    pub id: String,

    /// The id of the Presentation Definition being answered.
    pub definition_id: String,

    /// Per-descriptor mapping entries.
    pub descriptor_map: Vec<DescriptorMap>,
}

/// A single submission mapping entry.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DescriptorMap {
    /// The input descriptor id this entry answers.
    pub id: String,

    /// The format of the presented credential.
    pub format: String,

    /// JSONPath to the credential within the VP Token.
    pub path: String,
}

/// The recorded outcome of verifying a presentation session.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VerificationResult {
    /// Whether the presentation satisfied the definition and all policies.
    pub verified: bool,

    /// Requested credential types missing from the presentation, when
    /// verification failed on definition conformance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_credential_types: Vec<String>,

    /// Description of the failed policy, when verification failed for any
    /// other reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Presentation session state machine. Transitions are one-way; `Verified`
/// is terminal and remains queryable for audit, whatever the outcome.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum PresentationState {
    /// The session exists but no Authorization Request has been built.
    Initialized,

    /// An Authorization Request has been issued to the Wallet.
    RequestIssued {
        /// The request as sent.
        request: RequestObject,

        /// The definition the request references, kept whole even when
        /// sent by reference.
        definition: PresentationDefinition,
    },

    /// The Wallet's response has been received and is being verified.
    ResponseReceived {
        /// The request as sent.
        request: RequestObject,

        /// The definition the request references.
        definition: PresentationDefinition,
    },

    /// Verification has completed.
    Verified {
        /// The request as sent.
        request: RequestObject,

        /// The recorded outcome.
        result: VerificationResult,
    },
}
