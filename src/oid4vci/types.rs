//! Request and response types for the issuance engine.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::format::CredentialFormat;
use crate::proof::Proof;
use crate::{Kind, urlencode};

/// OAuth 2.0 grant types an offer can reference.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum GrantType {
    /// The OAuth 2.0 Authorization Code flow.
    #[serde(rename = "authorization_code")]
    AuthorizationCode,

    /// The Pre-Authorized Code flow.
    #[default]
    #[serde(rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code")]
    PreAuthorizedCode,
}

/// Request a Credential Offer for a Credential Issuer.
#[derive(Clone, Default, Debug, Deserialize, Serialize)]
pub struct CreateOfferRequest {
    /// Identifies the (previously authenticated) Holder in order that Issuer
    /// can authorize credential issuance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// A list of credential configuration identifiers the offer covers.
    pub credential_configuration_ids: Vec<String>,

    /// The Grant Types to include in the Offer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<GrantType>>,

    /// Specifies whether a Transaction Code (PIN) is required by the token
    /// step during the Pre-Authorized Code Flow.
    pub tx_code_required: bool,

    /// The Issuer can specify whether Credential Offer is an object or a URI.
    pub send_type: SendType,
}

/// Determines how the Credential Offer is sent to the Wallet.
#[derive(Clone, Default, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum SendType {
    /// The Credential Offer is sent to the Wallet by value — as an object
    /// containing the Credential Offer parameters.
    #[default]
    ByVal,

    /// The Credential Offer is sent to the Wallet by reference — as a string
    /// containing a URL pointing to a location where the offer can be
    /// retrieved.
    ByRef,
}

/// The response to a Credential Offer request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CreateOfferResponse {
    /// A Credential Offer that can be used to initiate issuance with a
    /// Wallet: the offer itself or a URL it can be retrieved from.
    #[serde(flatten)]
    pub offer_type: OfferType,

    /// A transaction code to be provided by the End-User in order to
    /// complete a credential request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<String>,
}

/// The type of Credential Offer returned in a `CreateOfferResponse`: either
/// an object or a URI.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub enum OfferType {
    /// A Credential Offer object that can be sent to a Wallet as an HTTP GET
    /// request.
    #[serde(rename = "credential_offer")]
    Object(CredentialOffer),

    /// A URI pointing to a location where a `CredentialOffer` object can be
    /// retrieved.
    #[serde(rename = "credential_offer_uri")]
    Uri(String),
}

impl OfferType {
    /// Convenience method for extracting a Credential Offer object from an
    /// offer type if it exists.
    #[must_use]
    pub const fn as_object(&self) -> Option<&CredentialOffer> {
        match self {
            Self::Object(offer) => Some(offer),
            Self::Uri(_) => None,
        }
    }

    /// Convenience method for extracting a Credential Offer URI from an
    /// offer type if it exists.
    #[must_use]
    pub const fn as_uri(&self) -> Option<&str> {
        match self {
            Self::Uri(uri) => Some(uri.as_str()),
            Self::Object(_) => None,
        }
    }
}

/// A Credential Offer object that can be sent to a Wallet as an HTTP GET
/// request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialOffer {
    /// The URL of the Credential Issuer which the Wallet can use to obtain
    /// Credentials and the Issuer's Metadata.
    pub credential_issuer: String,

    /// Identifiers of the credential configurations offered to the Wallet.
    pub credential_configuration_ids: Vec<String>,

    /// Grant Types the Credential Issuer is prepared to process for this
    /// offer. When multiple grants are present, it's at the Wallet's
    /// discretion which one to use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grants>,
}

impl CredentialOffer {
    /// Generate a query string for the Credential Offer.
    #[must_use]
    pub fn to_querystring(&self) -> String {
        format!("credential_offer={self}")
    }

    /// Convenience method for extracting a pre-authorized code grant from an
    /// offer if it exists.
    #[must_use]
    pub fn pre_authorized_code(&self) -> Option<PreAuthorizedCodeGrant> {
        self.grants.as_ref().and_then(|grants| grants.pre_authorized_code.clone())
    }

    /// Convenience method for extracting an authorization code grant from an
    /// offer if it exists.
    #[must_use]
    pub fn authorization_code(&self) -> Option<AuthorizationCodeGrant> {
        self.grants.as_ref().and_then(|grants| grants.authorization_code.clone())
    }
}

impl Display for CredentialOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = urlencode::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{s}")
    }
}

impl FromStr for CredentialOffer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        urlencode::from_str(s)
    }
}

/// Grant Types the Credential Issuer's Authorization Server is prepared to
/// process for a Credential Offer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Grants {
    /// Authorization Code Grant Type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,

    /// Pre-Authorized Code Grant Type.
    #[serde(rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

/// The Authorization Code Grant Type contains parameters used by the Wallet
/// when requesting the Authorization Code Flow.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthorizationCodeGrant {
    /// Issuer state is used to link an Authorization Request to the Offer
    /// context. If the Wallet uses this grant, it must include the state in
    /// the Authorization Request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
}

/// The Pre-Authorized Code Grant Type contains parameters used by the Wallet
/// when using the Pre-Authorized Code Flow.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PreAuthorizedCodeGrant {
    /// The code representing the Issuer's authorization for the Wallet to
    /// obtain Credentials of the type specified in the offer.
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,

    /// A description of the Transaction Code the End-User must provide, when
    /// one is required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
}

/// Metadata about the Transaction Code the End-User is expected to provide.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TxCode {
    /// The character set of the code: "numeric" or "text".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,

    /// Length of the code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<i32>,

    /// Guidance for the Holder on how to obtain the code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The Holder's request for a credential to be issued.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialRequest {
    /// The format of the credential to be issued.
    pub format: CredentialFormat,

    /// The ISO doctype of the credential, for mdoc formats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctype: Option<String>,

    /// Proof of possession of the key the credential will be bound to.
    /// Exactly one proof mechanism, appropriate to the format.
    pub proof: Proof,
}

/// The issued credential, or a deferral the Wallet can poll.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CredentialResponse {
    /// The credential was issued immediately.
    Issued {
        /// The format of the issued credential.
        format: CredentialFormat,

        /// The issued credential: an encoded envelope or a structured
        /// object.
        credential: Kind<Value>,

        /// Additional, implementation-defined parameters.
        #[serde(skip_serializing_if = "Option::is_none")]
        custom_parameters: Option<Map<String, Value>>,
    },

    /// Issuance was deferred; the Wallet polls with the credential id.
    Deferred {
        /// Identifies the deferred issuance transaction for later polling.
        credential_id: String,
    },
}

impl CredentialResponse {
    /// Whether issuance was deferred.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}

/// Pre-staged issuance data recorded against a session (and, after
/// promotion, an access token): everything needed to generate the
/// credential once a valid proof arrives.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IssuanceSessionData {
    /// Opaque identifier of the issuer key that will sign the credential.
    pub key_id: String,

    /// The issuer identifier to record in the credential.
    pub issuer: String,

    /// The raw issuance request: the claims dataset for the credential.
    pub request: Value,
}

/// Issuance session state machine.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum IssuanceState {
    /// An offer has been created and is awaiting acceptance.
    Offered {
        /// The offer as sent to the Wallet.
        offer: CredentialOffer,

        /// The Holder the offer was created for, when pre-authorized.
        subject_id: Option<String>,

        /// Transaction code the Holder must echo at the token step.
        tx_code: Option<String>,
    },

    /// An authorization flow has started for a Holder.
    Pending {
        /// The (previously authenticated) Holder.
        subject_id: String,

        /// The offer being authorized.
        offer: CredentialOffer,
    },

    /// An access token has been issued for the session.
    TokenIssued {
        /// The (previously authenticated) Holder.
        subject_id: String,
    },

    /// A credential has been issued.
    Issued {
        /// The (previously authenticated) Holder.
        subject_id: String,
    },
}

/// Deferred issuance state, keyed by the credential id returned to the
/// Wallet.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DeferredIssuance {
    /// The original credential request.
    pub request: CredentialRequest,

    /// The staged issuance data resolved when the request first arrived.
    pub data: Vec<IssuanceSessionData>,

    /// The registry key (access token) the request was redeemed under, so
    /// a successful poll can record issuance against the session.
    pub token: String,
}
