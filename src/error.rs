//! # `OpenID` Errors
//!
//! This module defines errors for `OpenID` for Verifiable Credential Issuance
//! and Verifiable Presentations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `OpenID` error codes for Verifiable Credential Issuance and Presentation.
#[derive(Error, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "error", content = "error_description")]
pub enum Error {
    /// The request is missing a required parameter, includes an unsupported
    /// parameter value, repeats a parameter, or is otherwise malformed.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    InvalidRequest(String),

    /// A Credential Offer locator could not be parsed or resolved to a
    /// concrete offer.
    #[error(r#"{{"error": "offer_resolution", "error_description": "{0}"}}"#)]
    OfferResolution(String),

    /// The proof-of-possession in a Credential Request is structurally
    /// invalid: missing key reference, undecodable, or failing signature
    /// verification.
    #[error(r#"{{"error": "invalid_proof", "error_description": "{0}"}}"#)]
    InvalidProof(String),

    /// The nonce presented in a proof has no live mapping entry.
    #[error(r#"{{"error": "unknown_nonce", "error_description": "{0}"}}"#)]
    UnknownNonce(String),

    /// The nonce presented in a proof is known but no longer valid.
    #[error(r#"{{"error": "invalid_or_expired_nonce", "error_description": "{0}"}}"#)]
    InvalidOrExpiredNonce(String),

    /// No credential data is staged for the session being promoted, or it
    /// has already been promoted.
    #[error(r#"{{"error": "no_pending_credential", "error_description": "{0}"}}"#)]
    NoPendingCredential(String),

    /// A deferred issuance transaction could not be found.
    #[error(r#"{{"error": "unknown_credential_id", "error_description": "{0}"}}"#)]
    UnknownCredentialId(String),

    /// The requested credential format (or format/doctype combination) is
    /// not supported.
    #[error(r#"{{"error": "unsupported_format", "error_description": "{0}"}}"#)]
    UnsupportedFormat(String),

    /// The presented credentials do not satisfy the Presentation
    /// Definition. Carries exactly the requested types missing from the
    /// presented set.
    #[error(
        r#"{{"error": "presentation_mismatch", "missing_credential_types": {missing_credential_types:?}}}"#
    )]
    PresentationMismatch {
        /// Requested credential types with no match in the presentation.
        missing_credential_types: Vec<String>,
    },

    /// A verifier policy failed to evaluate.
    #[error(r#"{{"error": "policy_evaluation", "error_description": "{0}"}}"#)]
    PolicyEvaluation(String),

    /// The server encountered an unexpected condition that prevented it from
    /// fulfilling the request.
    #[error(r#"{{"error": "server_error", "error_description": "{0}"}}"#)]
    ServerError(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<Self>() {
            Some(Self::InvalidRequest(e)) => Self::InvalidRequest(format!("{err}: {e}")),
            Some(Self::OfferResolution(e)) => Self::OfferResolution(format!("{err}: {e}")),
            Some(Self::InvalidProof(e)) => Self::InvalidProof(format!("{err}: {e}")),
            Some(Self::UnknownNonce(e)) => Self::UnknownNonce(format!("{err}: {e}")),
            Some(Self::InvalidOrExpiredNonce(e)) => {
                Self::InvalidOrExpiredNonce(format!("{err}: {e}"))
            }
            Some(Self::NoPendingCredential(e)) => Self::NoPendingCredential(format!("{err}: {e}")),
            Some(Self::UnknownCredentialId(e)) => Self::UnknownCredentialId(format!("{err}: {e}")),
            Some(Self::UnsupportedFormat(e)) => Self::UnsupportedFormat(format!("{err}: {e}")),
            Some(Self::PresentationMismatch { missing_credential_types }) => {
                Self::PresentationMismatch {
                    missing_credential_types: missing_credential_types.clone(),
                }
            }
            Some(Self::PolicyEvaluation(e)) => Self::PolicyEvaluation(format!("{err}: {e}")),
            Some(Self::ServerError(e)) => Self::ServerError(format!("{err}: {e}")),
            None => {
                let stack = err.chain().fold(String::new(), |cause, e| format!("{cause} -> {e}"));
                let stack = stack.trim_start_matches(" -> ").to_string();
                Self::ServerError(stack)
            }
        }
    }
}

/// Construct an `Error::InvalidRequest` error from a string or existing error
/// value.
macro_rules! invalid {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::InvalidRequest(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::InvalidRequest(format!($err))
    };
}
pub(crate) use invalid;

/// Construct an `Error::ServerError` error from a string or existing error
/// value.
macro_rules! server {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::ServerError(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::ServerError(format!($err))
    };
}
pub(crate) use server;
