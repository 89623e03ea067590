//! A session and protocol engine for the issuance and verification of
//! Verifiable Credentials based on the
//! [OpenID for Verifiable Credential Issuance](https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html)
//! and [OpenID for Verifiable Presentations](https://openid.net/specs/openid-4-verifiable-presentations-1_0.html)
//! specifications.
//!
//! The crate drives credential issuance and presentation exchanges between
//! an issuer, a holder wallet, and a verifier: short-lived sessions, signed
//! authorization requests, single-use nonces, and proof-of-possession
//! validation. Everything requiring I/O beyond process memory — signing,
//! key resolution, durable session storage — is consumed through the
//! capability traits in [`provider`] and the [`SessionStore`] trait.

pub mod oid4vci;
pub mod oid4vp;
pub mod provider;

mod common;
mod error;
mod format;
mod generate;
mod nonce;
mod proof;
mod session;
mod urlencode;

pub use self::common::{Kind, OneMany};
pub use self::error::Error;
pub use self::format::{CredentialFormat, GenerationPath, resolve as resolve_format};
pub use self::generate::{auth_code, nonce, tx_code, uri_token};
pub use self::nonce::NonceBinder;
pub use self::proof::{HolderBinding, Proof, VerifiedProof};
pub use self::session::{Expire, MemoryStore, Session, SessionStore};

/// Result type for `OpenID` for Verifiable Credential Issuance and
/// Presentation.
pub type Result<T, E = Error> = anyhow::Result<T, E>;

use serde::{Deserialize, Serialize};

/// The JWT `typ` header parameter.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub enum JwtType {
    /// General purpose JWT type.
    #[default]
    #[serde(rename = "jwt")]
    Jwt,

    /// JWT `typ` for Wallet's Proof of possession of key material.
    #[serde(rename = "oid4vci-proof+jwt")]
    ProofJwt,

    /// JWT `typ` for an Authorization Request Object.
    #[serde(rename = "oauth-authz-req+jwt")]
    OauthAuthzReqJwt,
}

impl From<&JwtType> for String {
    fn from(t: &JwtType) -> Self {
        match t {
            JwtType::Jwt => "jwt".to_string(),
            JwtType::ProofJwt => "oid4vci-proof+jwt".to_string(),
            JwtType::OauthAuthzReqJwt => "oauth-authz-req+jwt".to_string(),
        }
    }
}

impl std::fmt::Display for JwtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s: String = self.into();
        write!(f, "{s}")
    }
}
