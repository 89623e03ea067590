//! # Provider Traits
//!
//! This module defines the capability traits the engines depend on for key
//! operations. Implementers bring their own key management (local keys,
//! cloud KMS, hardware keystore); the engines never see raw key material,
//! only opaque key identifiers and the results of sign/verify calls.
//!
//! All methods are asynchronous: a remote signing call must be able to
//! suspend without blocking progress on other sessions.

use std::future::Future;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key Provider trait.
pub trait Provider: Signer + Verifier + KeyResolver + Clone {}

/// A blanket implementation for `Provider` trait so that any type
/// implementing the required super traits is considered a `Provider`.
impl<T> Provider for T where T: Signer + Verifier + KeyResolver + Clone {}

/// The `Signer` trait is implemented to provide signing for issuer-held
/// keys, identified by an opaque key identifier.
pub trait Signer: Send + Sync {
    /// Sign the message with the key identified by `key_id`, returning the
    /// raw signature bytes.
    fn sign(&self, key_id: &str, msg: &[u8]) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// The verification method (`kid`) to embed in the headers of artifacts
    /// signed with `key_id`, so relying parties can locate the public key.
    fn verification_method(&self, key_id: &str) -> impl Future<Output = Result<String>> + Send;
}

/// The `Verifier` trait is implemented to verify holder-produced signatures
/// against a holder-supplied or resolved public key.
pub trait Verifier: Send + Sync {
    /// Verify `signature` over `msg` using the given key. Returns `false`
    /// when the signature does not match; errors are reserved for keys the
    /// implementation cannot use.
    fn verify(
        &self, key: &VerifyingKey, msg: &[u8], signature: &[u8],
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// The `KeyResolver` trait resolves a `kid` reference (a DID URL or similar)
/// to a public key.
pub trait KeyResolver: Send + Sync {
    /// Resolve the `kid` to a public JWK.
    fn resolve(&self, kid: &str) -> impl Future<Output = Result<Value>> + Send;
}

/// A public key in one of the representations a proof-of-possession may
/// carry or reference.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerifyingKey {
    /// A public JWK, embedded in or resolved for a JWT proof.
    Jwk(Value),

    /// A CBOR-encoded COSE key, embedded in a CWT proof.
    CoseKey(Vec<u8>),

    /// An X.509 certificate chain (DER, leaf first), embedded in a CWT
    /// proof.
    X5Chain(Vec<Vec<u8>>),
}
