//! # OpenID for Verifiable Credential Issuance
//!
//! Issuer-side session and protocol logic: credential offers, nonce-bound
//! proof validation, token promotion, and (optionally deferred) credential
//! generation.

mod engine;
mod registry;
mod types;

pub use self::engine::{IssuanceEngine, IssuerConfig};
pub use self::registry::TokenRegistry;
pub use self::types::*;
