//! # OpenID for Verifiable Presentations
//!
//! Verifier-side session and protocol logic: building Authorization
//! Request Objects, tracking presentation sessions, matching submitted
//! credentials against the requested Presentation Definition, and
//! recording verification outcomes.

mod engine;
mod matching;
mod policy;
mod types;

pub use self::engine::{
    InitializedAuthorization, PresentationEngine, RequestOptions, VerifierConfig,
};
pub use self::matching::{match_types, presented_types};
pub use self::policy::{
    DefinitionConformance, DefinitionLocation, InlineDefinition, PresentationPolicy,
};
pub use self::types::*;
