//! # Verifier Policies
//!
//! Pluggable checks the engine runs over a received Authorization Response
//! before recording a verification outcome, plus the strategy deciding
//! whether a Presentation Definition travels inline or by reference.

use crate::Result;
use crate::error::Error;
use crate::oid4vp::matching;
use crate::oid4vp::types::{AuthorizationResponse, PresentationDefinition, RequestObject};

/// A check evaluated against a received presentation. Policies are
/// synchronous and run in registration order; the first failure decides
/// the recorded outcome.
pub trait PresentationPolicy: Send + Sync {
    /// A short name identifying the policy in recorded outcomes.
    fn name(&self) -> &str;

    /// Evaluate the response against the request it answers.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the presentation is not acceptable.
    fn evaluate(
        &self, response: &AuthorizationResponse, request: &RequestObject,
        definition: &PresentationDefinition,
    ) -> Result<()>;
}

/// The baseline policy: the presented credential types must cover every
/// type the Presentation Definition requested.
#[derive(Clone, Debug, Default)]
pub struct DefinitionConformance;

impl PresentationPolicy for DefinitionConformance {
    fn name(&self) -> &str {
        "definition_conformance"
    }

    fn evaluate(
        &self, response: &AuthorizationResponse, _: &RequestObject,
        definition: &PresentationDefinition,
    ) -> Result<()> {
        let tokens = response.vp_token.to_vec();
        let presented = matching::presented_types(&tokens)?;
        matching::match_types(&definition.requested_types(), &presented)?;

        // a vct-bearing envelope must also structurally satisfy at least
        // one input descriptor
        for token in &tokens {
            if let Some(claims) = matching::sd_jwt_claims(token)? {
                if !definition.input_descriptors.iter().any(|d| d.matches_object(&claims)) {
                    return Err(Error::PolicyEvaluation(
                        "no input descriptor matches the presented sd-jwt credential".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Decides how a Presentation Definition travels in an Authorization
/// Request: inline, or retrievable from a URI the implementation hosts.
pub trait DefinitionLocation: Send + Sync {
    /// The URI the Wallet can retrieve the definition from, or `None` to
    /// embed the definition inline.
    fn reference_uri(&self, definition: &PresentationDefinition) -> Option<String>;
}

/// Always embeds the definition inline. The default location strategy.
#[derive(Clone, Debug, Default)]
pub struct InlineDefinition;

impl DefinitionLocation for InlineDefinition {
    fn reference_uri(&self, _: &PresentationDefinition) -> Option<String> {
        None
    }
}
