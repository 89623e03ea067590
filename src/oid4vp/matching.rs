//! # Presentation Matching
//!
//! Extracts the credential types carried by a VP Token and checks them
//! against the types a Presentation Definition requested. Presenting a
//! superset of the requested types satisfies the definition; any missing
//! type fails it, and the failure names exactly the missing types.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::Value;

use crate::Result;
use crate::error::{Error, invalid};

/// The credential types carried by the presented envelopes, in order of
/// first appearance with duplicates removed.
///
/// Each envelope is either an SD-JWT (`vct` claim, disclosures stripped) or
/// a JWT-secured Verifiable Presentation whose `vp.verifiableCredential`
/// entries carry a `type` array.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` when an envelope cannot be decoded.
pub fn presented_types(vp_tokens: &[String]) -> Result<Vec<String>> {
    let mut types = vec![];
    for token in vp_tokens {
        for credential_type in envelope_types(token)? {
            if !types.contains(&credential_type) {
                types.push(credential_type);
            }
        }
    }
    Ok(types)
}

/// Check the presented types cover every requested type. The presented set
/// may be a superset of the requested set.
///
/// # Errors
///
/// Returns `Error::PresentationMismatch` naming the requested types absent
/// from `presented`, in sorted order.
pub fn match_types(requested: &[String], presented: &[String]) -> Result<()> {
    let mut missing: Vec<String> =
        requested.iter().filter(|t| !presented.contains(t)).cloned().collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort();
    missing.dedup();
    Err(Error::PresentationMismatch { missing_credential_types: missing })
}

// The `nonce` claim of the envelope's issuer JWT, binding the presentation
// to the Authorization Request.
pub(crate) fn envelope_nonce(token: &str) -> Result<Option<String>> {
    let issuer_jwt = token.split('~').next().unwrap_or(token);
    let claims = decode_claims(issuer_jwt)?;
    Ok(claims.get("nonce").and_then(Value::as_str).map(ToString::to_string))
}

// The claims of a `vct`-bearing (SD-JWT) envelope, or `None` for other
// envelope shapes.
pub(crate) fn sd_jwt_claims(token: &str) -> Result<Option<Value>> {
    let issuer_jwt = token.split('~').next().unwrap_or(token);
    let claims = decode_claims(issuer_jwt)?;
    Ok(claims.get("vct").is_some().then_some(claims))
}

fn envelope_types(token: &str) -> Result<Vec<String>> {
    // SD-JWT: disclosures (and any key-binding JWT) follow `~` separators
    let issuer_jwt = token.split('~').next().unwrap_or(token);
    let claims = decode_claims(issuer_jwt)?;

    if let Some(vct) = claims.get("vct").and_then(Value::as_str) {
        return Ok(vec![vct.to_string()]);
    }

    let Some(credentials) =
        claims.get("vp").and_then(|vp| vp.get("verifiableCredential")).and_then(Value::as_array)
    else {
        return Err(invalid!("vp_token entry carries no verifiable credentials"));
    };

    let mut types = vec![];
    for credential in credentials {
        let object = match credential {
            // an embedded credential may itself be an encoded JWT
            Value::String(jwt) => decode_claims(jwt)?,
            _ => credential.clone(),
        };
        let type_value = object
            .get("vc")
            .and_then(|vc| vc.get("type"))
            .or_else(|| object.get("type"))
            .ok_or_else(|| invalid!("verifiable credential carries no type"))?;

        // the most specific type is listed last
        match type_value {
            Value::Array(entries) => {
                if let Some(last) = entries.last().and_then(Value::as_str) {
                    types.push(last.to_string());
                }
            }
            Value::String(s) => types.push(s.clone()),
            _ => return Err(invalid!("verifiable credential type is not a string or array")),
        }
    }
    Ok(types)
}

fn decode_claims(jwt: &str) -> Result<Value> {
    let mut parts = jwt.split('.');
    let (Some(_), Some(claims_b64)) = (parts.next(), parts.next()) else {
        return Err(invalid!("vp_token entry is not in compact serialization"));
    };
    let bytes = Base64UrlUnpadded::decode_vec(claims_b64)
        .map_err(|e| invalid!("cannot decode vp_token segment: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| invalid!("vp_token segment is not JSON: {e}"))
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn encode_jwt(claims: &Value) -> String {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"ES256"}"#);
        let claims =
            Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims).expect("should encode"));
        format!("{header}.{claims}.c2ln")
    }

    #[test]
    fn vp_types() {
        let vp = encode_jwt(&json!({
            "vp": {
                "verifiableCredential": [
                    {"vc": {"type": ["VerifiableCredential", "VerifiableId"]}},
                    {"vc": {"type": ["VerifiableCredential", "VerifiableAttestation"]}},
                ]
            }
        }));

        let types = presented_types(&[vp]).expect("should parse");
        assert_eq!(types, vec!["VerifiableId", "VerifiableAttestation"]);
    }

    #[test]
    fn sd_jwt_vct() {
        let token = format!("{}~ZGlzY2xvc3VyZQ", encode_jwt(&json!({"vct": "EmployeeID"})));
        assert_eq!(presented_types(&[token]).expect("should parse"), vec!["EmployeeID"]);
    }

    #[test]
    fn superset_satisfies() {
        let requested = vec!["VerifiableId".to_string()];
        let presented = vec!["VerifiableId".to_string(), "VerifiableAttestation".to_string()];
        assert!(match_types(&requested, &presented).is_ok());
    }

    #[test]
    fn missing_types_named() {
        let requested = vec!["VerifiableId".to_string(), "ProofOfAge".to_string()];
        let presented = vec!["VerifiableId".to_string()];

        let Err(Error::PresentationMismatch { missing_credential_types }) =
            match_types(&requested, &presented)
        else {
            panic!("should be a mismatch");
        };
        assert_eq!(missing_credential_types, vec!["ProofOfAge"]);
    }

    #[test]
    fn malformed_token() {
        assert!(presented_types(&["not-a-jwt".to_string()]).is_err());
    }
}
