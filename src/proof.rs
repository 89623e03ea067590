//! # Proof of Possession
//!
//! A Credential Request carries exactly one proof mechanism binding the
//! holder's key to the issuance nonce: a JWT proof or a CWT (COSE_Sign1)
//! proof. This module parses both shapes, extracts the holder key reference
//! and nonce, and verifies the signature through the key provider.
//!
//! A JWT proof's header must carry either a `kid` (resolvable to a key) or
//! an embedded `jwk`. A CWT proof must carry either an embedded COSE key or
//! an X.509 chain. Anything else fails before any session state is touched.

use base64ct::{Base64UrlUnpadded, Encoding};
use ciborium::Value as Cbor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::provider::{Provider, VerifyingKey};
use crate::{JwtType, Result};

/// CWT claim key for the issuance nonce.
const CWT_NONCE: i128 = 10;
/// COSE header label for an X.509 certificate chain.
const COSE_X5CHAIN: i128 = 33;

/// Proof of possession of key material.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "proof_type", rename_all = "snake_case")]
pub enum Proof {
    /// A JWT proof, as produced by general-purpose wallets.
    Jwt {
        /// The compact-serialized proof JWT.
        jwt: String,
    },

    /// A CWT (COSE_Sign1) proof, as produced by ISO mdoc wallets.
    Cwt {
        /// The base64url-encoded COSE_Sign1 structure.
        cwt: String,
    },
}

/// The holder key reference carried in a proof header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HolderBinding {
    /// A key id to resolve (a DID URL or similar).
    Kid(String),

    /// A public JWK embedded in the proof header.
    Jwk(Value),

    /// A COSE key embedded in the protected header.
    CoseKey(Vec<u8>),

    /// An X.509 chain (DER, leaf first) embedded in the protected header.
    X5Chain(Vec<Vec<u8>>),
}

/// The outcome of successful proof validation: the holder's verified key
/// and the nonce the proof is bound to.
#[derive(Clone, Debug)]
pub struct VerifiedProof {
    /// The holder's public key, embedded or resolved.
    pub holder_key: VerifyingKey,

    /// The nonce extracted from the proof payload.
    pub nonce: String,
}

/// Validate a proof of possession: parse, check the key binding rules, and
/// verify the signature through the provider.
///
/// # Errors
///
/// Returns `Error::InvalidProof` when the proof is undecodable, carries no
/// usable key reference, or fails signature verification.
pub async fn verify(proof: &Proof, provider: &impl Provider) -> Result<VerifiedProof> {
    match proof {
        Proof::Jwt { jwt } => verify_jwt(jwt, provider).await,
        Proof::Cwt { cwt } => verify_cwt(cwt, provider).await,
    }
}

async fn verify_jwt(jwt: &str, provider: &impl Provider) -> Result<VerifiedProof> {
    let (header, claims, msg, signature) = parse_jwt(jwt)?;

    if let Some(typ) = header.get("typ").and_then(Value::as_str) {
        if typ != JwtType::ProofJwt.to_string() {
            return Err(Error::InvalidProof(format!("unexpected proof `typ`: {typ}")));
        }
    }

    let binding = match (header.get("kid").and_then(Value::as_str), header.get("jwk")) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidProof(
                "proof header must not carry both `kid` and `jwk`".to_string(),
            ));
        }
        (Some(kid), None) => HolderBinding::Kid(kid.to_string()),
        (None, Some(jwk)) => HolderBinding::Jwk(jwk.clone()),
        (None, None) => {
            return Err(Error::InvalidProof(
                "proof header carries neither `kid` nor `jwk`".to_string(),
            ));
        }
    };

    let Some(nonce) = claims.get("nonce").and_then(Value::as_str) else {
        return Err(Error::InvalidProof("proof payload carries no nonce".to_string()));
    };

    let holder_key = match binding {
        HolderBinding::Kid(kid) => {
            let jwk = provider
                .resolve(&kid)
                .await
                .map_err(|e| Error::InvalidProof(format!("cannot resolve `kid`: {e}")))?;
            VerifyingKey::Jwk(jwk)
        }
        HolderBinding::Jwk(jwk) => VerifyingKey::Jwk(jwk),
        HolderBinding::CoseKey(_) | HolderBinding::X5Chain(_) => {
            return Err(Error::InvalidProof("COSE key binding in a JWT proof".to_string()));
        }
    };

    let verified = provider
        .verify(&holder_key, &msg, &signature)
        .await
        .map_err(|e| Error::InvalidProof(format!("verification failed: {e}")))?;
    if !verified {
        return Err(Error::InvalidProof("proof signature does not verify".to_string()));
    }

    Ok(VerifiedProof { holder_key, nonce: nonce.to_string() })
}

async fn verify_cwt(cwt: &str, provider: &impl Provider) -> Result<VerifiedProof> {
    let bytes = Base64UrlUnpadded::decode_vec(cwt)
        .map_err(|e| Error::InvalidProof(format!("cannot decode CWT proof: {e}")))?;
    let value: Cbor = ciborium::de::from_reader(bytes.as_slice())
        .map_err(|e| Error::InvalidProof(format!("cannot parse CWT proof: {e}")))?;

    // COSE_Sign1, optionally tagged (18)
    let value = match value {
        Cbor::Tag(18, inner) => *inner,
        other => other,
    };
    let Cbor::Array(parts) = value else {
        return Err(Error::InvalidProof("CWT proof is not a COSE_Sign1 array".to_string()));
    };
    let [Cbor::Bytes(protected), Cbor::Map(unprotected), Cbor::Bytes(payload), Cbor::Bytes(signature)] =
        parts.as_slice()
    else {
        return Err(Error::InvalidProof("malformed COSE_Sign1 structure".to_string()));
    };

    let protected_map: Cbor = ciborium::de::from_reader(protected.as_slice())
        .map_err(|e| Error::InvalidProof(format!("cannot parse protected header: {e}")))?;
    let Cbor::Map(protected_entries) = protected_map else {
        return Err(Error::InvalidProof("protected header is not a map".to_string()));
    };

    let binding = cose_key_binding(&protected_entries)
        .or_else(|| cose_key_binding(unprotected))
        .ok_or_else(|| {
            Error::InvalidProof(
                "CWT proof carries neither a COSE key nor an x509 chain".to_string(),
            )
        })?;
    let holder_key = match binding {
        HolderBinding::CoseKey(key) => VerifyingKey::CoseKey(key),
        HolderBinding::X5Chain(chain) => VerifyingKey::X5Chain(chain),
        HolderBinding::Kid(_) | HolderBinding::Jwk(_) => {
            return Err(Error::InvalidProof("JOSE key binding in a CWT proof".to_string()));
        }
    };

    let nonce = cwt_nonce(payload)?;

    // Sig_structure for COSE_Sign1 with no external AAD
    let sig_structure = Cbor::Array(vec![
        Cbor::Text("Signature1".to_string()),
        Cbor::Bytes(protected.clone()),
        Cbor::Bytes(vec![]),
        Cbor::Bytes(payload.clone()),
    ]);
    let mut msg = Vec::new();
    ciborium::ser::into_writer(&sig_structure, &mut msg)
        .map_err(|e| Error::InvalidProof(format!("cannot encode Sig_structure: {e}")))?;

    let verified = provider
        .verify(&holder_key, &msg, signature)
        .await
        .map_err(|e| Error::InvalidProof(format!("verification failed: {e}")))?;
    if !verified {
        return Err(Error::InvalidProof("proof signature does not verify".to_string()));
    }

    Ok(VerifiedProof { holder_key, nonce })
}

/// Split a compact JWT into decoded header, decoded claims, signing input,
/// and signature.
pub(crate) fn parse_jwt(jwt: &str) -> Result<(Value, Value, Vec<u8>, Vec<u8>)> {
    let parts: Vec<&str> = jwt.split('.').collect();
    let [header_b64, claims_b64, signature_b64] = parts.as_slice() else {
        return Err(Error::InvalidProof("JWT proof is not in compact serialization".to_string()));
    };

    let header: Value = decode_json(header_b64)?;
    let claims: Value = decode_json(claims_b64)?;
    let signature = Base64UrlUnpadded::decode_vec(signature_b64)
        .map_err(|e| Error::InvalidProof(format!("cannot decode signature: {e}")))?;
    let msg = format!("{header_b64}.{claims_b64}").into_bytes();

    Ok((header, claims, msg, signature))
}

pub(crate) fn decode_json(b64: &str) -> Result<Value> {
    let bytes = Base64UrlUnpadded::decode_vec(b64)
        .map_err(|e| Error::InvalidProof(format!("cannot decode JWT segment: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidProof(format!("JWT segment is not JSON: {e}")))
}

fn cose_key_binding(entries: &[(Cbor, Cbor)]) -> Option<HolderBinding> {
    for (label, value) in entries {
        match (label, value) {
            (Cbor::Text(t), Cbor::Bytes(key)) if t == "COSE_Key" => {
                return Some(HolderBinding::CoseKey(key.clone()));
            }
            (Cbor::Integer(i), value) if i128::from(*i) == COSE_X5CHAIN => {
                let chain = match value {
                    Cbor::Bytes(der) => vec![der.clone()],
                    Cbor::Array(certs) => certs
                        .iter()
                        .filter_map(|c| match c {
                            Cbor::Bytes(der) => Some(der.clone()),
                            _ => None,
                        })
                        .collect(),
                    _ => vec![],
                };
                if !chain.is_empty() {
                    return Some(HolderBinding::X5Chain(chain));
                }
            }
            _ => {}
        }
    }
    None
}

fn cwt_nonce(payload: &[u8]) -> Result<String> {
    let claims: Cbor = ciborium::de::from_reader(payload)
        .map_err(|e| Error::InvalidProof(format!("cannot parse CWT claims: {e}")))?;
    let Cbor::Map(entries) = claims else {
        return Err(Error::InvalidProof("CWT claims are not a map".to_string()));
    };

    for (label, value) in &entries {
        if matches!(label, Cbor::Integer(i) if i128::from(*i) == CWT_NONCE) {
            return match value {
                Cbor::Text(nonce) => Ok(nonce.clone()),
                Cbor::Bytes(bytes) => String::from_utf8(bytes.clone()).map_err(|_| {
                    Error::InvalidProof("CWT nonce is not valid UTF-8".to_string())
                }),
                _ => Err(Error::InvalidProof("CWT nonce has unexpected type".to_string())),
            };
        }
    }
    Err(Error::InvalidProof("proof payload carries no nonce".to_string()))
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn proof_jwt(header: &Value, claims: &Value) -> String {
        let h = Base64UrlUnpadded::encode_string(&serde_json::to_vec(header).unwrap());
        let c = Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims).unwrap());
        let s = Base64UrlUnpadded::encode_string(b"signature");
        format!("{h}.{c}.{s}")
    }

    #[test]
    fn jwt_without_key_binding() {
        let jwt = proof_jwt(
            &json!({"alg": "ES256", "typ": "oid4vci-proof+jwt"}),
            &json!({"nonce": "abc"}),
        );
        let (header, claims, ..) = parse_jwt(&jwt).expect("should parse");
        assert!(header.get("kid").is_none() && header.get("jwk").is_none());
        assert_eq!(claims["nonce"], "abc");
    }

    #[test]
    fn malformed_jwt() {
        assert!(matches!(parse_jwt("not-a-jwt"), Err(Error::InvalidProof(_))));
    }
}
