//! Shared fixtures: a deterministic key provider and wallet-side builders
//! for proofs and presentation envelopes.
#![allow(dead_code)]

use anyhow::Result;
use base64ct::{Base64UrlUnpadded, Encoding};
use oid4vc_engine::Proof;
use oid4vc_engine::provider::{KeyResolver, Signer, Verifier, VerifyingKey};
use serde_json::{Value, json};

pub const ISSUER: &str = "https://issuer.example.com";
pub const VERIFIER: &str = "https://verifier.example.com";
pub const HOLDER_KEY: &str = "holder-key";

/// A provider whose signatures are deterministic functions of the key name
/// and message, so verification can recompute them without real crypto.
#[derive(Clone, Debug, Default)]
pub struct MockProvider;

pub fn mock_signature(key: &str, msg: &[u8]) -> Vec<u8> {
    let mut sig = key.as_bytes().to_vec();
    sig.push(b'.');
    sig.extend_from_slice(msg);
    sig
}

impl Signer for MockProvider {
    async fn sign(&self, key_id: &str, msg: &[u8]) -> Result<Vec<u8>> {
        Ok(mock_signature(key_id, msg))
    }

    async fn verification_method(&self, key_id: &str) -> Result<String> {
        Ok(format!("did:example:issuer#{key_id}"))
    }
}

impl Verifier for MockProvider {
    async fn verify(&self, key: &VerifyingKey, msg: &[u8], signature: &[u8]) -> Result<bool> {
        let name = match key {
            VerifyingKey::Jwk(jwk) => {
                jwk.get("x").and_then(Value::as_str).unwrap_or_default().to_string()
            }
            VerifyingKey::CoseKey(bytes) => String::from_utf8_lossy(bytes).to_string(),
            VerifyingKey::X5Chain(chain) => chain
                .first()
                .map(|der| String::from_utf8_lossy(der).to_string())
                .unwrap_or_default(),
        };
        Ok(signature == mock_signature(&name, msg))
    }
}

impl KeyResolver for MockProvider {
    async fn resolve(&self, kid: &str) -> Result<Value> {
        let key = kid.rsplit('#').next().unwrap_or(kid);
        Ok(json!({"kty": "OKP", "crv": "Ed25519", "x": key}))
    }
}

fn encode_jwt(header: &Value, claims: &Value, key: &str) -> String {
    let header_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(header).unwrap());
    let claims_b64 = Base64UrlUnpadded::encode_string(&serde_json::to_vec(claims).unwrap());
    let msg = format!("{header_b64}.{claims_b64}");
    let signature = mock_signature(key, msg.as_bytes());
    format!("{msg}.{}", Base64UrlUnpadded::encode_string(&signature))
}

/// A wallet-produced JWT proof of possession bound to `nonce`, with the
/// holder key embedded as a JWK.
pub fn holder_proof(nonce: &str) -> Proof {
    let header = json!({
        "alg": "ES256",
        "typ": "oid4vci-proof+jwt",
        "jwk": {"kty": "OKP", "crv": "Ed25519", "x": HOLDER_KEY},
    });
    let claims = json!({"aud": ISSUER, "nonce": nonce});
    Proof::Jwt { jwt: encode_jwt(&header, &claims, HOLDER_KEY) }
}

/// A wallet-produced SD-JWT envelope with a `vct` claim, bound to `nonce`,
/// with a trailing (undisclosed) disclosure segment.
pub fn sd_jwt_token(nonce: &str, vct: &str) -> String {
    let header = json!({"alg": "ES256", "typ": "dc+sd-jwt"});
    let claims = json!({
        "iss": ISSUER,
        "vct": vct,
        "nonce": nonce,
        "given_name": "Alice",
    });
    format!("{}~ZGlzY2xvc3VyZQ", encode_jwt(&header, &claims, HOLDER_KEY))
}

/// A wallet-produced JWT-secured Verifiable Presentation carrying one
/// credential per entry in `types`, bound to `nonce`.
pub fn vp_token(nonce: &str, types: &[&str]) -> String {
    let credentials: Vec<Value> = types
        .iter()
        .map(|t| json!({"vc": {"type": ["VerifiableCredential", t]}}))
        .collect();
    let header = json!({"alg": "ES256", "typ": "jwt"});
    let claims = json!({
        "aud": VERIFIER,
        "nonce": nonce,
        "vp": {"verifiableCredential": credentials},
    });
    encode_jwt(&header, &claims, HOLDER_KEY)
}
