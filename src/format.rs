//! # Credential Formats
//!
//! Resolves a requested credential format (and doctype, where applicable)
//! to the issuance algorithm path that applies: the general JWT/SD-JWT
//! signer or the MSO mdoc builder.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::Error;

/// Credential formats the engines can gate issuance and verification for.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum CredentialFormat {
    /// W3C Verifiable Credential, JWT-enveloped.
    #[default]
    #[serde(rename = "jwt_vc_json")]
    JwtVcJson,

    /// IETF SD-JWT Verifiable Credential (carries a `vct` claim).
    #[serde(rename = "dc+sd-jwt")]
    DcSdJwt,

    /// ISO mdoc / mDL, COSE-enveloped.
    #[serde(rename = "mso_mdoc")]
    MsoMdoc,
}

/// The issuance algorithm path selected for a format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationPath {
    /// General JWT/SD-JWT signing path.
    Jwt,

    /// MSO mdoc (COSE_Sign1) building path.
    Mdoc,
}

/// Resolve the generation path for a format and optional doctype.
///
/// # Errors
///
/// Returns `Error::UnsupportedFormat` for combinations the engine cannot
/// issue: an mdoc request without a doctype, or a doctype supplied for a
/// JWT-enveloped format.
pub fn resolve(format: CredentialFormat, doctype: Option<&str>) -> Result<GenerationPath> {
    match (format, doctype) {
        (CredentialFormat::JwtVcJson | CredentialFormat::DcSdJwt, None) => Ok(GenerationPath::Jwt),
        (CredentialFormat::MsoMdoc, Some(_)) => Ok(GenerationPath::Mdoc),
        (CredentialFormat::MsoMdoc, None) => {
            Err(Error::UnsupportedFormat("`mso_mdoc` requires a doctype".to_string()))
        }
        (_, Some(doctype)) => Err(Error::UnsupportedFormat(format!(
            "doctype `{doctype}` is not applicable to a JWT-enveloped format"
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn paths() {
        assert_eq!(
            resolve(CredentialFormat::JwtVcJson, None).unwrap(),
            GenerationPath::Jwt
        );
        assert_eq!(
            resolve(CredentialFormat::MsoMdoc, Some("org.iso.18013.5.1.mDL")).unwrap(),
            GenerationPath::Mdoc
        );
        assert!(matches!(
            resolve(CredentialFormat::MsoMdoc, None),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            resolve(CredentialFormat::DcSdJwt, Some("org.iso.18013.5.1.mDL")),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&CredentialFormat::DcSdJwt).unwrap(),
            r#""dc+sd-jwt""#
        );
        assert_eq!(
            serde_json::to_string(&CredentialFormat::MsoMdoc).unwrap(),
            r#""mso_mdoc""#
        );
    }
}
