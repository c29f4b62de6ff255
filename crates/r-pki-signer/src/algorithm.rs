//! ---
//! pki_section: "09-certificate-signing"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate templates and issuance signing."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use der::asn1::{Null, ObjectIdentifier};
use der::{Any, Decode, Encode, Sequence};
use r_pki_common::{CaError, CaResult};
use spki::AlgorithmIdentifierOwned;

const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const OID_RSASSA_PSS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.10");
const OID_ECDSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const OID_MGF1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.8");

/// Signature algorithms the authority can sign with, keyed by the canonical
/// names used across subsystem configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `SHA256withRSA` (PKCS#1 v1.5).
    Sha256WithRsa,
    /// `SHA384withRSA` (PKCS#1 v1.5).
    Sha384WithRsa,
    /// `SHA256withRSA/PSS` with MGF1-SHA-256 and a 32-byte salt.
    Sha256WithRsaPss,
    /// `SHA256withEC` (ECDSA over P-256).
    Sha256WithEcdsa,
}

impl SignatureAlgorithm {
    /// Map a configured name to an algorithm; unmapped names fail with
    /// `UnsupportedAlgorithm`.
    pub fn from_name(name: &str) -> CaResult<Self> {
        match name {
            "SHA256withRSA" => Ok(SignatureAlgorithm::Sha256WithRsa),
            "SHA384withRSA" => Ok(SignatureAlgorithm::Sha384WithRsa),
            "SHA256withRSA/PSS" => Ok(SignatureAlgorithm::Sha256WithRsaPss),
            "SHA256withEC" => Ok(SignatureAlgorithm::Sha256WithEcdsa),
            other => Err(CaError::UnsupportedAlgorithm(format!(
                "signature algorithm {other}"
            ))),
        }
    }

    /// Canonical configuration name.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha256WithRsa => "SHA256withRSA",
            SignatureAlgorithm::Sha384WithRsa => "SHA384withRSA",
            SignatureAlgorithm::Sha256WithRsaPss => "SHA256withRSA/PSS",
            SignatureAlgorithm::Sha256WithEcdsa => "SHA256withEC",
        }
    }

    /// Algorithm identifier placed in both the TBS `signature` field and
    /// the outer certificate.
    pub fn algorithm_identifier(&self) -> CaResult<AlgorithmIdentifierOwned> {
        let identifier = match self {
            SignatureAlgorithm::Sha256WithRsa => AlgorithmIdentifierOwned {
                oid: OID_SHA256_WITH_RSA,
                parameters: Some(null_parameter()?),
            },
            SignatureAlgorithm::Sha384WithRsa => AlgorithmIdentifierOwned {
                oid: OID_SHA384_WITH_RSA,
                parameters: Some(null_parameter()?),
            },
            SignatureAlgorithm::Sha256WithRsaPss => AlgorithmIdentifierOwned {
                oid: OID_RSASSA_PSS,
                parameters: Some(pss_sha256_parameters()?),
            },
            SignatureAlgorithm::Sha256WithEcdsa => AlgorithmIdentifierOwned {
                oid: OID_ECDSA_WITH_SHA256,
                parameters: None,
            },
        };
        Ok(identifier)
    }
}

/// `RSASSA-PSS-params` (RFC 4055 §3.1). All fields are written explicitly
/// rather than relying on DER defaults.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct RsaPssParams {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    hash_algorithm: Option<AlgorithmIdentifierOwned>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    mask_gen_algorithm: Option<AlgorithmIdentifierOwned>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    salt_length: Option<u8>,
}

fn null_parameter() -> CaResult<Any> {
    let der = Null
        .to_der()
        .map_err(|err| CaError::Internal(format!("NULL parameter encoding: {err}")))?;
    Any::from_der(&der).map_err(|err| CaError::Internal(format!("NULL parameter: {err}")))
}

fn sha256_identifier() -> CaResult<AlgorithmIdentifierOwned> {
    Ok(AlgorithmIdentifierOwned {
        oid: OID_SHA256,
        parameters: Some(null_parameter()?),
    })
}

fn pss_sha256_parameters() -> CaResult<Any> {
    let sha256 = sha256_identifier()?;
    let mgf1_params = sha256
        .to_der()
        .map_err(|err| CaError::Internal(format!("MGF1 parameter encoding: {err}")))?;
    let params = RsaPssParams {
        hash_algorithm: Some(sha256.clone()),
        mask_gen_algorithm: Some(AlgorithmIdentifierOwned {
            oid: OID_MGF1,
            parameters: Some(
                Any::from_der(&mgf1_params)
                    .map_err(|err| CaError::Internal(format!("MGF1 parameter: {err}")))?,
            ),
        }),
        salt_length: Some(32),
    };
    let der = params
        .to_der()
        .map_err(|err| CaError::Internal(format!("PSS parameter encoding: {err}")))?;
    Any::from_der(&der).map_err(|err| CaError::Internal(format!("PSS parameter: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_round_trip() {
        for name in [
            "SHA256withRSA",
            "SHA384withRSA",
            "SHA256withRSA/PSS",
            "SHA256withEC",
        ] {
            let algorithm = SignatureAlgorithm::from_name(name).unwrap();
            assert_eq!(algorithm.canonical_name(), name);
        }
    }

    #[test]
    fn unmapped_name_is_unsupported() {
        assert!(matches!(
            SignatureAlgorithm::from_name("MD5withRSA"),
            Err(CaError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn pss_identifier_carries_parameters() {
        let id = SignatureAlgorithm::Sha256WithRsaPss
            .algorithm_identifier()
            .unwrap();
        assert_eq!(id.oid, OID_RSASSA_PSS);
        let params = id.parameters.unwrap();
        let decoded: RsaPssParams = params.decode_as().unwrap();
        assert_eq!(decoded.salt_length, Some(32));
        assert_eq!(decoded.hash_algorithm.unwrap().oid, OID_SHA256);
    }

    #[test]
    fn ecdsa_identifier_has_absent_parameters() {
        let id = SignatureAlgorithm::Sha256WithEcdsa
            .algorithm_identifier()
            .unwrap();
        assert_eq!(id.oid, OID_ECDSA_WITH_SHA256);
        assert!(id.parameters.is_none());
    }
}
