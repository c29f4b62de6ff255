//! ---
//! pki_section: "09-certificate-signing"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate templates and issuance signing."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use der::asn1::{BitString, GeneralizedTime, ObjectIdentifier, OctetString, UtcTime};
use der::{Decode, Encode};
use r_pki_common::{CaError, CaResult};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use sha2::{Sha256, Sha384};
use signature::{RandomizedSigner, SignatureEncoding, Signer};
use spki::SubjectPublicKeyInfoOwned;
use tracing::debug;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber as X509SerialNumber;
use x509_cert::time::{Time, Validity};

use crate::algorithm::SignatureAlgorithm;
use crate::template::CertTemplate;

/// Authority private key handed to the signer.
pub enum IssuerKey {
    /// RSA key for the `*withRSA` and PSS algorithms.
    Rsa(RsaPrivateKey),
    /// P-256 key for `SHA256withEC`.
    Ecdsa(p256::ecdsa::SigningKey),
}

/// Assemble and sign a certificate.
///
/// The algorithm identifier is set on the template, the to-be-signed
/// structure is DER-encoded, the signature is computed over those exact
/// bytes, and the final certificate is re-assembled as
/// `{tbsCertificate, algorithmIdentifier, signature BIT STRING}`.
pub fn sign_cert(
    issuer_key: &IssuerKey,
    template: &CertTemplate,
    algorithm: SignatureAlgorithm,
) -> CaResult<Vec<u8>> {
    let algorithm_identifier = algorithm.algorithm_identifier()?;

    let serial_number = X509SerialNumber::new(template.serial.as_bytes())
        .map_err(|err| CaError::BadInput(format!("serial {}: {err}", template.serial)))?;
    let issuer = Name::from_str(&template.issuer_dn)
        .map_err(|err| CaError::BadInput(format!("issuer DN {}: {err}", template.issuer_dn)))?;
    let subject = Name::from_str(&template.subject_dn)
        .map_err(|err| CaError::BadInput(format!("subject DN {}: {err}", template.subject_dn)))?;
    let subject_public_key_info = SubjectPublicKeyInfoOwned::from_der(&template.spki_der)
        .map_err(|err| CaError::BadInput(format!("subject public key: {err}")))?;

    let extensions = if template.extensions.is_empty() {
        None
    } else {
        let mut encoded = Vec::with_capacity(template.extensions.len());
        for ext in &template.extensions {
            encoded.push(Extension {
                extn_id: ObjectIdentifier::from_str(&ext.oid)
                    .map_err(|err| CaError::BadInput(format!("extension oid {}: {err}", ext.oid)))?,
                critical: ext.critical,
                extn_value: OctetString::new(ext.value.clone())
                    .map_err(|err| CaError::Internal(format!("extension value: {err}")))?,
            });
        }
        Some(encoded)
    };

    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number,
        signature: algorithm_identifier.clone(),
        issuer,
        validity: Validity {
            not_before: asn1_time(template.not_before)?,
            not_after: asn1_time(template.not_after)?,
        },
        subject,
        subject_public_key_info,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions,
    };

    let tbs_der = tbs_certificate
        .to_der()
        .map_err(|err| CaError::Internal(format!("TBS encoding: {err}")))?;

    let signature_bytes = match (algorithm, issuer_key) {
        (SignatureAlgorithm::Sha256WithRsa, IssuerKey::Rsa(key)) => {
            rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone())
                .sign(&tbs_der)
                .to_vec()
        }
        (SignatureAlgorithm::Sha384WithRsa, IssuerKey::Rsa(key)) => {
            rsa::pkcs1v15::SigningKey::<Sha384>::new(key.clone())
                .sign(&tbs_der)
                .to_vec()
        }
        (SignatureAlgorithm::Sha256WithRsaPss, IssuerKey::Rsa(key)) => {
            rsa::pss::SigningKey::<Sha256>::new(key.clone())
                .sign_with_rng(&mut OsRng, &tbs_der)
                .to_vec()
        }
        (SignatureAlgorithm::Sha256WithEcdsa, IssuerKey::Ecdsa(key)) => {
            let signature: p256::ecdsa::DerSignature = key.sign(&tbs_der);
            signature.to_vec()
        }
        (requested, _) => {
            return Err(CaError::BadInput(format!(
                "issuer key type does not match {}",
                requested.canonical_name()
            )))
        }
    };

    let certificate = Certificate {
        tbs_certificate,
        signature_algorithm: algorithm_identifier,
        signature: BitString::from_bytes(&signature_bytes)
            .map_err(|err| CaError::Internal(format!("signature encoding: {err}")))?,
    };

    let encoded = certificate
        .to_der()
        .map_err(|err| CaError::Internal(format!("certificate encoding: {err}")))?;
    debug!(
        serial = %template.serial,
        subject = %template.subject_dn,
        algorithm = algorithm.canonical_name(),
        bytes = encoded.len(),
        "certificate signed"
    );
    Ok(encoded)
}

/// Choose `UTCTime` before 2050 and `GeneralizedTime` after, per RFC 5280.
fn asn1_time(at: DateTime<Utc>) -> CaResult<Time> {
    let seconds = u64::try_from(at.timestamp())
        .map_err(|_| CaError::BadInput(format!("pre-epoch validity time {at}")))?;
    let duration = std::time::Duration::from_secs(seconds);
    let time = if at.year() < 2050 {
        Time::UtcTime(
            UtcTime::from_unix_duration(duration)
                .map_err(|err| CaError::BadInput(format!("validity time {at}: {err}")))?,
        )
    } else {
        Time::GeneralTime(
            GeneralizedTime::from_unix_duration(duration)
                .map_err(|err| CaError::BadInput(format!("validity time {at}: {err}")))?,
        )
    };
    Ok(time)
}
