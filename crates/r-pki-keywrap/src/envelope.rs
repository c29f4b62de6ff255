//! ---
//! pki_section: "07-key-archival"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Key wrapping, session keys, and archival envelopes."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use der::asn1::{BitString, OctetString};
use der::{Decode, Encode, Sequence};
use r_pki_common::{CaError, CaResult, ComplianceMode};
use rsa::{RsaPrivateKey, RsaPublicKey};
use spki::AlgorithmIdentifierOwned;
use tracing::debug;

use crate::algorithms::{PayloadCipher, WrappingParams};
use crate::session::SessionKey;
use crate::{symmetric, transport};

/// `PKIArchiveOptions` payload envelope, following the CRMF `EncryptedValue`
/// layout (RFC 4211 §6.1, implicit tags):
///
/// ```text
/// EncryptedValue ::= SEQUENCE {
///     intendedAlg [0] AlgorithmIdentifier OPTIONAL,
///     symmAlg     [1] AlgorithmIdentifier OPTIONAL,
///     encSymmKey  [2] BIT STRING          OPTIONAL,
///     encValue        BIT STRING
/// }
/// ```
///
/// `symmAlg` carries the payload cipher OID with the IV as an OCTET STRING
/// parameter; `encSymmKey` is the transported session key.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ArchiveOptions {
    /// Algorithm the session key was wrapped with.
    #[asn1(context_specific = "0", optional = "true", tag_mode = "IMPLICIT")]
    pub intended_alg: Option<AlgorithmIdentifierOwned>,
    /// Symmetric cipher protecting the payload.
    #[asn1(context_specific = "1", optional = "true", tag_mode = "IMPLICIT")]
    pub symm_alg: Option<AlgorithmIdentifierOwned>,
    /// Session key wrapped under the recipient public key.
    #[asn1(context_specific = "2", optional = "true", tag_mode = "IMPLICIT")]
    pub enc_symm_key: Option<BitString>,
    /// Payload protected under the session key.
    pub enc_value: BitString,
}

/// Material being archived. Keys are *wrapped* (type-preserving), while
/// passphrases are *encrypted* as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchivePayload {
    /// A passphrase protecting something else downstream.
    Passphrase(String),
    /// A private key in PKCS#8 DER form.
    PrivateKey(Vec<u8>),
    /// Raw symmetric key material.
    SymmetricKey(Vec<u8>),
}

impl ArchivePayload {
    /// Byte view handed to the symmetric layer.
    pub fn bytes(&self) -> &[u8] {
        match self {
            ArchivePayload::Passphrase(p) => p.as_bytes(),
            ArchivePayload::PrivateKey(der) => der,
            ArchivePayload::SymmetricKey(bytes) => bytes,
        }
    }

    fn is_passphrase(&self) -> bool {
        matches!(self, ArchivePayload::Passphrase(_))
    }
}

/// Build, DER-encode, and self-verify a `PKIArchiveOptions` envelope.
///
/// A fresh session key protects the payload; the session key itself travels
/// under the recipient public key. The encoding is immediately decoded and
/// re-encoded: any mismatch is an encoding bug and aborts with `Internal`.
pub fn create_pki_archive_options(
    recipient: &RsaPublicKey,
    payload: &ArchivePayload,
    params: &WrappingParams,
    compliance: ComplianceMode,
) -> CaResult<Vec<u8>> {
    let session = SessionKey::generate(params, compliance);

    let (cipher, iv) = if payload.is_passphrase() {
        (params.payload_encryption, params.payload_encryption_iv.as_deref())
    } else {
        (params.payload_wrap, params.payload_wrap_iv.as_deref())
    };

    let protected = symmetric::seal(cipher, session.material(), iv, payload.bytes())?;
    let wrapped_session = transport::wrap_session_key(params.sk_wrap, recipient, session.material())?;

    let options = ArchiveOptions {
        intended_alg: Some(AlgorithmIdentifierOwned {
            oid: params.sk_wrap.oid(),
            parameters: None,
        }),
        symm_alg: Some(AlgorithmIdentifierOwned {
            oid: cipher.oid(),
            parameters: iv.map(iv_parameter).transpose()?,
        }),
        enc_symm_key: Some(
            BitString::from_bytes(&wrapped_session)
                .map_err(|err| CaError::Internal(format!("encSymmKey encoding: {err}")))?,
        ),
        enc_value: BitString::from_bytes(&protected)
            .map_err(|err| CaError::Internal(format!("encValue encoding: {err}")))?,
    };

    let encoded = options
        .to_der()
        .map_err(|err| CaError::Internal(format!("archive options encoding: {err}")))?;

    // Self-verify: decode failure or a re-encode mismatch here is a fatal
    // encoding bug, not a recoverable condition.
    let reparsed = ArchiveOptions::from_der(&encoded)
        .map_err(|err| CaError::Internal(format!("archive options round-trip decode: {err}")))?;
    if reparsed != options {
        return Err(CaError::Internal(
            "archive options round-trip produced a different structure".into(),
        ));
    }
    let reencoded = reparsed
        .to_der()
        .map_err(|err| CaError::Internal(format!("archive options re-encoding: {err}")))?;
    if reencoded != encoded {
        return Err(CaError::Internal(
            "archive options re-encoding is not bit-identical".into(),
        ));
    }

    debug!(cipher = ?cipher, bytes = encoded.len(), "archive options assembled");
    Ok(encoded)
}

/// Decode an envelope and recover the original payload bytes.
///
/// The payload cipher is identified by OID; the session key is unwrapped
/// with plain RSA first and RSA-OAEP(SHA-256) on failure (see
/// [`transport::unwrap_session_key`]).
pub fn import_pki_archive_options(
    private: &RsaPrivateKey,
    encoded: &[u8],
) -> CaResult<Vec<u8>> {
    let options = ArchiveOptions::from_der(encoded)
        .map_err(|err| CaError::BadInput(format!("malformed archive options: {err}")))?;

    let symm_alg = options
        .symm_alg
        .ok_or_else(|| CaError::BadInput("archive options missing symmAlg".into()))?;
    let cipher = PayloadCipher::from_oid(&symm_alg.oid)?;

    let iv = match symm_alg.parameters {
        Some(params) => Some(
            params
                .decode_as::<OctetString>()
                .map_err(|err| CaError::BadInput(format!("malformed IV parameter: {err}")))?
                .as_bytes()
                .to_vec(),
        ),
        None => None,
    };
    if cipher.iv_len().is_some() && iv.is_none() {
        return Err(CaError::BadInput(
            "payload cipher requires an IV parameter".into(),
        ));
    }

    let wrapped_session = options
        .enc_symm_key
        .ok_or_else(|| CaError::BadInput("archive options missing encSymmKey".into()))?;
    let session = transport::unwrap_session_key(private, wrapped_session.raw_bytes())?;

    symmetric::open(cipher, &session, iv.as_deref(), options.enc_value.raw_bytes())
}

fn iv_parameter(iv: &[u8]) -> CaResult<der::Any> {
    let octets = OctetString::new(iv)
        .map_err(|err| CaError::Internal(format!("IV encoding: {err}")))?;
    let der = octets
        .to_der()
        .map_err(|err| CaError::Internal(format!("IV encoding: {err}")))?;
    der::Any::from_der(&der).map_err(|err| CaError::Internal(format!("IV encoding: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{KeyWrapAlgorithm, TransportAlgorithm};
    use once_cell::sync::Lazy;
    use rand::rngs::OsRng;

    static KEYPAIR: Lazy<(RsaPrivateKey, RsaPublicKey)> = Lazy::new(|| {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);
        (private, public)
    });

    fn round_trip(algorithm: KeyWrapAlgorithm, transport: TransportAlgorithm, payload: ArchivePayload) {
        let (private, public) = &*KEYPAIR;
        let params = WrappingParams::for_algorithm(algorithm, transport);
        let encoded =
            create_pki_archive_options(public, &payload, &params, ComplianceMode::Relaxed)
                .unwrap();
        let recovered = import_pki_archive_options(private, &encoded).unwrap();
        assert_eq!(recovered, payload.bytes());
    }

    #[test]
    fn symmetric_key_round_trips_across_families() {
        let key = ArchivePayload::SymmetricKey(vec![0x5a; 32]);
        round_trip(KeyWrapAlgorithm::AesCbcPad, TransportAlgorithm::Rsa, key.clone());
        round_trip(KeyWrapAlgorithm::AesKeyWrap, TransportAlgorithm::Rsa, key.clone());
        round_trip(
            KeyWrapAlgorithm::AesKeyWrapPad,
            TransportAlgorithm::RsaOaepSha256,
            key.clone(),
        );
        round_trip(KeyWrapAlgorithm::Des3CbcPad, TransportAlgorithm::Rsa, key.clone());
        round_trip(KeyWrapAlgorithm::AesKeyWrapPadKwp, TransportAlgorithm::Rsa, key);
    }

    #[test]
    fn passphrase_round_trips_with_padded_families() {
        let passphrase = ArchivePayload::Passphrase("correct horse battery staple".into());
        round_trip(KeyWrapAlgorithm::AesCbcPad, TransportAlgorithm::Rsa, passphrase.clone());
        round_trip(
            KeyWrapAlgorithm::AesKeyWrapPad,
            TransportAlgorithm::Rsa,
            passphrase.clone(),
        );
        round_trip(
            KeyWrapAlgorithm::Des3CbcPad,
            TransportAlgorithm::RsaOaepSha256,
            passphrase.clone(),
        );
        round_trip(KeyWrapAlgorithm::AesKeyWrapPadKwp, TransportAlgorithm::Rsa, passphrase);
    }

    #[test]
    fn private_key_round_trips_under_key_wrap() {
        use pkcs8::EncodePrivateKey;
        let (private, _) = &*KEYPAIR;
        let key_der = private.to_pkcs8_der().unwrap().as_bytes().to_vec();
        round_trip(
            KeyWrapAlgorithm::AesKeyWrapPad,
            TransportAlgorithm::Rsa,
            ArchivePayload::PrivateKey(key_der),
        );
    }

    #[test]
    fn strict_compliance_mode_still_archives() {
        let (private, public) = &*KEYPAIR;
        let params =
            WrappingParams::for_algorithm(KeyWrapAlgorithm::AesCbcPad, TransportAlgorithm::Rsa);
        let payload = ArchivePayload::SymmetricKey(vec![0x77; 16]);
        let encoded =
            create_pki_archive_options(public, &payload, &params, ComplianceMode::Strict).unwrap();
        assert_eq!(
            import_pki_archive_options(private, &encoded).unwrap(),
            payload.bytes()
        );
    }

    #[test]
    fn encoding_is_stable_bit_for_bit() {
        let (_, public) = &*KEYPAIR;
        let params =
            WrappingParams::for_algorithm(KeyWrapAlgorithm::AesCbcPad, TransportAlgorithm::Rsa);
        let payload = ArchivePayload::Passphrase("stable".into());
        let encoded =
            create_pki_archive_options(public, &payload, &params, ComplianceMode::Relaxed)
                .unwrap();
        let reparsed = ArchiveOptions::from_der(&encoded).unwrap();
        assert_eq!(reparsed.to_der().unwrap(), encoded);
    }

    #[test]
    fn unknown_payload_oid_is_unsupported() {
        let (private, _) = &*KEYPAIR;
        let options = ArchiveOptions {
            intended_alg: None,
            symm_alg: Some(AlgorithmIdentifierOwned {
                oid: der::asn1::ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1"),
                parameters: None,
            }),
            enc_symm_key: Some(BitString::from_bytes(&[0u8; 256]).unwrap()),
            enc_value: BitString::from_bytes(&[0u8; 16]).unwrap(),
        };
        let encoded = options.to_der().unwrap();
        assert!(matches!(
            import_pki_archive_options(private, &encoded),
            Err(CaError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn truncated_envelope_is_bad_input() {
        let (private, public) = &*KEYPAIR;
        let params =
            WrappingParams::for_algorithm(KeyWrapAlgorithm::AesCbcPad, TransportAlgorithm::Rsa);
        let encoded = create_pki_archive_options(
            public,
            &ArchivePayload::Passphrase("x".into()),
            &params,
            ComplianceMode::Relaxed,
        )
        .unwrap();
        assert!(matches!(
            import_pki_archive_options(private, &encoded[..encoded.len() / 2]),
            Err(CaError::BadInput(_))
        ));
    }
}
