//! ---
//! pki_section: "07-key-archival"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Key wrapping, session keys, and archival envelopes."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use r_pki_common::{CaError, CaResult};
use rand::rngs::OsRng;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;

use crate::algorithms::TransportAlgorithm;

/// Wrap session-key material under the recipient's RSA public key.
pub fn wrap_session_key(
    algorithm: TransportAlgorithm,
    recipient: &RsaPublicKey,
    material: &[u8],
) -> CaResult<Vec<u8>> {
    let mut rng = OsRng;
    match algorithm {
        TransportAlgorithm::Rsa => recipient
            .encrypt(&mut rng, Pkcs1v15Encrypt, material)
            .map_err(|err| CaError::Internal(format!("rsa wrap: {err}"))),
        TransportAlgorithm::RsaOaepSha256 => recipient
            .encrypt(&mut rng, Oaep::new::<Sha256>(), material)
            .map_err(|err| CaError::Internal(format!("rsa-oaep wrap: {err}"))),
    }
}

/// Recover session-key material with the unwrapping private key.
///
/// Plain RSA is attempted first, then RSA-OAEP with SHA-256/MGF1-SHA-256 on
/// any failure. Some hardware modules support only one mode, so the
/// two-attempt fallback is deliberate; it also means a wrong key and a
/// wrong algorithm are indistinguishable here.
pub fn unwrap_session_key(private: &RsaPrivateKey, wrapped: &[u8]) -> CaResult<Vec<u8>> {
    match private.decrypt(Pkcs1v15Encrypt, wrapped) {
        Ok(material) => Ok(material),
        Err(first) => {
            debug!(error = %first, "pkcs1v15 unwrap failed, retrying with rsa-oaep");
            private
                .decrypt(Oaep::new::<Sha256>(), wrapped)
                .map_err(|second| {
                    CaError::Internal(format!(
                        "session key unwrap failed (pkcs1v15: {first}; oaep: {second})"
                    ))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    #[test]
    fn plain_rsa_round_trip() {
        let (private, public) = keypair();
        let material = [0x11u8; 16];
        let wrapped = wrap_session_key(TransportAlgorithm::Rsa, &public, &material).unwrap();
        assert_eq!(unwrap_session_key(&private, &wrapped).unwrap(), material);
    }

    #[test]
    fn oaep_round_trip_via_fallback() {
        let (private, public) = keypair();
        let material = [0x22u8; 16];
        let wrapped =
            wrap_session_key(TransportAlgorithm::RsaOaepSha256, &public, &material).unwrap();
        // The pkcs1v15 attempt fails and the OAEP fallback recovers it.
        assert_eq!(unwrap_session_key(&private, &wrapped).unwrap(), material);
    }

    #[test]
    fn wrong_key_fails_both_attempts() {
        let (_, public) = keypair();
        let (other_private, _) = keypair();
        let wrapped = wrap_session_key(TransportAlgorithm::Rsa, &public, &[0x33u8; 16]).unwrap();
        assert!(matches!(
            unwrap_session_key(&other_private, &wrapped),
            Err(CaError::Internal(_))
        ));
    }
}
