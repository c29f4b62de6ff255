//! ---
//! pki_section: "07-key-archival"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Key wrapping, session keys, and archival envelopes."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use r_pki_common::{CaError, CaResult, ComplianceMode};
use rand::RngCore;

use crate::algorithms::{SymKeyType, WrappingParams};

/// Ephemeral symmetric session key. In strict compliance mode the raw
/// material never leaves this crate; only the wrap/encrypt primitives read
/// it.
pub struct SessionKey {
    material: Vec<u8>,
    extractable: bool,
}

impl SessionKey {
    /// Generate a fresh session key for the given parameters.
    pub fn generate(params: &WrappingParams, compliance: ComplianceMode) -> Self {
        let mut material = vec![0u8; params.sk_length_bytes()];
        rand::thread_rng().fill_bytes(&mut material);
        if params.sk_type == SymKeyType::Des3 {
            fix_des_parity(&mut material);
        }
        Self {
            material,
            extractable: compliance == ComplianceMode::Relaxed,
        }
    }

    /// Raw material for the wrap/encrypt primitives.
    pub(crate) fn material(&self) -> &[u8] {
        &self.material
    }

    /// Export the raw key bytes; refused for non-extractable keys.
    pub fn try_export(&self) -> CaResult<Vec<u8>> {
        if !self.extractable {
            return Err(CaError::Unauthorized(
                "session key is not extractable in strict compliance mode".into(),
            ));
        }
        Ok(self.material.clone())
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.material.len()
    }

    /// Whether the key material is empty (never, for generated keys).
    pub fn is_empty(&self) -> bool {
        self.material.is_empty()
    }
}

/// Set each DES key octet to odd parity, as the hardware expects.
fn fix_des_parity(material: &mut [u8]) {
    for byte in material.iter_mut() {
        if byte.count_ones() % 2 == 0 {
            *byte ^= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{KeyWrapAlgorithm, TransportAlgorithm};

    #[test]
    fn aes_session_key_has_requested_length() {
        let params =
            WrappingParams::for_algorithm(KeyWrapAlgorithm::AesCbcPad, TransportAlgorithm::Rsa);
        let key = SessionKey::generate(&params, ComplianceMode::Relaxed);
        assert_eq!(key.len(), 16);
        assert_eq!(key.try_export().unwrap().len(), 16);
    }

    #[test]
    fn des3_session_key_has_odd_parity() {
        let params =
            WrappingParams::for_algorithm(KeyWrapAlgorithm::Des3CbcPad, TransportAlgorithm::Rsa);
        let key = SessionKey::generate(&params, ComplianceMode::Relaxed);
        assert_eq!(key.len(), 24);
        for byte in key.try_export().unwrap() {
            assert_eq!(byte.count_ones() % 2, 1, "byte {byte:#x} has even parity");
        }
    }

    #[test]
    fn strict_mode_refuses_export() {
        let params =
            WrappingParams::for_algorithm(KeyWrapAlgorithm::AesKeyWrap, TransportAlgorithm::Rsa);
        let key = SessionKey::generate(&params, ComplianceMode::Strict);
        assert!(matches!(key.try_export(), Err(CaError::Unauthorized(_))));
    }
}
