//! ---
//! pki_section: "07-key-archival"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Key wrapping, session keys, and archival envelopes."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use der::asn1::ObjectIdentifier;
use r_pki_common::{CaError, CaResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// DES-EDE3-CBC.
pub const OID_DES_EDE3_CBC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.3.7");
/// AES-128-CBC (the OID does not distinguish padding).
pub const OID_AES128_CBC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.2");
/// AES-128 key wrap (RFC 3394).
pub const OID_AES128_KEY_WRAP: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.5");
/// AES-128 key wrap with padding (RFC 5649).
pub const OID_AES128_KEY_WRAP_PAD: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.8");
/// rsaEncryption (PKCS#1 v1.5 key transport).
pub const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// id-RSAES-OAEP.
pub const OID_RSA_OAEP: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.7");

/// Key-protection families selectable by callers; each row fixes the
/// symmetric key type, key size, and payload algorithms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyWrapAlgorithm {
    /// AES session key, CBC with PKCS#7 padding for both wrap and encrypt.
    AesCbcPad,
    /// AES session key, RFC 3394 key wrap; unpadded CBC for passphrases.
    AesKeyWrap,
    /// AES session key, RFC 5649 key wrap; padded CBC for passphrases.
    AesKeyWrapPad,
    /// Legacy three-key triple DES in CBC with padding.
    Des3CbcPad,
    /// AES session key, RFC 5649 key wrap for both wrap and encrypt.
    AesKeyWrapPadKwp,
}

/// Symmetric session-key families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SymKeyType {
    /// AES.
    Aes,
    /// Three-key triple DES.
    Des3,
}

/// Asymmetric algorithm used to move the session key to the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportAlgorithm {
    /// RSA PKCS#1 v1.5.
    Rsa,
    /// RSA-OAEP with SHA-256 and MGF1-SHA-256.
    RsaOaepSha256,
}

impl TransportAlgorithm {
    /// Object identifier carried in the envelope's `intendedAlg` slot.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            TransportAlgorithm::Rsa => OID_RSA_ENCRYPTION,
            TransportAlgorithm::RsaOaepSha256 => OID_RSA_OAEP,
        }
    }
}

/// Symmetric algorithm applied to the payload under the session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadCipher {
    /// AES-128-CBC with PKCS#7 padding.
    Aes128CbcPad,
    /// AES-128-CBC without padding (input must be block aligned).
    Aes128Cbc,
    /// DES-EDE3-CBC with PKCS#7 padding.
    Des3CbcPad,
    /// AES-128 key wrap (RFC 3394).
    Aes128KeyWrap,
    /// AES-128 key wrap with padding (RFC 5649).
    Aes128KeyWrapPad,
}

impl PayloadCipher {
    /// Object identifier written into the envelope's algorithm identifier.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            PayloadCipher::Aes128CbcPad | PayloadCipher::Aes128Cbc => OID_AES128_CBC,
            PayloadCipher::Des3CbcPad => OID_DES_EDE3_CBC,
            PayloadCipher::Aes128KeyWrap => OID_AES128_KEY_WRAP,
            PayloadCipher::Aes128KeyWrapPad => OID_AES128_KEY_WRAP_PAD,
        }
    }

    /// Map an envelope OID back to a cipher. AES-128-CBC resolves to the
    /// padded variant, which is what the archive profile emits for
    /// passphrases; key-wrap OIDs are unambiguous.
    pub fn from_oid(oid: &ObjectIdentifier) -> CaResult<Self> {
        if *oid == OID_AES128_CBC {
            Ok(PayloadCipher::Aes128CbcPad)
        } else if *oid == OID_DES_EDE3_CBC {
            Ok(PayloadCipher::Des3CbcPad)
        } else if *oid == OID_AES128_KEY_WRAP {
            Ok(PayloadCipher::Aes128KeyWrap)
        } else if *oid == OID_AES128_KEY_WRAP_PAD {
            Ok(PayloadCipher::Aes128KeyWrapPad)
        } else {
            Err(CaError::UnsupportedAlgorithm(format!(
                "payload algorithm {oid}"
            )))
        }
    }

    /// IV length in bytes, `None` for the key-wrap modes.
    pub fn iv_len(&self) -> Option<usize> {
        match self {
            PayloadCipher::Aes128CbcPad | PayloadCipher::Aes128Cbc => Some(16),
            PayloadCipher::Des3CbcPad => Some(8),
            PayloadCipher::Aes128KeyWrap | PayloadCipher::Aes128KeyWrapPad => None,
        }
    }
}

/// Immutable bundle describing one key-protection operation. Constructed
/// once per operation from the requested [`KeyWrapAlgorithm`]; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappingParams {
    /// Session key family.
    pub sk_type: SymKeyType,
    /// Session key size in bits.
    pub sk_length_bits: u32,
    /// How the session key travels to the recipient.
    pub sk_wrap: TransportAlgorithm,
    /// Cipher applied to passphrase payloads (encrypt).
    pub payload_encryption: PayloadCipher,
    /// Cipher applied to key payloads (wrap).
    pub payload_wrap: PayloadCipher,
    /// IV for the encryption cipher, when it takes one.
    pub payload_encryption_iv: Option<Vec<u8>>,
    /// IV for the wrap cipher, when it takes one.
    pub payload_wrap_iv: Option<Vec<u8>>,
}

impl WrappingParams {
    /// Build params for a requested algorithm family, generating fresh IVs.
    ///
    /// | algorithm | key type | bits | passphrase cipher | key cipher |
    /// |---|---|---|---|---|
    /// | AES_CBC_PAD | AES | 128 | AES-128-CBC-PAD | AES-128-CBC-PAD |
    /// | AES_KEY_WRAP_PAD | AES | 128 | AES-128-CBC-PAD | AES-KW-PAD |
    /// | AES_KEY_WRAP | AES | 128 | AES-128-CBC | AES-KW |
    /// | DES3_CBC_PAD | DES3 | 168 | DES3-CBC-PAD | DES3-CBC-PAD |
    /// | AES_KEY_WRAP_PAD_KWP | AES | 128 | AES-KW-PAD | AES-KW-PAD |
    pub fn for_algorithm(algorithm: KeyWrapAlgorithm, sk_wrap: TransportAlgorithm) -> Self {
        let (sk_type, sk_length_bits, payload_encryption, payload_wrap) = match algorithm {
            KeyWrapAlgorithm::AesCbcPad => (
                SymKeyType::Aes,
                128,
                PayloadCipher::Aes128CbcPad,
                PayloadCipher::Aes128CbcPad,
            ),
            KeyWrapAlgorithm::AesKeyWrapPad => (
                SymKeyType::Aes,
                128,
                PayloadCipher::Aes128CbcPad,
                PayloadCipher::Aes128KeyWrapPad,
            ),
            KeyWrapAlgorithm::AesKeyWrap => (
                SymKeyType::Aes,
                128,
                PayloadCipher::Aes128Cbc,
                PayloadCipher::Aes128KeyWrap,
            ),
            KeyWrapAlgorithm::Des3CbcPad => (
                SymKeyType::Des3,
                168,
                PayloadCipher::Des3CbcPad,
                PayloadCipher::Des3CbcPad,
            ),
            KeyWrapAlgorithm::AesKeyWrapPadKwp => (
                SymKeyType::Aes,
                128,
                PayloadCipher::Aes128KeyWrapPad,
                PayloadCipher::Aes128KeyWrapPad,
            ),
        };
        Self {
            sk_type,
            sk_length_bits,
            sk_wrap,
            payload_encryption,
            payload_wrap,
            payload_encryption_iv: payload_encryption.iv_len().map(random_iv),
            payload_wrap_iv: payload_wrap.iv_len().map(random_iv),
        }
    }

    /// Session key length in bytes (DES3 carries parity bits, so 168 bits
    /// occupy 24 octets).
    pub fn sk_length_bytes(&self) -> usize {
        match self.sk_type {
            SymKeyType::Aes => (self.sk_length_bits / 8) as usize,
            SymKeyType::Des3 => 24,
        }
    }
}

fn random_iv(len: usize) -> Vec<u8> {
    let mut iv = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}
