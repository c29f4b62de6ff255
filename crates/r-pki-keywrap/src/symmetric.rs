//! ---
//! pki_section: "07-key-archival"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Key wrapping, session keys, and archival envelopes."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use aes::Aes128;
use aes_kw::Kek;
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::{NoPadding, Pkcs7};
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::TdesEde3;
use r_pki_common::{CaError, CaResult};

use crate::algorithms::PayloadCipher;

/// Protect `data` under `key` with the given cipher (both the wrap and the
/// encrypt direction of the protocol funnel through here; the caller picks
/// the cipher according to whether the payload is a key or a passphrase).
pub fn seal(
    cipher: PayloadCipher,
    key: &[u8],
    iv: Option<&[u8]>,
    data: &[u8],
) -> CaResult<Vec<u8>> {
    match cipher {
        PayloadCipher::Aes128CbcPad => {
            let enc = Encryptor::<Aes128>::new_from_slices(key, require_iv(iv, 16)?)
                .map_err(|err| CaError::Internal(format!("cbc init: {err}")))?;
            Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(data))
        }
        PayloadCipher::Aes128Cbc => {
            if data.len() % 16 != 0 {
                return Err(CaError::BadInput(
                    "unpadded AES-CBC payload must be a multiple of 16 bytes".into(),
                ));
            }
            let enc = Encryptor::<Aes128>::new_from_slices(key, require_iv(iv, 16)?)
                .map_err(|err| CaError::Internal(format!("cbc init: {err}")))?;
            Ok(enc.encrypt_padded_vec_mut::<NoPadding>(data))
        }
        PayloadCipher::Des3CbcPad => {
            let enc = Encryptor::<TdesEde3>::new_from_slices(key, require_iv(iv, 8)?)
                .map_err(|err| CaError::Internal(format!("3des cbc init: {err}")))?;
            Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(data))
        }
        PayloadCipher::Aes128KeyWrap => {
            if data.is_empty() || data.len() % 8 != 0 {
                return Err(CaError::BadInput(
                    "key-wrap input must be a non-empty multiple of 8 bytes".into(),
                ));
            }
            let kek = kek_128(key)?;
            let mut out = vec![0u8; data.len() + 8];
            kek.wrap(data, &mut out)
                .map_err(|err| CaError::Internal(format!("aes key wrap: {err:?}")))?;
            Ok(out)
        }
        PayloadCipher::Aes128KeyWrapPad => {
            let kek = kek_128(key)?;
            let mut out = vec![0u8; padded_wrap_len(data.len())];
            kek.wrap_with_padding(data, &mut out)
                .map_err(|err| CaError::Internal(format!("aes key wrap pad: {err:?}")))?;
            Ok(out)
        }
    }
}

/// Inverse of [`seal`].
pub fn open(
    cipher: PayloadCipher,
    key: &[u8],
    iv: Option<&[u8]>,
    data: &[u8],
) -> CaResult<Vec<u8>> {
    match cipher {
        PayloadCipher::Aes128CbcPad => {
            let dec = Decryptor::<Aes128>::new_from_slices(key, require_iv(iv, 16)?)
                .map_err(|err| CaError::Internal(format!("cbc init: {err}")))?;
            dec.decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(|err| CaError::Internal(format!("cbc unpad: {err}")))
        }
        PayloadCipher::Aes128Cbc => {
            let dec = Decryptor::<Aes128>::new_from_slices(key, require_iv(iv, 16)?)
                .map_err(|err| CaError::Internal(format!("cbc init: {err}")))?;
            dec.decrypt_padded_vec_mut::<NoPadding>(data)
                .map_err(|err| CaError::Internal(format!("cbc decrypt: {err}")))
        }
        PayloadCipher::Des3CbcPad => {
            let dec = Decryptor::<TdesEde3>::new_from_slices(key, require_iv(iv, 8)?)
                .map_err(|err| CaError::Internal(format!("3des cbc init: {err}")))?;
            dec.decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(|err| CaError::Internal(format!("3des unpad: {err}")))
        }
        PayloadCipher::Aes128KeyWrap => {
            if data.len() < 24 || data.len() % 8 != 0 {
                return Err(CaError::BadInput("malformed wrapped key".into()));
            }
            let kek = kek_128(key)?;
            let mut out = vec![0u8; data.len() - 8];
            kek.unwrap(data, &mut out)
                .map_err(|err| CaError::Internal(format!("aes key unwrap: {err:?}")))?;
            Ok(out)
        }
        PayloadCipher::Aes128KeyWrapPad => {
            if data.len() < 16 || data.len() % 8 != 0 {
                return Err(CaError::BadInput("malformed wrapped key".into()));
            }
            let kek = kek_128(key)?;
            let mut out = vec![0u8; data.len() - 8];
            let unwrapped = kek
                .unwrap_with_padding(data, &mut out)
                .map_err(|err| CaError::Internal(format!("aes key unwrap pad: {err:?}")))?;
            Ok(unwrapped.to_vec())
        }
    }
}

fn require_iv<'a>(iv: Option<&'a [u8]>, len: usize) -> CaResult<&'a [u8]> {
    match iv {
        Some(iv) if iv.len() == len => Ok(iv),
        Some(iv) => Err(CaError::BadInput(format!(
            "initialization vector must be {len} bytes, got {}",
            iv.len()
        ))),
        None => Err(CaError::BadInput(
            "cipher requires an initialization vector".into(),
        )),
    }
}

fn kek_128(key: &[u8]) -> CaResult<Kek<Aes128>> {
    let arr: [u8; 16] = key
        .try_into()
        .map_err(|_| CaError::BadInput("key-encryption key must be 16 bytes".into()))?;
    Ok(Kek::from(arr))
}

fn padded_wrap_len(data_len: usize) -> usize {
    8 * data_len.div_ceil(8) + 8
}
