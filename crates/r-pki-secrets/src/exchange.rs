//! ---
//! pki_section: "08-shared-secrets"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Shared-secret store and subsystem exchange."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use r_pki_common::{CaError, CaResult};
use r_pki_keywrap::symmetric;
use r_pki_keywrap::{unwrap_session_key, wrap_session_key, PayloadCipher, TransportAlgorithm};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;

use crate::store::{SecretStore, SymmetricSecret};

// The secret itself is always wrapped AES-CBC-PAD under the transport key
// with a zero IV the size of the cipher block.
const ZERO_IV: [u8; 16] = [0u8; 16];

/// Export the named shared secret for another subsystem instance.
///
/// The transport key is wrapped under the peer certificate's public key
/// (plain RSA, or RSA-OAEP when `use_oaep` is set); the secret is wrapped
/// under the transport key. Returns `(wrapped_transport_key, wrapped_secret)`
/// in that order.
pub fn export_shared_secret(
    store: &SecretStore,
    name: &str,
    wrapping_public: &RsaPublicKey,
    transport_key: &[u8],
    use_oaep: bool,
) -> CaResult<(Vec<u8>, Vec<u8>)> {
    let secret = store.get(name)?;
    if transport_key.len() != 16 {
        return Err(CaError::BadInput(format!(
            "transport key must be a 16-byte AES key, got {} bytes",
            transport_key.len()
        )));
    }

    let algorithm = if use_oaep {
        TransportAlgorithm::RsaOaepSha256
    } else {
        TransportAlgorithm::Rsa
    };
    let wrapped_transport = wrap_session_key(algorithm, wrapping_public, transport_key)?;
    let wrapped_secret = symmetric::seal(
        PayloadCipher::Aes128CbcPad,
        transport_key,
        Some(&ZERO_IV),
        &secret.material,
    )?;

    info!(name = %name, oaep = use_oaep, "shared secret exported");
    Ok((wrapped_transport, wrapped_secret))
}

/// Import a shared secret exported by a peer subsystem.
///
/// The transport key is recovered with this subsystem's private key (plain
/// RSA first, RSA-OAEP(SHA-256) on failure), then the secret is unwrapped
/// and stored as a new permanent key named `target_name`. Fails with
/// `Conflict` if a secret of that name already exists.
pub fn import_shared_secret(
    store: &SecretStore,
    wrapped_transport: &[u8],
    wrapped_secret: &[u8],
    subsystem_private: &RsaPrivateKey,
    target_name: &str,
) -> CaResult<()> {
    if store.contains(target_name) {
        return Err(CaError::Conflict(format!(
            "secret {target_name} already exists"
        )));
    }

    let transport_key = unwrap_session_key(subsystem_private, wrapped_transport)?;
    if transport_key.len() != 16 {
        return Err(CaError::BadInput(format!(
            "recovered transport key has unexpected length {}",
            transport_key.len()
        )));
    }
    let material = symmetric::open(
        PayloadCipher::Aes128CbcPad,
        &transport_key,
        Some(&ZERO_IV),
        wrapped_secret,
    )?;

    store.insert_new(target_name, SymmetricSecret::aes(material))?;
    info!(name = %target_name, "shared secret imported");
    Ok(())
}
