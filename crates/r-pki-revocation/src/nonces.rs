//! ---
//! pki_section: "06-revocation"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Revocation processing and replay protection."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::collections::HashMap;

use parking_lot::Mutex;
use r_pki_common::{CaError, CaResult, SerialNumber};
use rand::Rng;
use tracing::debug;

/// Single-use nonces binding a certificate-retrieval session to its
/// subsequent revoke/unrevoke call.
///
/// The check-then-consume sequence runs under one lock, so concurrent calls
/// presenting the same nonce see exactly one success. A mismatching nonce
/// does not consume the stored one.
#[derive(Debug, Default)]
pub struct NonceStore {
    entries: Mutex<HashMap<(String, SerialNumber), u64>>,
}

impl NonceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a nonce for `(session_key, serial)`, replacing any prior one.
    pub fn issue(&self, session_key: &str, serial: &SerialNumber) -> u64 {
        let nonce: u64 = rand::thread_rng().gen();
        self.entries
            .lock()
            .insert((session_key.to_owned(), serial.clone()), nonce);
        debug!(serial = %serial, "nonce issued");
        nonce
    }

    /// Validate and consume the nonce for `(session_key, serial)`.
    ///
    /// An exact match removes the entry and succeeds; a mismatch or a
    /// missing entry fails with `Unauthorized` and leaves the store
    /// untouched.
    pub fn consume(&self, session_key: &str, serial: &SerialNumber, nonce: u64) -> CaResult<()> {
        let mut entries = self.entries.lock();
        let key = (session_key.to_owned(), serial.clone());
        match entries.get(&key) {
            Some(expected) if *expected == nonce => {
                entries.remove(&key);
                debug!(serial = %serial, "nonce consumed");
                Ok(())
            }
            Some(_) => Err(CaError::Unauthorized(format!(
                "nonce mismatch for certificate {serial}"
            ))),
            None => Err(CaError::Unauthorized(format!(
                "no nonce outstanding for certificate {serial}"
            ))),
        }
    }

    /// Number of outstanding nonces (diagnostics).
    pub fn outstanding(&self) -> usize {
        self.entries.lock().len()
    }
}
