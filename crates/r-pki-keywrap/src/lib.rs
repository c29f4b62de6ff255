//! ---
//! pki_section: "07-key-archival"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Key wrapping, session keys, and archival envelopes."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Key-wrapping protocol used whenever a private key, symmetric key, or
//! passphrase crosses a trust boundary (archival, recovery, clone
//! bootstrapping).
//!
//! The distinction between *wrap* and *encrypt* is load-bearing: wrapping
//! protects a key object destined for re-import as a key, encryption
//! protects opaque bytes such as passphrases.

pub mod algorithms;
pub mod envelope;
pub mod session;
pub mod symmetric;
pub mod transport;

pub use algorithms::{
    KeyWrapAlgorithm, PayloadCipher, SymKeyType, TransportAlgorithm, WrappingParams,
};
pub use envelope::{
    create_pki_archive_options, import_pki_archive_options, ArchiveOptions, ArchivePayload,
};
pub use session::SessionKey;
pub use transport::{unwrap_session_key, wrap_session_key};
