//! ---
//! pki_section: "06-revocation"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Revocation processing and replay protection."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---

pub mod crl;
pub mod nonces;
pub mod processor;

pub use crl::{crl_reason_extension, invalidity_date_extension};
pub use nonces::NonceStore;
pub use processor::{
    CallerIdentity, RevocationConfig, RevocationProcessor, RevocationRequest, RevocationStage,
};
