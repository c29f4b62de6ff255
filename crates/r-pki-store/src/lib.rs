//! ---
//! pki_section: "03-certificate-store"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate records and repository bindings."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---

pub mod record;
pub mod repository;

pub use record::{
    CertStatus, CertificateRecord, RevocationInfo, RevocationReason, StatusChange, StoredExtension,
};
pub use repository::{CertificateRepository, InMemoryCertificateStore};
