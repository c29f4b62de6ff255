//! ---
//! pki_section: "08-shared-secrets"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Shared-secret store and subsystem exchange."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---

pub mod exchange;
pub mod store;

pub use exchange::{export_shared_secret, import_shared_secret};
pub use store::{SecretStore, SymmetricSecret};
