//! ---
//! pki_section: "09-certificate-signing"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate templates and issuance signing."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---

pub mod algorithm;
pub mod signer;
pub mod template;

pub use algorithm::SignatureAlgorithm;
pub use signer::{sign_cert, IssuerKey};
pub use template::{CertTemplate, TemplateExtension};
