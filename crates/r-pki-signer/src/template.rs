//! ---
//! pki_section: "09-certificate-signing"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate templates and issuance signing."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use r_pki_common::SerialNumber;

/// Extension slotted into a template before signing, already DER-encoded by
/// the profile output that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateExtension {
    /// Dotted object identifier.
    pub oid: String,
    /// Criticality flag.
    pub critical: bool,
    /// DER-encoded extension value (the content of the OCTET STRING).
    pub value: Vec<u8>,
}

/// Everything the signer needs to assemble a to-be-signed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertTemplate {
    /// Serial number assigned by the issuance path.
    pub serial: SerialNumber,
    /// Issuer distinguished name (RFC 4514 string form).
    pub issuer_dn: String,
    /// Subject distinguished name (RFC 4514 string form).
    pub subject_dn: String,
    /// Validity window start.
    pub not_before: DateTime<Utc>,
    /// Validity window end.
    pub not_after: DateTime<Utc>,
    /// Subject public key as a DER-encoded `SubjectPublicKeyInfo`.
    pub spki_der: Vec<u8>,
    /// Certificate extensions.
    pub extensions: Vec<TemplateExtension>,
}

impl CertTemplate {
    /// Create a template with no extensions.
    pub fn new(
        serial: SerialNumber,
        issuer_dn: impl Into<String>,
        subject_dn: impl Into<String>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        spki_der: Vec<u8>,
    ) -> Self {
        Self {
            serial,
            issuer_dn: issuer_dn.into(),
            subject_dn: subject_dn.into(),
            not_before,
            not_after,
            spki_der,
            extensions: Vec::new(),
        }
    }

    /// Append an extension.
    pub fn with_extension(mut self, extension: TemplateExtension) -> Self {
        self.extensions.push(extension);
        self
    }
}
