//! ---
//! pki_section: "01-common-foundation"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Shared primitives and utilities for the R-PKI core."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use thiserror::Error;

/// Result alias used throughout the certificate-lifecycle crates.
pub type CaResult<T> = std::result::Result<T, CaError>;

/// Error taxonomy shared by the lifecycle and key-archival subsystems.
///
/// Validation classes (`NotFound`, `Conflict`, `Unauthorized`, `BadInput`)
/// are detected before any mutation and carry no side effects. Provider and
/// encoding failures surface as `Internal` and abort the whole transition.
#[derive(Debug, Error)]
pub enum CaError {
    /// Missing certificate, request, profile, or named secret.
    #[error("not found: {0}")]
    NotFound(String),
    /// Duplicate secret name, enabled-profile edit, or a status transition
    /// that lost a compare-and-set race.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Nonce mismatch, revoked caller certificate, or ownership violation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Malformed serial, missing required field, or unparsable input.
    #[error("bad input: {0}")]
    BadInput(String),
    /// Unmapped object identifier or signature algorithm name.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Cryptographic provider failure, encoding round-trip failure, or an
    /// unexpected persistence error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CaError {
    /// True when the error is a caller-side validation failure rather than a
    /// provider or persistence fault.
    pub fn is_validation(&self) -> bool {
        !matches!(self, CaError::Internal(_))
    }
}

impl From<std::io::Error> for CaError {
    fn from(err: std::io::Error) -> Self {
        CaError::Internal(format!("io error: {err}"))
    }
}

impl From<serde_json::Error> for CaError {
    fn from(err: serde_json::Error) -> Self {
        CaError::Internal(format!("serialization error: {err}"))
    }
}
