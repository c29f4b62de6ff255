//! ---
//! pki_section: "01-common-foundation"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Shared primitives and utilities for the R-PKI core."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod serial;

pub use config::{
    AuditConfig, AuthorityConfig, ComplianceMode, LoadedAuthorityConfig, LoggingConfig,
    ProcessingMode, SigningConfig,
};
pub use error::{CaError, CaResult};
pub use logging::{init_tracing, LogFormat};
pub use serial::SerialNumber;
