//! ---
//! pki_section: "01-common-foundation"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Shared primitives and utilities for the R-PKI core."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_nonce_protection() -> bool {
    true
}

fn default_trusted_subsystem_group() -> String {
    "Trusted Managers".to_owned()
}

fn default_drain_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_signing_algorithm() -> String {
    "SHA256withRSA".to_owned()
}

fn default_validity_days() -> u32 {
    365
}

fn default_audit_directory() -> PathBuf {
    PathBuf::from("target/audit")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Whether revocation-request side effects commit inside the submitting call
/// or when the queue is drained by a background worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Execute the internal request synchronously at submission time.
    #[default]
    Inline,
    /// Park the internal request until `RequestQueue::drain` runs.
    Queued,
}

/// Cryptographic compliance posture of the authority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceMode {
    /// Relaxed mode suitable for development; session keys are extractable.
    #[default]
    Relaxed,
    /// Strict mode: ephemeral session keys are never handed back to callers.
    Strict,
}

/// Defaults applied when a certificate template omits signing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Canonical signature algorithm name (e.g. `SHA256withRSA`).
    #[serde(default = "default_signing_algorithm")]
    pub default_algorithm: String,
    /// Validity window applied when a profile supplies none.
    #[serde(default = "default_validity_days")]
    pub default_validity_days: u32,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            default_algorithm: default_signing_algorithm(),
            default_validity_days: default_validity_days(),
        }
    }
}

/// Location of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Directory holding the audit files.
    #[serde(default = "default_audit_directory")]
    pub directory: PathBuf,
    /// Optional file prefix; the service name is used when unset.
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            directory: default_audit_directory(),
            file_prefix: None,
        }
    }
}

/// Tracing output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Stdout format.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Optional file prefix; the service name is used when unset.
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Primary configuration object for the certificate authority core.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Require a single-use nonce on revoke/unrevoke calls.
    #[serde(default = "default_nonce_protection")]
    pub nonce_protection: bool,
    /// Group whose members bypass nonce validation (subsystem-to-subsystem
    /// traffic authenticated by client certificate).
    #[serde(default = "default_trusted_subsystem_group")]
    pub trusted_subsystem_group: String,
    /// Inline or queued commit of internal requests.
    #[serde(default)]
    pub processing: ProcessingMode,
    /// Interval between queue drains when `processing = queued`.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_drain_interval")]
    pub drain_interval: Duration,
    /// Compliance posture forwarded to the key-archival layer.
    #[serde(default)]
    pub compliance: ComplianceMode,
    /// Certificate signing defaults.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Audit sink location.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Tracing output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            nonce_protection: default_nonce_protection(),
            trusted_subsystem_group: default_trusted_subsystem_group(),
            processing: ProcessingMode::default(),
            drain_interval: default_drain_interval(),
            compliance: ComplianceMode::default(),
            signing: SigningConfig::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Metadata describing where an [`AuthorityConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAuthorityConfig {
    /// Parsed configuration.
    pub config: AuthorityConfig,
    /// Path the configuration was read from.
    pub source: PathBuf,
}

impl AuthorityConfig {
    /// Environment variable that overrides the configuration search path.
    pub const ENV_CONFIG_PATH: &'static str = "R_PKI_CONFIG";

    /// Load configuration from disk, respecting the `R_PKI_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAuthorityConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            let path = PathBuf::from(env_path);
            let config = Self::from_path(&path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            return Ok(LoadedAuthorityConfig {
                config,
                source: path,
            });
        }
        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                debug!(path = %path.display(), "authority config candidate selected");
                let config = Self::from_path(path)
                    .with_context(|| format!("loading config from {}", path.display()))?;
                return Ok(LoadedAuthorityConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }
        Err(anyhow!("no authority configuration found among candidates"))
    }

    /// Parse a configuration file, dispatching on the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&raw).context("parsing YAML authority config")
            }
            Some("toml") | None => toml::from_str(&raw).context("parsing TOML authority config"),
            Some(other) => Err(anyhow!("unsupported config extension: {other}")),
        }
    }
}
