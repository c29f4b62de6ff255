//! ---
//! pki_section: "02-audit-trail"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Tamper-evident audit trail for lifecycle events."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Append-only, hash-chained audit trail.
//!
//! Every attempted certificate status transition produces two independent
//! checkpoints: a *change request* entry before the mutation is submitted
//! and a *processed* entry after the outcome is known. A failure between the
//! two still yields a processed entry with `outcome: failure`, so the trail
//! records at least once per attempted transition.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Checkpoint emitted before an internal status-change request is submitted.
pub const ACTION_STATUS_CHANGE_REQUEST: &str = "cert.status-change-request";
/// Checkpoint emitted after the internal request finished processing.
pub const ACTION_STATUS_CHANGE_PROCESSED: &str = "cert.status-change-processed";
/// Request state-machine transition (approve/reject/cancel/...).
pub const ACTION_REQUEST_TRANSITION: &str = "request.transition";
/// Shared-secret export/import between subsystem instances.
pub const ACTION_SECRET_EXCHANGE: &str = "secret.exchange";

/// Success/failure marker recorded with every audited action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// The audited step completed.
    Success,
    /// The audited step failed; details are in the metadata.
    Failure,
}

/// Entry recorded in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Timestamp when the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Actor responsible for the event (subject DN or service account).
    pub actor: String,
    /// Event type, one of the `ACTION_*` constants.
    pub action: String,
    /// Whether the audited step succeeded.
    pub outcome: AuditOutcome,
    /// Additional context serialized as JSON.
    pub metadata: serde_json::Value,
    /// SHA-256 hash of the entry contents and previous hash.
    pub hash: String,
    /// Hash of the previous entry (or zero string for the first entry).
    pub previous_hash: String,
}

impl AuditEntry {
    fn compute_hash(
        timestamp: DateTime<Utc>,
        actor: &str,
        action: &str,
        outcome: AuditOutcome,
        metadata: &serde_json::Value,
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        hasher.update(actor.as_bytes());
        hasher.update(action.as_bytes());
        hasher.update(match outcome {
            AuditOutcome::Success => b"success".as_slice(),
            AuditOutcome::Failure => b"failure".as_slice(),
        });
        hasher.update(metadata.to_string().as_bytes());
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Audit log backed by a newline-delimited JSON file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    last_hash: String,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path. Existing entries are
    /// loaded to determine the head hash.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut log = Self {
            path: path.clone(),
            last_hash: "0".repeat(64),
        };
        if path.exists() {
            for line in BufReader::new(fs::File::open(&path)?).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: AuditEntry = serde_json::from_str(&line)?;
                log.last_hash = entry.hash.clone();
            }
        }
        Ok(log)
    }

    /// Append a new audit entry to the log.
    pub fn append(
        &mut self,
        actor: &str,
        action: &str,
        outcome: AuditOutcome,
        metadata: serde_json::Value,
    ) -> Result<AuditEntry> {
        let timestamp = Utc::now();
        let hash = AuditEntry::compute_hash(
            timestamp,
            actor,
            action,
            outcome,
            &metadata,
            &self.last_hash,
        );
        let entry = AuditEntry {
            timestamp,
            actor: actor.to_string(),
            action: action.to_string(),
            outcome,
            metadata,
            hash: hash.clone(),
            previous_hash: self.last_hash.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("unable to open audit log {}", self.path.display()))?;
        file.write_all(serde_json::to_string(&entry)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        self.last_hash = hash;
        Ok(entry)
    }

    /// Record the pre-submission checkpoint for a status change.
    pub fn change_request(
        &mut self,
        actor: &str,
        outcome: AuditOutcome,
        metadata: serde_json::Value,
    ) -> Result<AuditEntry> {
        self.append(actor, ACTION_STATUS_CHANGE_REQUEST, outcome, metadata)
    }

    /// Record the post-processing checkpoint for a status change.
    pub fn request_processed(
        &mut self,
        actor: &str,
        outcome: AuditOutcome,
        metadata: serde_json::Value,
    ) -> Result<AuditEntry> {
        self.append(actor, ACTION_STATUS_CHANGE_PROCESSED, outcome, metadata)
    }

    /// Verify integrity of the log (detect tampering).
    pub fn verify(&self) -> Result<bool> {
        let mut previous = "0".repeat(64);
        if !self.path.exists() {
            return Ok(true);
        }
        for line in BufReader::new(fs::File::open(&self.path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(&line)?;
            let expected = AuditEntry::compute_hash(
                entry.timestamp,
                &entry.actor,
                &entry.action,
                entry.outcome,
                &entry.metadata,
                &previous,
            );
            if expected != entry.hash {
                return Ok(false);
            }
            previous = entry.hash;
        }
        Ok(true)
    }

    /// Read the whole trail back in order.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        let mut entries = Vec::new();
        if !self.path.exists() {
            return Ok(entries);
        }
        for line in BufReader::new(fs::File::open(&self.path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
