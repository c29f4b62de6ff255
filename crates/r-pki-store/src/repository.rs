//! ---
//! pki_section: "03-certificate-store"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate records and repository bindings."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;
use r_pki_common::{CaError, CaResult, SerialNumber};
use tracing::debug;

use crate::record::{
    CertStatus, CertificateRecord, RevocationInfo, RevocationReason, StatusChange,
};

/// Persistence contract for certificate records.
///
/// The status-mutating operations are compare-and-set: the current status is
/// re-checked under the same guard that applies the mutation, so two
/// concurrent revoke calls against one serial see exactly one success.
pub trait CertificateRepository: Send + Sync {
    /// Fetch a record by serial.
    fn get(&self, serial: &SerialNumber) -> CaResult<CertificateRecord>;

    /// Whether a record exists.
    fn contains(&self, serial: &SerialNumber) -> bool;

    /// Insert a newly-issued record; `Conflict` if the serial exists.
    fn create(&self, record: CertificateRecord) -> CaResult<()>;

    /// Apply a revocation. `Valid` records move to `Revoked` (`OnHold` when
    /// the reason is `certificateHold`), `Expired` records to
    /// `RevokedExpired`; any other current status is a `Conflict`. Returns
    /// the status that was set.
    fn revoke(&self, serial: &SerialNumber, info: RevocationInfo) -> CaResult<CertStatus>;

    /// Take a held certificate off hold: `OnHold → Valid`, clearing all
    /// revocation metadata. Any other current status is a `Conflict`.
    fn restore(&self, serial: &SerialNumber, actor: &str) -> CaResult<()>;
}

/// In-memory repository used by the core and its tests. A single write lock
/// serializes the read-check-mutate sequence for every serial.
#[derive(Debug, Default)]
pub struct InMemoryCertificateStore {
    entries: RwLock<BTreeMap<SerialNumber, CertificateRecord>>,
}

impl InMemoryCertificateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CertificateRepository for InMemoryCertificateStore {
    fn get(&self, serial: &SerialNumber) -> CaResult<CertificateRecord> {
        self.entries
            .read()
            .get(serial)
            .cloned()
            .ok_or_else(|| CaError::NotFound(format!("certificate {serial}")))
    }

    fn contains(&self, serial: &SerialNumber) -> bool {
        self.entries.read().contains_key(serial)
    }

    fn create(&self, record: CertificateRecord) -> CaResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&record.serial) {
            return Err(CaError::Conflict(format!(
                "certificate {} already exists",
                record.serial
            )));
        }
        debug!(serial = %record.serial, subject = %record.subject_dn, "certificate record created");
        entries.insert(record.serial.clone(), record);
        Ok(())
    }

    fn revoke(&self, serial: &SerialNumber, info: RevocationInfo) -> CaResult<CertStatus> {
        let mut entries = self.entries.write();
        let record = entries
            .get_mut(serial)
            .ok_or_else(|| CaError::NotFound(format!("certificate {serial}")))?;
        let new_status = match record.status {
            CertStatus::Valid if info.reason == RevocationReason::CertificateHold => {
                CertStatus::OnHold
            }
            CertStatus::Valid => CertStatus::Revoked,
            CertStatus::Expired => CertStatus::RevokedExpired,
            other => {
                return Err(CaError::Conflict(format!(
                    "certificate {serial} is {other}, not revocable"
                )))
            }
        };
        record.history.push(StatusChange {
            at: Utc::now(),
            by: info.revoked_by.clone(),
            from: record.status,
            to: new_status,
            reason: Some(info.reason),
        });
        record.status = new_status;
        record.revocation = Some(info);
        debug!(serial = %serial, status = %new_status, "certificate revoked");
        Ok(new_status)
    }

    fn restore(&self, serial: &SerialNumber, actor: &str) -> CaResult<()> {
        let mut entries = self.entries.write();
        let record = entries
            .get_mut(serial)
            .ok_or_else(|| CaError::NotFound(format!("certificate {serial}")))?;
        if record.status != CertStatus::OnHold {
            return Err(CaError::Conflict(format!(
                "certificate {serial} is {}, not on hold",
                record.status
            )));
        }
        record.history.push(StatusChange {
            at: Utc::now(),
            by: actor.to_owned(),
            from: record.status,
            to: CertStatus::Valid,
            reason: None,
        });
        record.status = CertStatus::Valid;
        record.revocation = None;
        debug!(serial = %serial, "certificate taken off hold");
        Ok(())
    }
}
