//! ---
//! pki_section: "06-revocation"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Revocation processing and replay protection."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use r_pki_audit::{AuditLog, AuditOutcome};
use r_pki_common::{AuthorityConfig, CaError, CaResult, SerialNumber};
use r_pki_requests::{
    LifecycleMetrics, RequestExecutor, RequestId, RequestQueue, RequestType,
};
use r_pki_requests::model::{
    KEY_COMMENTS, KEY_INVALIDITY_DATE, KEY_ON_HOLD, KEY_REASON, KEY_SERIAL,
};
use r_pki_store::{CertStatus, CertificateRepository, RevocationInfo, RevocationReason};
use serde_json::json;
use strum::Display;
use tracing::{debug, info, warn};

use crate::crl::{crl_reason_extension, invalidity_date_extension};
use crate::nonces::NonceStore;

/// Ext-data key: actor the status change is attributed to.
const KEY_REQUESTED_BY: &str = "requested_by";
/// Ext-data key: JSON-encoded CRL entry extensions.
const KEY_CRL_EXTENSIONS: &str = "crl_entry_extensions";
/// Ext-data key: whether the target is a CA certificate.
const KEY_IS_CA_CERT: &str = "is_ca_cert";
/// Ext-data key: status the record ended up in.
const KEY_RESULTING_STATUS: &str = "resulting_status";

/// Identity resolved from the transport-layer client certificate (or the
/// service account for subsystem traffic).
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    /// Subject DN of the caller, when authenticated.
    pub subject_dn: Option<String>,
    /// Serial of the caller's own client certificate, when presented.
    pub client_cert_serial: Option<SerialNumber>,
    /// Client session key the retrieval nonce was bound to.
    pub session_key: Option<String>,
    /// CA agents may revoke any record.
    pub is_agent: bool,
    /// Group memberships; the trusted subsystem group bypasses nonces.
    pub groups: Vec<String>,
}

impl CallerIdentity {
    /// A CA agent.
    pub fn agent(subject_dn: impl Into<String>) -> Self {
        Self {
            subject_dn: Some(subject_dn.into()),
            is_agent: true,
            ..Self::default()
        }
    }

    /// An end entity acting on its own certificate.
    pub fn end_entity(
        subject_dn: impl Into<String>,
        client_cert_serial: SerialNumber,
        session_key: impl Into<String>,
    ) -> Self {
        Self {
            subject_dn: Some(subject_dn.into()),
            client_cert_serial: Some(client_cert_serial),
            session_key: Some(session_key.into()),
            is_agent: false,
            groups: Vec::new(),
        }
    }

    fn actor(&self) -> &str {
        self.subject_dn.as_deref().unwrap_or("unknown")
    }

    fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Caller-supplied revocation parameters.
#[derive(Debug, Clone)]
pub struct RevocationRequest {
    /// CRL reason code.
    pub reason: RevocationReason,
    /// Claimed date the key became invalid.
    pub invalidity_date: Option<DateTime<Utc>>,
    /// Free-form comments recorded on the internal request.
    pub comments: Option<String>,
    /// Retrieval nonce, when nonce protection is enabled.
    pub nonce: Option<u64>,
}

/// Progression of one revoke/unrevoke invocation. Failure at any stage
/// aborts with nothing persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RevocationStage {
    /// Entry.
    Initialized,
    /// Target record fetched.
    TargetResolved,
    /// Caller, nonce, and ownership checks passed.
    Validated,
    /// CRL entry extensions assembled.
    CrlExtensionBuilt,
    /// Internal request persisted.
    RequestCreated,
    /// Internal request handed to the queue.
    Submitted,
    /// Outcome known and audited.
    Processed,
}

/// Settings the processor reads from the authority configuration.
#[derive(Debug, Clone)]
pub struct RevocationConfig {
    /// Require single-use nonces on revoke/unrevoke.
    pub nonce_protection: bool,
    /// Group whose members bypass nonce validation.
    pub trusted_subsystem_group: String,
}

impl From<&AuthorityConfig> for RevocationConfig {
    fn from(config: &AuthorityConfig) -> Self {
        Self {
            nonce_protection: config.nonce_protection,
            trusted_subsystem_group: config.trusted_subsystem_group.clone(),
        }
    }
}

/// Orchestrates revoke/unrevoke: validates the caller against the target
/// record, enforces replay protection, builds the CRL entry extensions,
/// creates the internal request, and audits both checkpoints.
///
/// Every collaborator is injected at construction; the constructor also
/// registers the revocation executors with the queue.
pub struct RevocationProcessor {
    repository: Arc<dyn CertificateRepository>,
    queue: Arc<RequestQueue>,
    nonces: Arc<NonceStore>,
    audit: Arc<Mutex<AuditLog>>,
    config: RevocationConfig,
    metrics: Option<LifecycleMetrics>,
}

impl RevocationProcessor {
    /// Wire the processor and register its executors with the queue.
    pub fn new(
        repository: Arc<dyn CertificateRepository>,
        queue: Arc<RequestQueue>,
        nonces: Arc<NonceStore>,
        audit: Arc<Mutex<AuditLog>>,
        config: RevocationConfig,
    ) -> Self {
        queue.register_executor(
            RequestType::Revocation,
            Arc::new(RevocationExecutor {
                repository: repository.clone(),
            }),
        );
        queue.register_executor(
            RequestType::Unrevocation,
            Arc::new(UnrevocationExecutor {
                repository: repository.clone(),
            }),
        );
        Self {
            repository,
            queue,
            nonces,
            audit,
            config,
            metrics: None,
        }
    }

    /// Attach lifecycle metrics.
    pub fn with_metrics(mut self, metrics: LifecycleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Revoke (or hold) a certificate. Returns the internal request id so
    /// the caller can poll or display it.
    pub fn revoke(
        &self,
        caller: &CallerIdentity,
        serial: &SerialNumber,
        request: RevocationRequest,
        is_ca_cert: bool,
    ) -> CaResult<RequestId> {
        let mut stage = RevocationStage::Initialized;
        debug!(serial = %serial, reason = %request.reason, %stage, "revocation started");

        // removeFromCRL is a routing signal, never a persisted state.
        if request.reason == RevocationReason::RemoveFromCrl {
            return self.unrevoke(caller, serial);
        }

        // A revoked client certificate cannot drive further revocations.
        let client_record = match &caller.client_cert_serial {
            Some(client_serial) => {
                let record = self.repository.get(client_serial)?;
                if matches!(
                    record.status,
                    CertStatus::Revoked | CertStatus::OnHold | CertStatus::RevokedExpired
                ) {
                    return Err(CaError::Unauthorized(
                        "client certificate is revoked".into(),
                    ));
                }
                Some(record)
            }
            None => None,
        };

        if self.config.nonce_protection && !caller.in_group(&self.config.trusted_subsystem_group) {
            let session_key = caller.session_key.as_deref().ok_or_else(|| {
                CaError::Unauthorized("nonce protection requires a client session".into())
            })?;
            let nonce = request
                .nonce
                .ok_or_else(|| CaError::Unauthorized("missing nonce".into()))?;
            self.nonces.consume(session_key, serial, nonce)?;
        }

        let target = match client_record {
            Some(record) if &record.serial == serial => record,
            _ => self.repository.get(serial)?,
        };
        stage = RevocationStage::TargetResolved;
        debug!(serial = %serial, %stage, subject = %target.subject_dn, "revocation target resolved");

        // CA agents may revoke any record; others only their own.
        if !caller.is_agent {
            let caller_dn = caller.subject_dn.as_deref().ok_or_else(|| {
                CaError::Unauthorized("anonymous callers cannot revoke certificates".into())
            })?;
            if target.subject_dn != caller_dn {
                return Err(CaError::Unauthorized(format!(
                    "{caller_dn} may not revoke certificate {serial} owned by {}",
                    target.subject_dn
                )));
            }
        }
        stage = RevocationStage::Validated;
        debug!(serial = %serial, %stage, "revocation validated");

        let mut extensions = vec![crl_reason_extension(request.reason)?];
        if let Some(at) = request.invalidity_date {
            extensions.push(invalidity_date_extension(at)?);
        }
        stage = RevocationStage::CrlExtensionBuilt;
        debug!(serial = %serial, %stage, extensions = extensions.len(), "crl entry extensions assembled");

        let mut ext_data: IndexMap<String, String> = IndexMap::new();
        ext_data.insert(KEY_SERIAL.to_owned(), serial.to_hex());
        ext_data.insert(KEY_REASON.to_owned(), request.reason.to_string());
        ext_data.insert(KEY_REQUESTED_BY.to_owned(), caller.actor().to_owned());
        ext_data.insert(
            KEY_CRL_EXTENSIONS.to_owned(),
            serde_json::to_string(&extensions)?,
        );
        ext_data.insert(KEY_IS_CA_CERT.to_owned(), is_ca_cert.to_string());
        if let Some(at) = request.invalidity_date {
            ext_data.insert(KEY_INVALIDITY_DATE.to_owned(), at.to_rfc3339());
        }
        if let Some(comments) = &request.comments {
            ext_data.insert(KEY_COMMENTS.to_owned(), comments.clone());
        }
        if request.reason == RevocationReason::CertificateHold {
            ext_data.insert(KEY_ON_HOLD.to_owned(), "true".to_owned());
        }

        let internal = self
            .queue
            .create_request(RequestType::Revocation, None, ext_data);
        stage = RevocationStage::RequestCreated;
        debug!(serial = %serial, %stage, request = %internal.id, "internal revocation request created");

        self.audit_change_request(caller, serial, "revoke", &internal.id, Some(request.reason))?;

        let submitted = self.queue.submit(&internal.id);
        stage = RevocationStage::Submitted;
        debug!(serial = %serial, %stage, request = %internal.id, "internal revocation request submitted");

        match submitted {
            Ok(status) => {
                self.audit_processed(caller, serial, "revoke", &internal.id, AuditOutcome::Success);
                stage = RevocationStage::Processed;
                if let Some(metrics) = &self.metrics {
                    metrics.inc_revocation();
                }
                info!(serial = %serial, request = %internal.id, status = %status, %stage, "revocation processed");
                Ok(internal.id)
            }
            Err(err) => {
                // The change-request checkpoint already landed; the failure
                // still gets its own processed-failure entry.
                self.audit_processed(caller, serial, "revoke", &internal.id, AuditOutcome::Failure);
                warn!(serial = %serial, request = %internal.id, error = %err, "revocation failed after submission");
                Err(err)
            }
        }
    }

    /// Release a held certificate. Ownership is not re-checked beyond
    /// existence; the triggering reason is always `certificateHold`.
    pub fn unrevoke(&self, caller: &CallerIdentity, serial: &SerialNumber) -> CaResult<RequestId> {
        let _record = self.repository.get(serial)?;

        let mut ext_data: IndexMap<String, String> = IndexMap::new();
        ext_data.insert(KEY_SERIAL.to_owned(), serial.to_hex());
        ext_data.insert(
            KEY_REASON.to_owned(),
            RevocationReason::CertificateHold.to_string(),
        );
        ext_data.insert(KEY_REQUESTED_BY.to_owned(), caller.actor().to_owned());

        let internal = self
            .queue
            .create_request(RequestType::Unrevocation, None, ext_data);

        self.audit_change_request(caller, serial, "unrevoke", &internal.id, None)?;

        match self.queue.submit(&internal.id) {
            Ok(status) => {
                self.audit_processed(caller, serial, "unrevoke", &internal.id, AuditOutcome::Success);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_unrevocation();
                }
                info!(serial = %serial, request = %internal.id, status = %status, "unrevocation processed");
                Ok(internal.id)
            }
            Err(err) => {
                self.audit_processed(caller, serial, "unrevoke", &internal.id, AuditOutcome::Failure);
                warn!(serial = %serial, request = %internal.id, error = %err, "unrevocation failed after submission");
                Err(err)
            }
        }
    }

    /// Pre-submission checkpoint. The sink is mandatory here: if the entry
    /// cannot be written the transition aborts before any mutation.
    fn audit_change_request(
        &self,
        caller: &CallerIdentity,
        serial: &SerialNumber,
        operation: &str,
        request_id: &RequestId,
        reason: Option<RevocationReason>,
    ) -> CaResult<()> {
        self.audit
            .lock()
            .change_request(
                caller.actor(),
                AuditOutcome::Success,
                json!({
                    "serial": serial.to_string(),
                    "operation": operation,
                    "request": request_id.to_string(),
                    "reason": reason.map(|r| r.to_string()),
                }),
            )
            .map(|_| ())
            .map_err(|err| CaError::Internal(format!("audit sink failure: {err}")))
    }

    /// Post-processing checkpoint; attempted even when the mutation failed.
    fn audit_processed(
        &self,
        caller: &CallerIdentity,
        serial: &SerialNumber,
        operation: &str,
        request_id: &RequestId,
        outcome: AuditOutcome,
    ) {
        let result = self.audit.lock().request_processed(
            caller.actor(),
            outcome,
            json!({
                "serial": serial.to_string(),
                "operation": operation,
                "request": request_id.to_string(),
            }),
        );
        if let Err(err) = result {
            warn!(serial = %serial, error = %err, "failed to write processed audit entry");
        }
    }
}

/// Applies a revocation request to the certificate record via the
/// repository's compare-and-set transition.
struct RevocationExecutor {
    repository: Arc<dyn CertificateRepository>,
}

impl RequestExecutor for RevocationExecutor {
    fn execute(&self, request: &mut r_pki_requests::Request) -> CaResult<()> {
        let serial = SerialNumber::from_hex(
            request
                .ext(KEY_SERIAL)
                .ok_or_else(|| CaError::BadInput("revocation request missing serial".into()))?,
        )?;
        let reason_raw = request.ext(KEY_REASON).unwrap_or("unspecified");
        let reason = RevocationReason::from_str(reason_raw)
            .map_err(|_| CaError::BadInput(format!("unknown revocation reason {reason_raw}")))?;
        let invalidity_date = match request.ext(KEY_INVALIDITY_DATE) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|err| CaError::BadInput(format!("invalidity date {raw}: {err}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        let crl_entry_extensions = match request.ext(KEY_CRL_EXTENSIONS) {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };

        let info = RevocationInfo {
            revoked_on: Utc::now(),
            revoked_by: request.ext(KEY_REQUESTED_BY).unwrap_or("unknown").to_owned(),
            reason,
            invalidity_date,
            crl_entry_extensions,
        };
        let status = self.repository.revoke(&serial, info)?;
        request
            .ext_data
            .insert(KEY_RESULTING_STATUS.to_owned(), status.to_string());
        Ok(())
    }
}

/// Restores a held certificate to `Valid` via the repository.
struct UnrevocationExecutor {
    repository: Arc<dyn CertificateRepository>,
}

impl RequestExecutor for UnrevocationExecutor {
    fn execute(&self, request: &mut r_pki_requests::Request) -> CaResult<()> {
        let serial = SerialNumber::from_hex(
            request
                .ext(KEY_SERIAL)
                .ok_or_else(|| CaError::BadInput("unrevocation request missing serial".into()))?,
        )?;
        let actor = request.ext(KEY_REQUESTED_BY).unwrap_or("unknown").to_owned();
        self.repository.restore(&serial, &actor)?;
        request
            .ext_data
            .insert(KEY_RESULTING_STATUS.to_owned(), CertStatus::Valid.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use r_pki_common::ProcessingMode;
    use r_pki_store::{CertificateRecord, InMemoryCertificateStore};
    use tempfile::tempdir;

    struct Fixture {
        processor: RevocationProcessor,
        repository: Arc<InMemoryCertificateStore>,
        queue: Arc<RequestQueue>,
        nonces: Arc<NonceStore>,
        audit: Arc<Mutex<AuditLog>>,
        _dir: tempfile::TempDir,
    }

    fn fixture(nonce_protection: bool, mode: ProcessingMode) -> Fixture {
        let dir = tempdir().unwrap();
        let audit = Arc::new(Mutex::new(
            AuditLog::new(dir.path().join("audit.log")).unwrap(),
        ));
        let repository = Arc::new(InMemoryCertificateStore::new());
        let queue = Arc::new(RequestQueue::new(mode));
        let nonces = Arc::new(NonceStore::new());
        let processor = RevocationProcessor::new(
            repository.clone(),
            queue.clone(),
            nonces.clone(),
            audit.clone(),
            RevocationConfig {
                nonce_protection,
                trusted_subsystem_group: "Trusted Managers".into(),
            },
        );
        Fixture {
            processor,
            repository,
            queue,
            nonces,
            audit,
            _dir: dir,
        }
    }

    fn seed(fx: &Fixture, serial: u64, subject: &str) -> SerialNumber {
        let serial = SerialNumber::from(serial);
        fx.repository
            .create(CertificateRecord::issued(
                serial.clone(),
                "CN=R-PKI Root CA",
                subject,
                Utc::now(),
                Utc::now() + Duration::days(365),
                Vec::new(),
            ))
            .unwrap();
        serial
    }

    fn plain_request(reason: RevocationReason) -> RevocationRequest {
        RevocationRequest {
            reason,
            invalidity_date: None,
            comments: None,
            nonce: None,
        }
    }

    #[test]
    fn agent_revoke_without_nonce_persists_reason() {
        let fx = fixture(false, ProcessingMode::Inline);
        let serial = seed(&fx, 1, "CN=device-1");

        let request_id = fx
            .processor
            .revoke(
                &CallerIdentity::agent("CN=agent"),
                &serial,
                plain_request(RevocationReason::KeyCompromise),
                false,
            )
            .unwrap();

        let record = fx.repository.get(&serial).unwrap();
        assert_eq!(record.status, CertStatus::Revoked);
        let info = record.revocation.unwrap();
        assert_eq!(info.reason, RevocationReason::KeyCompromise);
        assert_eq!(info.revoked_by, "CN=agent");
        assert!(!info.crl_entry_extensions.is_empty());
        assert_eq!(
            fx.queue.get(&request_id).unwrap().status,
            r_pki_requests::RequestStatus::Complete
        );
        // Both audit checkpoints landed.
        let entries = fx.audit.lock().entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].outcome, AuditOutcome::Success);
    }

    #[test]
    fn missing_certificate_is_not_found() {
        let fx = fixture(false, ProcessingMode::Inline);
        assert!(matches!(
            fx.processor.revoke(
                &CallerIdentity::agent("CN=agent"),
                &SerialNumber::from(99u64),
                plain_request(RevocationReason::Unspecified),
                false,
            ),
            Err(CaError::NotFound(_))
        ));
    }

    #[test]
    fn nonce_mismatch_is_unauthorized_and_not_consumed() {
        let fx = fixture(true, ProcessingMode::Inline);
        let serial = seed(&fx, 2, "CN=device-2");
        let caller = CallerIdentity::end_entity("CN=device-2", serial.clone(), "session-1");
        let nonce = fx.nonces.issue("session-1", &serial);

        let mut request = plain_request(RevocationReason::Superseded);
        request.nonce = Some(nonce.wrapping_add(1));
        assert!(matches!(
            fx.processor.revoke(&caller, &serial, request, false),
            Err(CaError::Unauthorized(_))
        ));
        // No mutation happened and the nonce survived for the retry.
        assert_eq!(fx.repository.get(&serial).unwrap().status, CertStatus::Valid);

        let mut request = plain_request(RevocationReason::Superseded);
        request.nonce = Some(nonce);
        fx.processor.revoke(&caller, &serial, request, false).unwrap();
        assert_eq!(
            fx.repository.get(&serial).unwrap().status,
            CertStatus::Revoked
        );
    }

    #[test]
    fn consumed_nonce_cannot_replay_even_after_unrelated_failure() {
        let fx = fixture(true, ProcessingMode::Inline);
        let serial = seed(&fx, 3, "CN=device-3");
        // Ownership check fails after nonce validation: the nonce is gone.
        let caller = CallerIdentity {
            subject_dn: Some("CN=intruder".into()),
            client_cert_serial: None,
            session_key: Some("session-1".into()),
            is_agent: false,
            groups: Vec::new(),
        };
        let nonce = fx.nonces.issue("session-1", &serial);

        let mut request = plain_request(RevocationReason::Unspecified);
        request.nonce = Some(nonce);
        assert!(matches!(
            fx.processor.revoke(&caller, &serial, request, false),
            Err(CaError::Unauthorized(_))
        ));

        let mut replay = plain_request(RevocationReason::Unspecified);
        replay.nonce = Some(nonce);
        assert!(matches!(
            fx.processor.revoke(&caller, &serial, replay, false),
            Err(CaError::Unauthorized(_))
        ));
        assert_eq!(fx.nonces.outstanding(), 0);
    }

    #[test]
    fn trusted_subsystem_group_bypasses_nonce() {
        let fx = fixture(true, ProcessingMode::Inline);
        let serial = seed(&fx, 4, "CN=kra-subsystem");
        let caller = CallerIdentity {
            subject_dn: Some("CN=kra-subsystem".into()),
            client_cert_serial: None,
            session_key: None,
            is_agent: false,
            groups: vec!["Trusted Managers".into()],
        };
        fx.processor
            .revoke(&caller, &serial, plain_request(RevocationReason::Superseded), false)
            .unwrap();
        assert_eq!(
            fx.repository.get(&serial).unwrap().status,
            CertStatus::Revoked
        );
    }

    #[test]
    fn non_agent_cannot_revoke_foreign_certificate() {
        let fx = fixture(false, ProcessingMode::Inline);
        let serial = seed(&fx, 5, "CN=device-5");
        let caller = CallerIdentity {
            subject_dn: Some("CN=other".into()),
            ..CallerIdentity::default()
        };
        assert!(matches!(
            fx.processor.revoke(
                &caller,
                &serial,
                plain_request(RevocationReason::Unspecified),
                false
            ),
            Err(CaError::Unauthorized(_))
        ));
        assert_eq!(fx.repository.get(&serial).unwrap().status, CertStatus::Valid);
    }

    #[test]
    fn revoked_client_certificate_is_rejected() {
        let fx = fixture(false, ProcessingMode::Inline);
        let client_serial = seed(&fx, 6, "CN=device-6");
        let target_serial = seed(&fx, 7, "CN=device-6");
        fx.processor
            .revoke(
                &CallerIdentity::agent("CN=agent"),
                &client_serial,
                plain_request(RevocationReason::KeyCompromise),
                false,
            )
            .unwrap();

        let caller = CallerIdentity {
            subject_dn: Some("CN=device-6".into()),
            client_cert_serial: Some(client_serial),
            session_key: None,
            is_agent: false,
            groups: Vec::new(),
        };
        assert!(matches!(
            fx.processor.revoke(
                &caller,
                &target_serial,
                plain_request(RevocationReason::KeyCompromise),
                false
            ),
            Err(CaError::Unauthorized(_))
        ));
    }

    #[test]
    fn hold_then_unrevoke_restores_valid_without_residue() {
        let fx = fixture(false, ProcessingMode::Inline);
        let serial = seed(&fx, 8, "CN=device-8");
        let agent = CallerIdentity::agent("CN=agent");

        fx.processor
            .revoke(
                &agent,
                &serial,
                plain_request(RevocationReason::CertificateHold),
                false,
            )
            .unwrap();
        assert_eq!(fx.repository.get(&serial).unwrap().status, CertStatus::OnHold);

        fx.processor.unrevoke(&agent, &serial).unwrap();
        let record = fx.repository.get(&serial).unwrap();
        assert_eq!(record.status, CertStatus::Valid);
        assert!(record.revocation.is_none());
    }

    #[test]
    fn remove_from_crl_routes_to_unrevoke_and_conflicts_on_valid() {
        let fx = fixture(false, ProcessingMode::Inline);
        let serial = seed(&fx, 9, "CN=device-9");
        let agent = CallerIdentity::agent("CN=agent");

        // Not on hold: the routed unrevoke is a conflict, not a crash.
        let result = fx.processor.revoke(
            &agent,
            &serial,
            plain_request(RevocationReason::RemoveFromCrl),
            false,
        );
        assert!(matches!(result, Err(CaError::Conflict(_))));
        assert_eq!(fx.repository.get(&serial).unwrap().status, CertStatus::Valid);

        // After a hold, the same call releases it.
        fx.processor
            .revoke(
                &agent,
                &serial,
                plain_request(RevocationReason::CertificateHold),
                false,
            )
            .unwrap();
        fx.processor
            .revoke(
                &agent,
                &serial,
                plain_request(RevocationReason::RemoveFromCrl),
                false,
            )
            .unwrap();
        assert_eq!(fx.repository.get(&serial).unwrap().status, CertStatus::Valid);
    }

    #[test]
    fn double_revoke_yields_exactly_one_success() {
        let fx = fixture(false, ProcessingMode::Inline);
        let serial = seed(&fx, 10, "CN=device-10");
        let agent = CallerIdentity::agent("CN=agent");

        let first = fx.processor.revoke(
            &agent,
            &serial,
            plain_request(RevocationReason::Superseded),
            false,
        );
        let second = fx.processor.revoke(
            &agent,
            &serial,
            plain_request(RevocationReason::Superseded),
            false,
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(CaError::Conflict(_))));

        // The failed attempt still produced its processed-failure entry.
        let entries = fx.audit.lock().entries().unwrap();
        let failures = entries
            .iter()
            .filter(|entry| entry.outcome == AuditOutcome::Failure)
            .count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn concurrent_revokes_commit_exactly_once() {
        let fx = fixture(false, ProcessingMode::Inline);
        let serial = seed(&fx, 11, "CN=device-11");
        let processor = Arc::new(fx.processor);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let processor = processor.clone();
                let serial = serial.clone();
                std::thread::spawn(move || {
                    processor
                        .revoke(
                            &CallerIdentity::agent("CN=agent"),
                            &serial,
                            RevocationRequest {
                                reason: RevocationReason::KeyCompromise,
                                invalidity_date: None,
                                comments: None,
                                nonce: None,
                            },
                            false,
                        )
                        .is_ok()
                })
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(
            fx.repository.get(&serial).unwrap().status,
            CertStatus::Revoked
        );
    }

    #[test]
    fn queued_mode_defers_record_mutation_until_drain() {
        let fx = fixture(false, ProcessingMode::Queued);
        let serial = seed(&fx, 12, "CN=device-12");

        fx.processor
            .revoke(
                &CallerIdentity::agent("CN=agent"),
                &serial,
                plain_request(RevocationReason::CessationOfOperation),
                false,
            )
            .unwrap();
        // Submission succeeded but the record is untouched until the drain.
        assert_eq!(fx.repository.get(&serial).unwrap().status, CertStatus::Valid);
        assert_eq!(fx.queue.drain(), 1);
        assert_eq!(
            fx.repository.get(&serial).unwrap().status,
            CertStatus::Revoked
        );
    }

    #[test]
    fn invalidity_date_is_persisted() {
        let fx = fixture(false, ProcessingMode::Inline);
        let serial = seed(&fx, 13, "CN=device-13");
        let at = Utc::now() - Duration::days(2);
        fx.processor
            .revoke(
                &CallerIdentity::agent("CN=agent"),
                &serial,
                RevocationRequest {
                    reason: RevocationReason::KeyCompromise,
                    invalidity_date: Some(at),
                    comments: Some("laptop stolen".into()),
                    nonce: None,
                },
                false,
            )
            .unwrap();
        let info = fx.repository.get(&serial).unwrap().revocation.unwrap();
        assert_eq!(
            info.invalidity_date.unwrap().timestamp(),
            at.timestamp()
        );
        assert_eq!(info.crl_entry_extensions.len(), 2);
    }
}
