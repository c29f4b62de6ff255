//! ---
//! pki_section: "15-testing-qa-runbook"
//! pki_subsection: "integration-tests"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Integration and validation tests for the R-PKI core."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use pkcs8::EncodePublicKey;
use r_pki_audit::AuditLog;
use r_pki_common::{AuthorityConfig, ProcessingMode, SerialNumber, SigningConfig};
use r_pki_profile::{PolicyConfig, PolicyPayload, PolicySpec, Profile, ProfileStore};
use r_pki_requests::model::{KEY_ISSUED_SERIAL, KEY_SPKI_HEX, KEY_SUBJECT, KEY_VALIDITY_DAYS};
use r_pki_requests::{
    EnrollmentExecutor, RequestOperation, RequestQueue, RequestStateMachine, RequestStatus,
    RequestType, TransitionOutcome,
};
use r_pki_revocation::{
    CallerIdentity, NonceStore, RevocationConfig, RevocationProcessor, RevocationRequest,
};
use r_pki_signer::IssuerKey;
use r_pki_store::{CertStatus, CertificateRepository, InMemoryCertificateStore, RevocationReason};
use rand::rngs::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tempfile::TempDir;

static ISSUER_KEY: Lazy<Arc<IssuerKey>> = Lazy::new(|| {
    Arc::new(IssuerKey::Rsa(
        RsaPrivateKey::new(&mut OsRng, 2048).unwrap(),
    ))
});

static SUBJECT_SPKI_HEX: Lazy<String> = Lazy::new(|| {
    let key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
    let spki = RsaPublicKey::from(&key)
        .to_public_key_der()
        .unwrap()
        .as_bytes()
        .to_vec();
    hex::encode(spki)
});

struct Authority {
    repository: Arc<InMemoryCertificateStore>,
    queue: Arc<RequestQueue>,
    machine: RequestStateMachine,
    processor: RevocationProcessor,
    nonces: Arc<NonceStore>,
    audit: Arc<Mutex<AuditLog>>,
    _dir: TempDir,
}

fn authority(nonce_protection: bool) -> Authority {
    let mut config = AuthorityConfig::default();
    config.nonce_protection = nonce_protection;
    config.processing = ProcessingMode::Inline;

    let dir = TempDir::new().unwrap();
    let audit = Arc::new(Mutex::new(
        AuditLog::new(dir.path().join("audit.log")).unwrap(),
    ));
    let repository = Arc::new(InMemoryCertificateStore::new());
    let queue = Arc::new(RequestQueue::new(config.processing));
    queue.register_executor(
        RequestType::Enrollment,
        Arc::new(EnrollmentExecutor::new(
            repository.clone(),
            ISSUER_KEY.clone(),
            "CN=R-PKI Root CA,O=R-PKI",
            SigningConfig::default(),
            0x2000,
        )),
    );

    let profiles = Arc::new(ProfileStore::new());
    let mut profile = Profile::new("deviceCert", "Device certificate enrollment");
    profile.policies = vec![
        PolicySpec {
            id: "subject".into(),
            class_id: "subjectNameConstraint".into(),
            config: PolicyConfig::from_pairs([("pattern", "OU=Devices")]),
        },
        PolicySpec {
            id: "validity".into(),
            class_id: "validityWindow".into(),
            config: PolicyConfig::from_pairs([("default_days", "90"), ("max_days", "365")]),
        },
    ];
    profiles.add(profile).unwrap();
    profiles.enable("deviceCert", "CN=admin").unwrap();

    let machine = RequestStateMachine::new(queue.clone(), profiles, audit.clone());
    let nonces = Arc::new(NonceStore::new());
    let processor = RevocationProcessor::new(
        repository.clone(),
        queue.clone(),
        nonces.clone(),
        audit.clone(),
        RevocationConfig::from(&config),
    );

    Authority {
        repository,
        queue,
        machine,
        processor,
        nonces,
        audit,
        _dir: dir,
    }
}

fn enroll(authority: &Authority, subject: &str) -> SerialNumber {
    let mut ext: IndexMap<String, String> = IndexMap::new();
    ext.insert(KEY_SUBJECT.into(), subject.into());
    ext.insert(KEY_SPKI_HEX.into(), SUBJECT_SPKI_HEX.clone());
    ext.insert(KEY_VALIDITY_DAYS.into(), "30".into());

    let request = authority
        .queue
        .create_request(RequestType::Enrollment, Some("deviceCert"), ext);
    authority.queue.mark_pending(&request.id).unwrap();

    let outcome = authority
        .machine
        .transition(
            &request.id,
            RequestOperation::Approve,
            &PolicyPayload::new(),
            "CN=agent",
        )
        .unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Applied {
            status: RequestStatus::Complete
        }
    );

    let issued = authority.queue.get(&request.id).unwrap();
    SerialNumber::from_hex(issued.ext(KEY_ISSUED_SERIAL).unwrap()).unwrap()
}

fn revocation(reason: RevocationReason, nonce: Option<u64>) -> RevocationRequest {
    RevocationRequest {
        reason,
        invalidity_date: None,
        comments: None,
        nonce,
    }
}

#[test]
fn enroll_then_revoke_key_compromise_without_nonce() {
    let authority = authority(false);
    let serial = enroll(&authority, "CN=device-1,OU=Devices,O=R-PKI");
    assert_eq!(
        authority.repository.get(&serial).unwrap().status,
        CertStatus::Valid
    );

    let request_id = authority
        .processor
        .revoke(
            &CallerIdentity::agent("CN=agent"),
            &serial,
            revocation(RevocationReason::KeyCompromise, None),
            false,
        )
        .unwrap();

    let record = authority.repository.get(&serial).unwrap();
    assert_eq!(record.status, CertStatus::Revoked);
    assert_eq!(
        record.revocation.unwrap().reason,
        RevocationReason::KeyCompromise
    );
    assert_eq!(
        authority.queue.get(&request_id).unwrap().status,
        RequestStatus::Complete
    );
}

#[test]
fn nonce_protected_revoke_by_certificate_owner() {
    let authority = authority(true);
    let serial = enroll(&authority, "CN=device-2,OU=Devices,O=R-PKI");
    let caller =
        CallerIdentity::end_entity("CN=device-2,OU=Devices,O=R-PKI", serial.clone(), "session-9");

    // No nonce issued yet: the call is unauthorized and mutates nothing.
    assert!(authority
        .processor
        .revoke(
            &caller,
            &serial,
            revocation(RevocationReason::Superseded, Some(42)),
            false
        )
        .is_err());
    assert_eq!(
        authority.repository.get(&serial).unwrap().status,
        CertStatus::Valid
    );

    let nonce = authority.nonces.issue("session-9", &serial);
    authority
        .processor
        .revoke(
            &caller,
            &serial,
            revocation(RevocationReason::Superseded, Some(nonce)),
            false,
        )
        .unwrap();
    assert_eq!(
        authority.repository.get(&serial).unwrap().status,
        CertStatus::Revoked
    );

    // Replaying the consumed nonce against another call fails.
    let other = enroll(&authority, "CN=device-2,OU=Devices,O=R-PKI");
    let replay = CallerIdentity::end_entity(
        "CN=device-2,OU=Devices,O=R-PKI",
        other.clone(),
        "session-9",
    );
    assert!(authority
        .processor
        .revoke(
            &replay,
            &other,
            revocation(RevocationReason::Superseded, Some(nonce)),
            false
        )
        .is_err());
}

#[test]
fn certificate_hold_then_release_restores_valid() {
    let authority = authority(false);
    let serial = enroll(&authority, "CN=device-3,OU=Devices,O=R-PKI");
    let agent = CallerIdentity::agent("CN=agent");

    authority
        .processor
        .revoke(
            &agent,
            &serial,
            revocation(RevocationReason::CertificateHold, None),
            false,
        )
        .unwrap();
    assert_eq!(
        authority.repository.get(&serial).unwrap().status,
        CertStatus::OnHold
    );

    // removeFromCRL routes to the unrevoke transition.
    authority
        .processor
        .revoke(
            &agent,
            &serial,
            revocation(RevocationReason::RemoveFromCrl, None),
            false,
        )
        .unwrap();
    let record = authority.repository.get(&serial).unwrap();
    assert_eq!(record.status, CertStatus::Valid);
    assert!(record.revocation.is_none());
}

#[test]
fn audit_chain_verifies_after_full_lifecycle() {
    let authority = authority(false);
    let serial = enroll(&authority, "CN=device-4,OU=Devices,O=R-PKI");
    let agent = CallerIdentity::agent("CN=agent");

    authority
        .processor
        .revoke(
            &agent,
            &serial,
            revocation(RevocationReason::CertificateHold, None),
            false,
        )
        .unwrap();
    authority.processor.unrevoke(&agent, &serial).unwrap();
    // A conflicting second release still audits its failure.
    assert!(authority.processor.unrevoke(&agent, &serial).is_err());

    let audit = authority.audit.lock();
    assert!(audit.verify().unwrap());
    let entries = audit.entries().unwrap();
    // approve + two lifecycle operations with two checkpoints each, plus
    // the failed release's pair.
    assert!(entries.len() >= 7);
}

#[test]
fn queued_processing_defers_commit_until_drain() {
    let mut config = AuthorityConfig::default();
    config.nonce_protection = false;
    config.processing = ProcessingMode::Queued;

    let dir = TempDir::new().unwrap();
    let audit = Arc::new(Mutex::new(
        AuditLog::new(dir.path().join("audit.log")).unwrap(),
    ));
    let repository = Arc::new(InMemoryCertificateStore::new());
    let queue = Arc::new(RequestQueue::new(config.processing));
    let processor = RevocationProcessor::new(
        repository.clone(),
        queue.clone(),
        Arc::new(NonceStore::new()),
        audit,
        RevocationConfig::from(&config),
    );

    let serial = SerialNumber::from(0x77u64);
    repository
        .create(r_pki_store::CertificateRecord::issued(
            serial.clone(),
            "CN=R-PKI Root CA",
            "CN=queued-device",
            chrono::Utc::now(),
            chrono::Utc::now() + chrono::Duration::days(30),
            Vec::new(),
        ))
        .unwrap();

    processor
        .revoke(
            &CallerIdentity::agent("CN=agent"),
            &serial,
            revocation(RevocationReason::CessationOfOperation, None),
            false,
        )
        .unwrap();
    assert_eq!(repository.get(&serial).unwrap().status, CertStatus::Valid);

    assert_eq!(queue.drain(), 1);
    assert_eq!(repository.get(&serial).unwrap().status, CertStatus::Revoked);
}
