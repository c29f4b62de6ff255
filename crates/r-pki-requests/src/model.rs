//! ---
//! pki_section: "05-request-lifecycle"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Request queue and transition state machine."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Ext-data key: target certificate serial (hex).
pub const KEY_SERIAL: &str = "cert_serial";
/// Ext-data key: CRL reason name (camelCase).
pub const KEY_REASON: &str = "revocation_reason";
/// Ext-data key: claimed invalidity date (RFC 3339).
pub const KEY_INVALIDITY_DATE: &str = "invalidity_date";
/// Ext-data key: submitter comments.
pub const KEY_COMMENTS: &str = "comments";
/// Ext-data key: submitting host name.
pub const KEY_REMOTE_HOST: &str = "remote_host";
/// Ext-data key: submitting address.
pub const KEY_REMOTE_ADDR: &str = "remote_addr";
/// Ext-data key: requested subject DN.
pub const KEY_SUBJECT: &str = "subject";
/// Ext-data key: requested validity in days.
pub const KEY_VALIDITY_DAYS: &str = "validity_days";
/// Ext-data key: subject public key info, hex-encoded DER.
pub const KEY_SPKI_HEX: &str = "spki_hex";
/// Ext-data key: serial assigned to the issued certificate.
pub const KEY_ISSUED_SERIAL: &str = "issued_serial";
/// Ext-data key: marks a revocation created for a certificate hold.
pub const KEY_ON_HOLD: &str = "on_hold";

/// Unique request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Allocate a fresh id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a request represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// First issuance for a subject.
    Enrollment,
    /// Re-issuance of an existing certificate.
    Renewal,
    /// Certificate revocation (including holds).
    Revocation,
    /// Release of a held certificate.
    Unrevocation,
}

/// Request lifecycle status.
///
/// `Begin → Pending → Approved | Rejected | Canceled → Complete`; a policy
/// deferral is a side branch that parks the request back in `Pending`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Created but not yet submitted.
    Begin,
    /// Awaiting agent action or queue drain.
    Pending,
    /// Approved; side effects may still be outstanding in queued mode.
    Approved,
    /// Terminal: rejected by policy or agent.
    Rejected,
    /// Terminal: canceled by the submitter or an agent.
    Canceled,
    /// Terminal: side effects committed.
    Complete,
    /// Transient marker used in the processing trail; a deferred request is
    /// re-parked as `Pending`.
    Deferred,
}

impl RequestStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Rejected | RequestStatus::Canceled | RequestStatus::Complete
        )
    }
}

/// One processing outcome recorded on the request's trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingEvent {
    /// When the outcome was recorded.
    pub at: DateTime<Utc>,
    /// Operation or stage that produced the outcome.
    pub operation: String,
    /// Whether the stage succeeded.
    pub success: bool,
    /// Free-form detail (rejection reason, error text, issued serial).
    pub detail: String,
}

/// A unit of work tracked by the request queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique identifier.
    pub id: RequestId,
    /// Work kind.
    pub request_type: RequestType,
    /// Current status.
    pub status: RequestStatus,
    /// Owning profile, when the request was created through one.
    pub profile_id: Option<String>,
    /// Extension data: target serials, reason, comments, remote peer, and
    /// anything profile policies populate.
    pub ext_data: IndexMap<String, String>,
    /// Agent the request is assigned to.
    pub owner: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Append-only trail of processing outcomes.
    pub trail: Vec<ProcessingEvent>,
}

impl Request {
    /// Create a request in `Begin` state.
    pub fn new(
        request_type: RequestType,
        profile_id: Option<String>,
        ext_data: IndexMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RequestId::generate(),
            request_type,
            status: RequestStatus::Begin,
            profile_id,
            ext_data,
            owner: None,
            created_at: now,
            updated_at: now,
            trail: Vec::new(),
        }
    }

    /// Record a processing outcome and bump the update time.
    pub fn record(&mut self, operation: &str, success: bool, detail: impl Into<String>) {
        self.trail.push(ProcessingEvent {
            at: Utc::now(),
            operation: operation.to_owned(),
            success,
            detail: detail.into(),
        });
        self.updated_at = Utc::now();
    }

    /// Fetch an ext-data value.
    pub fn ext(&self, key: &str) -> Option<&str> {
        self.ext_data.get(key).map(String::as_str)
    }
}
