//! ---
//! pki_section: "03-certificate-store"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate records and repository bindings."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use r_pki_common::SerialNumber;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of an issued certificate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CertStatus {
    /// Within its validity window, not revoked.
    Valid,
    /// Permanently revoked.
    Revoked,
    /// Validity window elapsed without revocation.
    Expired,
    /// Revoked with reason `certificateHold`; can be restored.
    OnHold,
    /// Revoked after the validity window had already elapsed.
    RevokedExpired,
}

/// Standard CRL entry reason codes (RFC 5280 §5.3.1; value 7 is unused).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum RevocationReason {
    /// No reason given.
    Unspecified,
    /// The subject private key is known or suspected to be compromised.
    KeyCompromise,
    /// The issuing CA key is known or suspected to be compromised.
    CaCompromise,
    /// Subject affiliation changed; no compromise suspected.
    AffiliationChanged,
    /// Certificate replaced by a newer one.
    Superseded,
    /// The certified operation has ceased.
    CessationOfOperation,
    /// Temporary hold; the certificate can be taken off hold later.
    CertificateHold,
    /// Routing signal asking that a held certificate be released; never
    /// persisted on a record.
    RemoveFromCrl,
    /// Privileges granted by the certificate were withdrawn.
    PrivilegeWithdrawn,
    /// The attribute authority key is known or suspected to be compromised.
    AaCompromise,
}

impl RevocationReason {
    /// CRL reason-code value per RFC 5280.
    pub fn code(&self) -> u32 {
        match self {
            RevocationReason::Unspecified => 0,
            RevocationReason::KeyCompromise => 1,
            RevocationReason::CaCompromise => 2,
            RevocationReason::AffiliationChanged => 3,
            RevocationReason::Superseded => 4,
            RevocationReason::CessationOfOperation => 5,
            RevocationReason::CertificateHold => 6,
            RevocationReason::RemoveFromCrl => 8,
            RevocationReason::PrivilegeWithdrawn => 9,
            RevocationReason::AaCompromise => 10,
        }
    }

    /// Inverse of [`code`](Self::code); `None` for unknown or reserved values.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => RevocationReason::Unspecified,
            1 => RevocationReason::KeyCompromise,
            2 => RevocationReason::CaCompromise,
            3 => RevocationReason::AffiliationChanged,
            4 => RevocationReason::Superseded,
            5 => RevocationReason::CessationOfOperation,
            6 => RevocationReason::CertificateHold,
            8 => RevocationReason::RemoveFromCrl,
            9 => RevocationReason::PrivilegeWithdrawn,
            10 => RevocationReason::AaCompromise,
            _ => return None,
        })
    }
}

/// DER-encoded CRL entry extension carried on a revoked record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredExtension {
    /// Dotted object identifier of the extension.
    pub oid: String,
    /// Criticality flag.
    pub critical: bool,
    /// DER-encoded extension value.
    pub value: Vec<u8>,
}

/// Revocation metadata attached to a record while it is revoked or on hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevocationInfo {
    /// When the revocation took effect.
    pub revoked_on: DateTime<Utc>,
    /// Subject DN of the caller who requested the revocation.
    pub revoked_by: String,
    /// CRL reason code.
    pub reason: RevocationReason,
    /// Claimed date the key became invalid, if supplied.
    pub invalidity_date: Option<DateTime<Utc>>,
    /// CRL entry extensions persisted alongside the record.
    pub crl_entry_extensions: Vec<StoredExtension>,
}

/// One entry in the append-only status history of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// When the change was applied.
    pub at: DateTime<Utc>,
    /// Actor that drove the change.
    pub by: String,
    /// Status before the change.
    pub from: CertStatus,
    /// Status after the change.
    pub to: CertStatus,
    /// Reason code for revocations, absent for restores.
    pub reason: Option<RevocationReason>,
}

/// One issued certificate as tracked by the authority.
///
/// Records are created at issuance and mutated only through the guarded
/// revocation/restoration transitions; nothing is ever deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Certificate serial number (unique per issuer).
    pub serial: SerialNumber,
    /// Issuer distinguished name.
    pub issuer_dn: String,
    /// Subject distinguished name.
    pub subject_dn: String,
    /// Validity window start.
    pub not_before: DateTime<Utc>,
    /// Validity window end.
    pub not_after: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: CertStatus,
    /// Revocation metadata; present only while revoked or on hold.
    pub revocation: Option<RevocationInfo>,
    /// DER encoding of the issued certificate.
    pub encoded: Vec<u8>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Append-only history of status transitions.
    pub history: Vec<StatusChange>,
}

impl CertificateRecord {
    /// Create a freshly-issued record in `Valid` state.
    pub fn issued(
        serial: SerialNumber,
        issuer_dn: impl Into<String>,
        subject_dn: impl Into<String>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        encoded: Vec<u8>,
    ) -> Self {
        Self {
            serial,
            issuer_dn: issuer_dn.into(),
            subject_dn: subject_dn.into(),
            not_before,
            not_after,
            status: CertStatus::Valid,
            revocation: None,
            encoded,
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Whether the validity window has elapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.not_after
    }
}
