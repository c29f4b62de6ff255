//! ---
//! pki_section: "06-revocation"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Revocation processing and replay protection."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use der::asn1::GeneralizedTime;
use der::Encode;
use r_pki_common::{CaError, CaResult};
use r_pki_store::{RevocationReason, StoredExtension};
use x509_cert::ext::pkix::CrlReason;

/// id-ce-cRLReasons.
pub const OID_CRL_REASON: &str = "2.5.29.21";
/// id-ce-invalidityDate.
pub const OID_INVALIDITY_DATE: &str = "2.5.29.24";

/// Build the CRL entry reason-code extension (DER `ENUMERATED`).
pub fn crl_reason_extension(reason: RevocationReason) -> CaResult<StoredExtension> {
    let crl_reason = match reason {
        RevocationReason::Unspecified => CrlReason::Unspecified,
        RevocationReason::KeyCompromise => CrlReason::KeyCompromise,
        RevocationReason::CaCompromise => CrlReason::CaCompromise,
        RevocationReason::AffiliationChanged => CrlReason::AffiliationChanged,
        RevocationReason::Superseded => CrlReason::Superseded,
        RevocationReason::CessationOfOperation => CrlReason::CessationOfOperation,
        RevocationReason::CertificateHold => CrlReason::CertificateHold,
        RevocationReason::RemoveFromCrl => CrlReason::RemoveFromCRL,
        RevocationReason::PrivilegeWithdrawn => CrlReason::PrivilegeWithdrawn,
        RevocationReason::AaCompromise => CrlReason::AaCompromise,
    };
    let value = crl_reason
        .to_der()
        .map_err(|err| CaError::Internal(format!("reason-code encoding: {err}")))?;
    Ok(StoredExtension {
        oid: OID_CRL_REASON.to_owned(),
        critical: false,
        value,
    })
}

/// Build the invalidity-date extension (DER `GeneralizedTime`).
pub fn invalidity_date_extension(at: DateTime<Utc>) -> CaResult<StoredExtension> {
    let seconds = u64::try_from(at.timestamp())
        .map_err(|_| CaError::BadInput(format!("pre-epoch invalidity date {at}")))?;
    let time = GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(seconds))
        .map_err(|err| CaError::BadInput(format!("invalidity date {at}: {err}")))?;
    let value = time
        .to_der()
        .map_err(|err| CaError::Internal(format!("invalidity-date encoding: {err}")))?;
    Ok(StoredExtension {
        oid: OID_INVALIDITY_DATE.to_owned(),
        critical: false,
        value,
    })
}
