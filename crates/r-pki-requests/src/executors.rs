//! ---
//! pki_section: "05-request-lifecycle"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Request queue and transition state machine."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use r_pki_common::{CaError, CaResult, SerialNumber, SigningConfig};
use r_pki_signer::{sign_cert, CertTemplate, IssuerKey, SignatureAlgorithm};
use r_pki_store::{CertificateRecord, CertificateRepository};
use tracing::info;

use crate::model::{
    Request, RequestType, KEY_ISSUED_SERIAL, KEY_SPKI_HEX, KEY_SUBJECT, KEY_VALIDITY_DAYS,
};
use crate::queue::RequestExecutor;

/// Issues a certificate when an enrollment or renewal request executes:
/// builds the template from the request's ext data, signs it with the
/// authority key, and creates the certificate record.
pub struct EnrollmentExecutor {
    repository: Arc<dyn CertificateRepository>,
    issuer_key: Arc<IssuerKey>,
    issuer_dn: String,
    signing: SigningConfig,
    next_serial: AtomicU64,
}

impl EnrollmentExecutor {
    /// Wire the executor to its collaborators. Serials are allocated from a
    /// monotonically increasing counter starting at `first_serial`.
    pub fn new(
        repository: Arc<dyn CertificateRepository>,
        issuer_key: Arc<IssuerKey>,
        issuer_dn: impl Into<String>,
        signing: SigningConfig,
        first_serial: u64,
    ) -> Self {
        Self {
            repository,
            issuer_key,
            issuer_dn: issuer_dn.into(),
            signing,
            next_serial: AtomicU64::new(first_serial),
        }
    }
}

impl RequestExecutor for EnrollmentExecutor {
    fn execute(&self, request: &mut Request) -> CaResult<()> {
        if !matches!(
            request.request_type,
            RequestType::Enrollment | RequestType::Renewal
        ) {
            return Err(CaError::BadInput(format!(
                "enrollment executor cannot process {} requests",
                request.request_type
            )));
        }

        let subject = request
            .ext(KEY_SUBJECT)
            .ok_or_else(|| CaError::BadInput("enrollment request missing subject".into()))?
            .to_owned();
        let spki_hex = request
            .ext(KEY_SPKI_HEX)
            .ok_or_else(|| CaError::BadInput("enrollment request missing public key".into()))?;
        let spki_der = hex::decode(spki_hex)
            .map_err(|err| CaError::BadInput(format!("malformed public key hex: {err}")))?;
        let validity_days = match request.ext(KEY_VALIDITY_DAYS) {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|err| CaError::BadInput(format!("unparsable validity {raw:?}: {err}")))?,
            None => self.signing.default_validity_days,
        };

        let algorithm = SignatureAlgorithm::from_name(&self.signing.default_algorithm)?;
        let serial = SerialNumber::from(self.next_serial.fetch_add(1, Ordering::SeqCst));
        let not_before = Utc::now();
        let not_after = not_before + Duration::days(i64::from(validity_days));

        let template = CertTemplate::new(
            serial.clone(),
            self.issuer_dn.clone(),
            subject.clone(),
            not_before,
            not_after,
            spki_der,
        );
        let encoded = sign_cert(&self.issuer_key, &template, algorithm)?;

        self.repository.create(CertificateRecord::issued(
            serial.clone(),
            self.issuer_dn.clone(),
            subject.clone(),
            not_before,
            not_after,
            encoded,
        ))?;

        request
            .ext_data
            .insert(KEY_ISSUED_SERIAL.to_owned(), serial.to_hex());
        info!(request = %request.id, serial = %serial, subject = %subject, "certificate issued");
        Ok(())
    }
}
