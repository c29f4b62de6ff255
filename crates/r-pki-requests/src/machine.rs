//! ---
//! pki_section: "05-request-lifecycle"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Request queue and transition state machine."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use r_pki_audit::{AuditLog, AuditOutcome, ACTION_REQUEST_TRANSITION};
use r_pki_common::{CaError, CaResult, ProcessingMode};
use r_pki_profile::{PolicyPayload, PolicyVerdict, ProfileStore};
use serde_json::json;
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::metrics::LifecycleMetrics;
use crate::model::{RequestId, RequestStatus};
use crate::queue::RequestQueue;

/// Named transitions the review layer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RequestOperation {
    /// Accept the request; side effects commit through the executor.
    Approve,
    /// Terminally reject the request.
    Reject,
    /// Terminally cancel the request.
    Cancel,
    /// Merge the review payload into the request and re-evaluate.
    Update,
    /// Re-evaluate policies without changing anything.
    Validate,
    /// Hand the request to an agent.
    Assign,
    /// Release the request from its agent.
    Unassign,
}

/// Result of a transition that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The operation was applied; the request now has this status.
    Applied {
        /// Status after the transition.
        status: RequestStatus,
    },
    /// A policy could not decide yet; the request stays `Pending` and the
    /// caller may retry once the blocking condition clears.
    Deferred {
        /// What the policy is waiting for.
        reason: String,
    },
    /// A policy rejected the payload; the request is terminally `Rejected`.
    Rejected {
        /// Why the policy rejected it.
        reason: String,
    },
}

/// Transition engine for enrollment, renewal, and revocation requests.
///
/// All operations funnel through one dispatcher: look the request up, re-run
/// the owning profile's policy set against the review payload, then apply
/// the named operation. Collaborators are injected at construction.
pub struct RequestStateMachine {
    queue: Arc<RequestQueue>,
    profiles: Arc<ProfileStore>,
    audit: Arc<Mutex<AuditLog>>,
    metrics: Option<LifecycleMetrics>,
}

impl RequestStateMachine {
    /// Wire the state machine to its collaborators.
    pub fn new(
        queue: Arc<RequestQueue>,
        profiles: Arc<ProfileStore>,
        audit: Arc<Mutex<AuditLog>>,
    ) -> Self {
        Self {
            queue,
            profiles,
            audit,
            metrics: None,
        }
    }

    /// Attach lifecycle metrics.
    pub fn with_metrics(mut self, metrics: LifecycleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Dispatch by operation name; unknown names fail with `BadInput`.
    pub fn transition_named(
        &self,
        id: &RequestId,
        operation: &str,
        payload: &PolicyPayload,
        actor: &str,
    ) -> CaResult<TransitionOutcome> {
        let operation = RequestOperation::from_str(operation)
            .map_err(|_| CaError::BadInput(format!("unknown operation: {operation}")))?;
        self.transition(id, operation, payload, actor)
    }

    /// Execute one named transition.
    pub fn transition(
        &self,
        id: &RequestId,
        operation: RequestOperation,
        payload: &PolicyPayload,
        actor: &str,
    ) -> CaResult<TransitionOutcome> {
        if let Some(metrics) = &self.metrics {
            metrics.inc_transition();
        }
        let request = self.queue.get(id)?;
        debug!(request = %id, operation = %operation, status = %request.status, "transition requested");

        // Re-run the owning profile's policy set against the current review
        // payload before any status change.
        if let Some(profile_id) = request.profile_id.clone() {
            let mut merged: PolicyPayload = request.ext_data.clone();
            for (key, value) in payload {
                merged.insert(key.clone(), value.clone());
            }
            let verdict = self.profiles.evaluate(&profile_id, &merged).map_err(|err| {
                CaError::Internal(format!("policy evaluation for {profile_id}: {err}"))
            })?;
            match verdict {
                PolicyVerdict::Accept => {}
                PolicyVerdict::Defer(reason) => {
                    self.queue.modify(id, |request| {
                        request.status = RequestStatus::Pending;
                        request.record(&operation.to_string(), false, format!("deferred: {reason}"));
                        Ok(())
                    })?;
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_policy_deferral();
                    }
                    self.audit(actor, id, operation, "deferred", &reason);
                    return Ok(TransitionOutcome::Deferred { reason });
                }
                PolicyVerdict::Reject(reason) => {
                    self.queue.modify(id, |request| {
                        request.status = RequestStatus::Rejected;
                        request.record(&operation.to_string(), false, format!("rejected: {reason}"));
                        Ok(())
                    })?;
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_policy_rejection();
                    }
                    self.audit(actor, id, operation, "rejected", &reason);
                    return Ok(TransitionOutcome::Rejected { reason });
                }
            }
        }

        let status = match operation {
            RequestOperation::Approve => {
                self.queue.modify(id, |request| {
                    if request.status != RequestStatus::Pending {
                        return Err(CaError::Conflict(format!(
                            "request {id} is {}, not approvable",
                            request.status
                        )));
                    }
                    request.status = RequestStatus::Approved;
                    request.record("approve", true, format!("approved by {actor}"));
                    Ok(())
                })?;
                match self.queue.mode() {
                    ProcessingMode::Inline => self.queue.execute(id)?,
                    ProcessingMode::Queued => {
                        self.queue.park(id);
                        RequestStatus::Approved
                    }
                }
            }
            RequestOperation::Reject => self.terminal(id, actor, RequestStatus::Rejected)?,
            RequestOperation::Cancel => self.terminal(id, actor, RequestStatus::Canceled)?,
            RequestOperation::Update => self.queue.modify(id, |request| {
                if request.status.is_terminal() {
                    return Err(CaError::Conflict(format!(
                        "request {id} is {}, not updatable",
                        request.status
                    )));
                }
                for (key, value) in payload {
                    request.ext_data.insert(key.clone(), value.clone());
                }
                request.record("update", true, format!("updated by {actor}"));
                Ok(request.status)
            })?,
            RequestOperation::Validate => {
                // Policies already re-ran above; nothing to mutate.
                request.status
            }
            RequestOperation::Assign => self.queue.modify(id, |request| {
                let assignee = payload
                    .get("assignee")
                    .map(String::as_str)
                    .unwrap_or(actor)
                    .to_owned();
                request.record("assign", true, format!("assigned to {assignee}"));
                request.owner = Some(assignee);
                Ok(request.status)
            })?,
            RequestOperation::Unassign => self.queue.modify(id, |request| {
                request.owner = None;
                request.record("unassign", true, "owner cleared");
                Ok(request.status)
            })?,
        };

        self.audit(actor, id, operation, "applied", &status.to_string());
        Ok(TransitionOutcome::Applied { status })
    }

    fn terminal(
        &self,
        id: &RequestId,
        actor: &str,
        target: RequestStatus,
    ) -> CaResult<RequestStatus> {
        self.queue.modify(id, |request| {
            if request.status.is_terminal() {
                return Err(CaError::Conflict(format!(
                    "request {id} is already {}",
                    request.status
                )));
            }
            request.status = target;
            request.record(&target.to_string(), true, format!("by {actor}"));
            Ok(target)
        })
    }

    fn audit(
        &self,
        actor: &str,
        id: &RequestId,
        operation: RequestOperation,
        disposition: &str,
        detail: &str,
    ) {
        let result = self.audit.lock().append(
            actor,
            ACTION_REQUEST_TRANSITION,
            AuditOutcome::Success,
            json!({
                "request": id.to_string(),
                "operation": operation.to_string(),
                "disposition": disposition,
                "detail": detail,
            }),
        );
        if let Err(err) = result {
            warn!(request = %id, error = %err, "failed to audit request transition");
        }
    }
}
