//! ---
//! pki_section: "05-request-lifecycle"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Request queue and transition state machine."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use prometheus::{IntCounter, Registry};
use std::sync::Arc;

/// Lifecycle metrics exported via Prometheus.
#[derive(Clone)]
pub struct LifecycleMetrics {
    registry: Arc<Registry>,
    transitions_total: IntCounter,
    policy_rejections_total: IntCounter,
    policy_deferrals_total: IntCounter,
    requests_completed_total: IntCounter,
    revocations_total: IntCounter,
    unrevocations_total: IntCounter,
}

impl LifecycleMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> anyhow::Result<Self> {
        let transitions_total = IntCounter::new(
            "request_transitions_total",
            "Total request state transitions attempted",
        )?;
        let policy_rejections_total = IntCounter::new(
            "policy_rejections_total",
            "Requests rejected by profile policy evaluation",
        )?;
        let policy_deferrals_total = IntCounter::new(
            "policy_deferrals_total",
            "Requests deferred by profile policy evaluation",
        )?;
        let requests_completed_total = IntCounter::new(
            "requests_completed_total",
            "Requests whose side effects committed",
        )?;
        let revocations_total =
            IntCounter::new("revocations_total", "Certificates revoked or placed on hold")?;
        let unrevocations_total =
            IntCounter::new("unrevocations_total", "Certificates taken off hold")?;

        registry.register(Box::new(transitions_total.clone()))?;
        registry.register(Box::new(policy_rejections_total.clone()))?;
        registry.register(Box::new(policy_deferrals_total.clone()))?;
        registry.register(Box::new(requests_completed_total.clone()))?;
        registry.register(Box::new(revocations_total.clone()))?;
        registry.register(Box::new(unrevocations_total.clone()))?;

        Ok(Self {
            registry,
            transitions_total,
            policy_rejections_total,
            policy_deferrals_total,
            requests_completed_total,
            revocations_total,
            unrevocations_total,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Count an attempted transition.
    pub fn inc_transition(&self) {
        self.transitions_total.inc();
    }

    /// Count a policy rejection.
    pub fn inc_policy_rejection(&self) {
        self.policy_rejections_total.inc();
    }

    /// Count a policy deferral.
    pub fn inc_policy_deferral(&self) {
        self.policy_deferrals_total.inc();
    }

    /// Count a completed request.
    pub fn inc_completed(&self) {
        self.requests_completed_total.inc();
    }

    /// Count a revocation.
    pub fn inc_revocation(&self) {
        self.revocations_total.inc();
    }

    /// Count an unrevocation.
    pub fn inc_unrevocation(&self) {
        self.unrevocations_total.inc();
    }
}
