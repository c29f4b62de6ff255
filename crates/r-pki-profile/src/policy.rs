//! ---
//! pki_section: "04-profile-policy"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate profiles and policy evaluation."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Request data a policy reads and populates: the request's extension-data
/// view handed to the policy set during evaluation.
pub type PolicyPayload = IndexMap<String, String>;

/// Outcome of evaluating one policy (or a whole policy set) against a
/// payload. Deferral and rejection are ordinary values, not exceptions; the
/// state machine switches on the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyVerdict {
    /// The payload satisfies the constraint.
    Accept,
    /// The payload violates the constraint; the request must be rejected.
    Reject(String),
    /// The policy cannot decide yet (e.g. waiting on an external check);
    /// the request stays pending and the caller may retry.
    Defer(String),
}

impl PolicyVerdict {
    /// True for the `Accept` tag.
    pub fn is_accept(&self) -> bool {
        matches!(self, PolicyVerdict::Accept)
    }
}

/// Immutable parameter set for one policy instance, built once at profile
/// load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    params: IndexMap<String, String>,
}

impl PolicyConfig {
    /// Build a config from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Fetch a raw parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Fetch a parameter parsed as `u32`, falling back to a default.
    pub fn get_u32_or(&self, key: &str, default: u32) -> u32 {
        self.get(key)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(default)
    }
}

/// One profile policy: a default-value generator paired with a constraint
/// validator. Implementations are stateless; per-instance parameters come
/// from the [`PolicyConfig`] captured at construction.
pub trait ProfilePolicy: Send + Sync {
    /// Registry class id this instance was built from.
    fn class_id(&self) -> &'static str;

    /// Fill in defaults the enrollment input did not provide.
    fn populate_defaults(&self, payload: &mut PolicyPayload);

    /// Check the payload against the constraint.
    fn validate(&self, payload: &PolicyPayload) -> PolicyVerdict;
}

/// Payload key: requested subject distinguished name.
pub const KEY_SUBJECT: &str = "subject";
/// Payload key: requested validity in days.
pub const KEY_VALIDITY_DAYS: &str = "validity_days";
/// Payload key: comma-separated key-usage names.
pub const KEY_KEY_USAGE: &str = "key_usage";
/// Payload key: number of recorded agent approvals.
pub const KEY_APPROVALS: &str = "approvals";

/// Requires the subject DN to contain a configured pattern
/// (`pattern` parameter, e.g. `OU=Devices`).
pub struct SubjectNameConstraint {
    pattern: String,
}

impl SubjectNameConstraint {
    /// Build from a policy config; an absent `pattern` matches everything.
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            pattern: config.get("pattern").unwrap_or_default().to_owned(),
        }
    }
}

impl ProfilePolicy for SubjectNameConstraint {
    fn class_id(&self) -> &'static str {
        "subjectNameConstraint"
    }

    fn populate_defaults(&self, _payload: &mut PolicyPayload) {}

    fn validate(&self, payload: &PolicyPayload) -> PolicyVerdict {
        let Some(subject) = payload.get(KEY_SUBJECT) else {
            return PolicyVerdict::Reject("missing subject name".into());
        };
        if self.pattern.is_empty() || subject.contains(&self.pattern) {
            PolicyVerdict::Accept
        } else {
            PolicyVerdict::Reject(format!(
                "subject {subject} does not match required pattern {}",
                self.pattern
            ))
        }
    }
}

/// Supplies a default validity and caps it (`default_days`, `max_days`).
pub struct ValidityWindowPolicy {
    default_days: u32,
    max_days: u32,
}

impl ValidityWindowPolicy {
    /// Build from a policy config. Defaults: 365 default, 730 max.
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            default_days: config.get_u32_or("default_days", 365),
            max_days: config.get_u32_or("max_days", 730),
        }
    }
}

impl ProfilePolicy for ValidityWindowPolicy {
    fn class_id(&self) -> &'static str {
        "validityWindow"
    }

    fn populate_defaults(&self, payload: &mut PolicyPayload) {
        payload
            .entry(KEY_VALIDITY_DAYS.to_owned())
            .or_insert_with(|| self.default_days.to_string());
    }

    fn validate(&self, payload: &PolicyPayload) -> PolicyVerdict {
        let raw = payload
            .get(KEY_VALIDITY_DAYS)
            .map(String::as_str)
            .unwrap_or("");
        match raw.parse::<u32>() {
            Ok(0) => PolicyVerdict::Reject("validity must be at least one day".into()),
            Ok(days) if days > self.max_days => PolicyVerdict::Reject(format!(
                "requested validity {days}d exceeds profile maximum {}d",
                self.max_days
            )),
            Ok(_) => PolicyVerdict::Accept,
            Err(_) => PolicyVerdict::Reject(format!("unparsable validity: {raw:?}")),
        }
    }
}

const KNOWN_KEY_USAGES: &[&str] = &[
    "digitalSignature",
    "nonRepudiation",
    "keyEncipherment",
    "dataEncipherment",
    "keyAgreement",
    "keyCertSign",
    "cRLSign",
];

/// Supplies default key usages and rejects unknown names
/// (`usages` parameter, comma-separated).
pub struct KeyUsageDefault {
    usages: String,
}

impl KeyUsageDefault {
    /// Build from a policy config.
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            usages: config
                .get("usages")
                .unwrap_or("digitalSignature,keyEncipherment")
                .to_owned(),
        }
    }
}

impl ProfilePolicy for KeyUsageDefault {
    fn class_id(&self) -> &'static str {
        "keyUsageDefault"
    }

    fn populate_defaults(&self, payload: &mut PolicyPayload) {
        payload
            .entry(KEY_KEY_USAGE.to_owned())
            .or_insert_with(|| self.usages.clone());
    }

    fn validate(&self, payload: &PolicyPayload) -> PolicyVerdict {
        let Some(raw) = payload.get(KEY_KEY_USAGE) else {
            return PolicyVerdict::Accept;
        };
        for usage in raw.split(',').map(str::trim).filter(|u| !u.is_empty()) {
            if !KNOWN_KEY_USAGES.contains(&usage) {
                return PolicyVerdict::Reject(format!("unknown key usage: {usage}"));
            }
        }
        PolicyVerdict::Accept
    }
}

/// Defers until the payload records enough agent approvals
/// (`required` parameter, default 1).
pub struct AgentApprovalGate {
    required: u32,
}

impl AgentApprovalGate {
    /// Build from a policy config.
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            required: config.get_u32_or("required", 1),
        }
    }
}

impl ProfilePolicy for AgentApprovalGate {
    fn class_id(&self) -> &'static str {
        "agentApprovalGate"
    }

    fn populate_defaults(&self, payload: &mut PolicyPayload) {
        payload
            .entry(KEY_APPROVALS.to_owned())
            .or_insert_with(|| "0".to_owned());
    }

    fn validate(&self, payload: &PolicyPayload) -> PolicyVerdict {
        let approvals = payload
            .get(KEY_APPROVALS)
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0);
        if approvals >= self.required {
            PolicyVerdict::Accept
        } else {
            PolicyVerdict::Defer(format!(
                "waiting on agent approval ({approvals}/{} recorded)",
                self.required
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, &str)]) -> PolicyPayload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn subject_constraint_requires_pattern_match() {
        let policy =
            SubjectNameConstraint::new(&PolicyConfig::from_pairs([("pattern", "OU=Devices")]));
        assert!(policy
            .validate(&payload(&[(KEY_SUBJECT, "CN=dev-1,OU=Devices,O=ACME")]))
            .is_accept());
        assert!(matches!(
            policy.validate(&payload(&[(KEY_SUBJECT, "CN=intruder,O=Other")])),
            PolicyVerdict::Reject(_)
        ));
        assert!(matches!(
            policy.validate(&payload(&[])),
            PolicyVerdict::Reject(_)
        ));
    }

    #[test]
    fn validity_policy_populates_and_caps() {
        let policy = ValidityWindowPolicy::new(&PolicyConfig::from_pairs([
            ("default_days", "90"),
            ("max_days", "180"),
        ]));
        let mut p = payload(&[]);
        policy.populate_defaults(&mut p);
        assert_eq!(p.get(KEY_VALIDITY_DAYS).unwrap(), "90");
        assert!(policy.validate(&p).is_accept());
        assert!(matches!(
            policy.validate(&payload(&[(KEY_VALIDITY_DAYS, "365")])),
            PolicyVerdict::Reject(_)
        ));
        assert!(matches!(
            policy.validate(&payload(&[(KEY_VALIDITY_DAYS, "soon")])),
            PolicyVerdict::Reject(_)
        ));
    }

    #[test]
    fn approval_gate_defers_until_satisfied() {
        let policy = AgentApprovalGate::new(&PolicyConfig::from_pairs([("required", "2")]));
        assert!(matches!(
            policy.validate(&payload(&[(KEY_APPROVALS, "1")])),
            PolicyVerdict::Defer(_)
        ));
        assert!(policy.validate(&payload(&[(KEY_APPROVALS, "2")])).is_accept());
    }

    #[test]
    fn key_usage_rejects_unknown_names() {
        let policy = KeyUsageDefault::new(&PolicyConfig::default());
        assert!(policy
            .validate(&payload(&[(KEY_KEY_USAGE, "digitalSignature, cRLSign")]))
            .is_accept());
        assert!(matches!(
            policy.validate(&payload(&[(KEY_KEY_USAGE, "quantumSignature")])),
            PolicyVerdict::Reject(_)
        ));
    }
}
