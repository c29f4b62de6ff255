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
use parking_lot::RwLock;
use r_pki_common::{CaError, CaResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::policy::{PolicyConfig, PolicyPayload, PolicyVerdict};
use crate::registry::instantiate_policy;

/// Declarative policy entry inside a profile: class id plus the immutable
/// parameter set the instance is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Unique id of this policy slot within the profile.
    pub id: String,
    /// Registry class id.
    pub class_id: String,
    /// Instance parameters.
    pub config: PolicyConfig,
}

/// Named set of fields an enrollment form must supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInput {
    /// Input identifier.
    pub id: String,
    /// Field names collected from the submitter.
    pub fields: Vec<String>,
}

/// Named set of fields rendered back after issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOutput {
    /// Output identifier.
    pub id: String,
    /// Field names rendered to the caller.
    pub fields: Vec<String>,
}

/// A named, versioned rule set governing certificate requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile identifier (e.g. `caServerCert`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description shown to submitters.
    pub description: String,
    /// Version string, bumped on configuration changes.
    pub version: String,
    /// Whether the profile accepts requests.
    pub enabled: bool,
    /// Agent who enabled the profile, when enabled.
    pub enabled_by: Option<String>,
    /// Whether end entities can see the profile.
    pub visible: bool,
    /// Enrollment inputs.
    pub inputs: Vec<ProfileInput>,
    /// Issuance outputs.
    pub outputs: Vec<ProfileOutput>,
    /// Policy set evaluated against every request.
    pub policies: Vec<PolicySpec>,
}

impl Profile {
    /// Create a disabled, invisible profile with no policy set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: "1.0".to_owned(),
            enabled: false,
            enabled_by: None,
            visible: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            policies: Vec::new(),
        }
    }
}

/// Shared profile store. Configuration mutations require the profile to be
/// disabled; evaluation requires it to be enabled.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: RwLock<IndexMap<String, Profile>>,
}

impl ProfileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile; `Conflict` if the id is taken.
    pub fn add(&self, profile: Profile) -> CaResult<()> {
        let mut profiles = self.profiles.write();
        if profiles.contains_key(&profile.id) {
            return Err(CaError::Conflict(format!(
                "profile {} already exists",
                profile.id
            )));
        }
        debug!(profile = %profile.id, "profile registered");
        profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    /// Fetch a profile snapshot by id.
    pub fn get(&self, id: &str) -> CaResult<Profile> {
        self.profiles
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CaError::NotFound(format!("profile {id}")))
    }

    /// Enable a profile on behalf of an agent.
    pub fn enable(&self, id: &str, agent: &str) -> CaResult<()> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| CaError::NotFound(format!("profile {id}")))?;
        if profile.enabled {
            return Err(CaError::Conflict(format!("profile {id} is already enabled")));
        }
        profile.enabled = true;
        profile.enabled_by = Some(agent.to_owned());
        info!(profile = %id, agent = %agent, "profile enabled");
        Ok(())
    }

    /// Disable a profile.
    pub fn disable(&self, id: &str) -> CaResult<()> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| CaError::NotFound(format!("profile {id}")))?;
        if !profile.enabled {
            return Err(CaError::Conflict(format!("profile {id} is already disabled")));
        }
        profile.enabled = false;
        profile.enabled_by = None;
        info!(profile = %id, "profile disabled");
        Ok(())
    }

    /// Replace the policy set. The profile must be disabled.
    pub fn replace_policies(&self, id: &str, policies: Vec<PolicySpec>) -> CaResult<()> {
        self.mutate_disabled(id, |profile| profile.policies = policies)
    }

    /// Replace the input set. The profile must be disabled.
    pub fn replace_inputs(&self, id: &str, inputs: Vec<ProfileInput>) -> CaResult<()> {
        self.mutate_disabled(id, |profile| profile.inputs = inputs)
    }

    /// Replace the output set. The profile must be disabled.
    pub fn replace_outputs(&self, id: &str, outputs: Vec<ProfileOutput>) -> CaResult<()> {
        self.mutate_disabled(id, |profile| profile.outputs = outputs)
    }

    fn mutate_disabled(&self, id: &str, apply: impl FnOnce(&mut Profile)) -> CaResult<()> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| CaError::NotFound(format!("profile {id}")))?;
        if profile.enabled {
            return Err(CaError::Conflict(format!(
                "profile {id} must be disabled before its configuration can change"
            )));
        }
        apply(profile);
        Ok(())
    }

    /// Populate policy defaults into a fresh request payload.
    pub fn populate_defaults(&self, id: &str, payload: &mut PolicyPayload) -> CaResult<()> {
        let profile = self.get(id)?;
        for spec in &profile.policies {
            let policy = instantiate_policy(&spec.class_id, &spec.config)?;
            policy.populate_defaults(payload);
        }
        Ok(())
    }

    /// Run the profile's policy set against a payload. The first non-accept
    /// verdict wins; evaluation never aggregates multiple failures.
    pub fn evaluate(&self, id: &str, payload: &PolicyPayload) -> CaResult<PolicyVerdict> {
        let profile = self.get(id)?;
        if !profile.enabled {
            return Err(CaError::Conflict(format!("profile {id} is disabled")));
        }
        for spec in &profile.policies {
            let policy = instantiate_policy(&spec.class_id, &spec.config)?;
            match policy.validate(payload) {
                PolicyVerdict::Accept => continue,
                blocking => {
                    debug!(profile = %id, policy = %spec.id, verdict = ?blocking, "policy verdict");
                    return Ok(blocking);
                }
            }
        }
        Ok(PolicyVerdict::Accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::KEY_SUBJECT;

    fn device_profile() -> Profile {
        let mut profile = Profile::new("deviceCert", "Device certificate enrollment");
        profile.policies = vec![
            PolicySpec {
                id: "p1".into(),
                class_id: "subjectNameConstraint".into(),
                config: PolicyConfig::from_pairs([("pattern", "OU=Devices")]),
            },
            PolicySpec {
                id: "p2".into(),
                class_id: "validityWindow".into(),
                config: PolicyConfig::from_pairs([("default_days", "90"), ("max_days", "180")]),
            },
        ];
        profile
    }

    fn payload(subject: &str) -> PolicyPayload {
        [(KEY_SUBJECT.to_owned(), subject.to_owned())]
            .into_iter()
            .collect()
    }

    #[test]
    fn enabled_profile_rejects_configuration_changes() {
        let store = ProfileStore::new();
        store.add(device_profile()).unwrap();
        store.enable("deviceCert", "CN=admin").unwrap();

        let result = store.replace_policies("deviceCert", Vec::new());
        assert!(matches!(result, Err(CaError::Conflict(_))));
        // Stored configuration must be untouched by the failed edit.
        assert_eq!(store.get("deviceCert").unwrap().policies.len(), 2);
    }

    #[test]
    fn disabled_profile_accepts_configuration_changes() {
        let store = ProfileStore::new();
        store.add(device_profile()).unwrap();
        store.replace_policies("deviceCert", Vec::new()).unwrap();
        assert!(store.get("deviceCert").unwrap().policies.is_empty());
    }

    #[test]
    fn evaluation_requires_enabled_profile() {
        let store = ProfileStore::new();
        store.add(device_profile()).unwrap();
        assert!(matches!(
            store.evaluate("deviceCert", &payload("CN=x,OU=Devices")),
            Err(CaError::Conflict(_))
        ));
    }

    #[test]
    fn first_blocking_verdict_wins() {
        let store = ProfileStore::new();
        store.add(device_profile()).unwrap();
        store.enable("deviceCert", "CN=admin").unwrap();

        let mut p = payload("CN=rogue,O=Elsewhere");
        p.insert("validity_days".into(), "9999".into());
        // Both policies would fail; only the subject constraint reports.
        match store.evaluate("deviceCert", &p).unwrap() {
            PolicyVerdict::Reject(reason) => assert!(reason.contains("pattern")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn defaults_round_through_populate() {
        let store = ProfileStore::new();
        store.add(device_profile()).unwrap();
        let mut p = payload("CN=dev-1,OU=Devices");
        store.populate_defaults("deviceCert", &mut p).unwrap();
        assert_eq!(p.get("validity_days").unwrap(), "90");
    }

    #[test]
    fn enable_disable_track_owner() {
        let store = ProfileStore::new();
        store.add(device_profile()).unwrap();
        store.enable("deviceCert", "CN=admin").unwrap();
        assert_eq!(
            store.get("deviceCert").unwrap().enabled_by.as_deref(),
            Some("CN=admin")
        );
        assert!(matches!(
            store.enable("deviceCert", "CN=admin"),
            Err(CaError::Conflict(_))
        ));
        store.disable("deviceCert").unwrap();
        assert!(store.get("deviceCert").unwrap().enabled_by.is_none());
    }
}
