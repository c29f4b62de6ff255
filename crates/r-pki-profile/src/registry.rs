//! ---
//! pki_section: "04-profile-policy"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Certificate profiles and policy evaluation."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::collections::HashMap;

use once_cell::sync::Lazy;
use r_pki_common::{CaError, CaResult};

use crate::policy::{
    AgentApprovalGate, KeyUsageDefault, PolicyConfig, ProfilePolicy, SubjectNameConstraint,
    ValidityWindowPolicy,
};

type PolicyFactory = fn(&PolicyConfig) -> Box<dyn ProfilePolicy>;

// Compile-time class-id registry. Adding a policy means adding a line here;
// there is no reflective instantiation path.
static REGISTRY: Lazy<HashMap<&'static str, PolicyFactory>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, PolicyFactory> = HashMap::new();
    map.insert("subjectNameConstraint", |cfg| {
        Box::new(SubjectNameConstraint::new(cfg))
    });
    map.insert("validityWindow", |cfg| Box::new(ValidityWindowPolicy::new(cfg)));
    map.insert("keyUsageDefault", |cfg| Box::new(KeyUsageDefault::new(cfg)));
    map.insert("agentApprovalGate", |cfg| Box::new(AgentApprovalGate::new(cfg)));
    map
});

/// Instantiate a policy implementation for a class id.
pub fn instantiate_policy(class_id: &str, config: &PolicyConfig) -> CaResult<Box<dyn ProfilePolicy>> {
    let factory = REGISTRY
        .get(class_id)
        .ok_or_else(|| CaError::BadInput(format!("unknown policy class: {class_id}")))?;
    Ok(factory(config))
}

/// The class ids the registry can build.
pub fn known_policy_classes() -> Vec<&'static str> {
    let mut classes: Vec<&'static str> = REGISTRY.keys().copied().collect();
    classes.sort_unstable();
    classes
}
