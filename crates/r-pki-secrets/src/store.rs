//! ---
//! pki_section: "08-shared-secrets"
//! pki_subsection: "module"
//! pki_type: "source"
//! pki_scope: "code"
//! pki_description: "Shared-secret store and subsystem exchange."
//! pki_version: "v0.0.0-prealpha"
//! pki_owner: "tbd"
//! ---
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use r_pki_common::{CaError, CaResult};
use r_pki_keywrap::SymKeyType;
use tracing::info;

/// A named permanent symmetric key held by this subsystem instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricSecret {
    /// Key family the material belongs to.
    pub key_type: SymKeyType,
    /// Raw key material.
    pub material: Vec<u8>,
    /// When the secret was created or imported.
    pub created_at: DateTime<Utc>,
}

impl SymmetricSecret {
    /// Wrap raw material as an AES secret created now.
    pub fn aes(material: Vec<u8>) -> Self {
        Self {
            key_type: SymKeyType::Aes,
            material,
            created_at: Utc::now(),
        }
    }
}

/// Uniquely-named symmetric key store. The exists-then-create sequence runs
/// under one lock, so two concurrent imports of the same name see exactly
/// one success.
#[derive(Debug, Default)]
pub struct SecretStore {
    entries: Mutex<HashMap<String, SymmetricSecret>>,
}

impl SecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically insert a new secret; `Conflict` if the name is taken.
    pub fn insert_new(&self, name: &str, secret: SymmetricSecret) -> CaResult<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(name) {
            return Err(CaError::Conflict(format!("secret {name} already exists")));
        }
        entries.insert(name.to_owned(), secret);
        info!(name = %name, "shared secret stored");
        Ok(())
    }

    /// Fetch a secret by name.
    pub fn get(&self, name: &str) -> CaResult<SymmetricSecret> {
        self.entries
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| CaError::NotFound(format!("secret {name}")))
    }

    /// Whether a secret of this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_is_conflict() {
        let store = SecretStore::new();
        store
            .insert_new("subsystemKey", SymmetricSecret::aes(vec![1; 16]))
            .unwrap();
        assert!(matches!(
            store.insert_new("subsystemKey", SymmetricSecret::aes(vec![2; 16])),
            Err(CaError::Conflict(_))
        ));
        // The original material survives the failed insert.
        assert_eq!(store.get("subsystemKey").unwrap().material, vec![1; 16]);
    }

    #[test]
    fn missing_name_is_not_found() {
        let store = SecretStore::new();
        assert!(matches!(store.get("nope"), Err(CaError::NotFound(_))));
    }
}
