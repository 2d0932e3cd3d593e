//! Configuration keys scoped to the catalog, a job, or a context.

use crate::core::{ConfigScope, EntityKind};
use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single configuration entry handed to scripts as a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigKey {
    /// Variable name.
    pub name: String,
    /// Variable value, always stored as text.
    pub value: String,
    /// Derived from the owner.
    pub scope: ConfigScope,
}

/// Configuration keys owned by one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    scope: ConfigScope,
    values: BTreeMap<String, String>,
}

impl Default for ConfigMap {
    fn default() -> Self {
        Self::new(ConfigScope::Global)
    }
}

impl ConfigMap {
    /// Creates an empty map for the given owner scope.
    #[must_use]
    pub fn new(scope: ConfigScope) -> Self {
        Self {
            scope,
            values: BTreeMap::new(),
        }
    }

    /// Returns the owner scope.
    #[must_use]
    pub const fn scope(&self) -> ConfigScope {
        self.scope
    }

    /// Adds a key. Names are unique per owner.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateName`] if the key is already set.
    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) -> Result<(), ValidationError> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::ConfigKey,
                name,
            });
        }
        self.values.insert(name, value.to_string());
        Ok(())
    }

    /// Removes a key, returning its value.
    pub fn unset(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Returns true if no keys are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the keys as store records.
    #[must_use]
    pub fn keys(&self) -> Vec<ConfigKey> {
        let scope = self.scope();
        self.values
            .iter()
            .map(|(name, value)| ConfigKey {
                name: name.clone(),
                value: value.clone(),
                scope,
            })
            .collect()
    }
}

/// Merges the three scopes; context overrides job, job overrides global.
#[must_use]
pub fn resolve_variables(
    global: &ConfigMap,
    job: &ConfigMap,
    context: &ConfigMap,
) -> BTreeMap<String, String> {
    let mut export = global.values.clone();
    for layer in [job, context] {
        export.extend(layer.values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    export
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_stringifies_values() {
        let mut config = ConfigMap::new(ConfigScope::Context);
        config.set("url", "http://localhost:8000").unwrap();
        config.set("loop", 30).unwrap();
        config.set("retry", true).unwrap();

        assert_eq!(config.get("loop"), Some("30"));
        assert_eq!(config.get("retry"), Some("true"));
        assert!(config.keys().iter().all(|k| k.scope == ConfigScope::Context));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut config = ConfigMap::new(ConfigScope::Job);
        config.set("API_URL", "a").unwrap();
        assert!(matches!(
            config.set("API_URL", "b"),
            Err(ValidationError::DuplicateName { kind: EntityKind::ConfigKey, .. })
        ));
        assert_eq!(config.unset("API_URL").as_deref(), Some("a"));
        assert!(config.is_empty());
    }

    #[test]
    fn test_resolution_precedence() {
        let mut global = ConfigMap::new(ConfigScope::Global);
        global.set("A", "global").unwrap();
        global.set("B", "global").unwrap();
        global.set("C", "global").unwrap();

        let mut job = ConfigMap::new(ConfigScope::Job);
        job.set("B", "job").unwrap();
        job.set("C", "job").unwrap();

        let mut context = ConfigMap::new(ConfigScope::Context);
        context.set("C", "context").unwrap();

        let vars = resolve_variables(&global, &job, &context);
        assert_eq!(vars["A"], "global");
        assert_eq!(vars["B"], "job");
        assert_eq!(vars["C"], "context");
    }
}
