//! Authoritative set of named broker topics.

use crate::core::EntityKind;
use crate::errors::ValidationError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Longest topic name the broker accepts.
pub const MAX_TOPIC_NAME_LEN: usize = 249;

static LEGAL_TOPIC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("topic name pattern compiles"));

/// Checks that `name` is a topic name the broker will accept.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTopicName`] describing the first rule broken.
pub fn validate_topic_name(name: &str) -> Result<(), ValidationError> {
    let reject = |reason: &str| ValidationError::InvalidTopicName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(reject("name is empty"));
    }
    if name.len() > MAX_TOPIC_NAME_LEN {
        return Err(reject("name is longer than 249 characters"));
    }
    if name == "." || name == ".." {
        return Err(reject("'.' and '..' are reserved"));
    }
    if !LEGAL_TOPIC_NAME.is_match(name) {
        return Err(reject("only ASCII letters, digits, '.', '_' and '-' are allowed"));
    }
    Ok(())
}

/// A named broker channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique name across the registry.
    pub name: String,
    /// When the topic was registered.
    pub registered_at: DateTime<Utc>,
}

impl Topic {
    /// Creates a topic after checking its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not broker-legal.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_topic_name(&name)?;
        Ok(Self {
            name,
            registered_at: Utc::now(),
        })
    }
}

#[derive(Debug, Default)]
struct Entries {
    topics: HashMap<String, Topic>,
    /// Registration order.
    order: Vec<String>,
}

/// Registry of topics. Topics are referenced, never owned, by scripts.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    entries: RwLock<Entries>,
}

impl TopicRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is illegal or already registered.
    pub fn register(&self, name: impl Into<String>) -> Result<Topic, ValidationError> {
        let topic = Topic::new(name)?;
        let mut entries = self.entries.write();
        if entries.topics.contains_key(&topic.name) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::Topic,
                name: topic.name,
            });
        }
        entries.order.push(topic.name.clone());
        entries.topics.insert(topic.name.clone(), topic.clone());
        Ok(topic)
    }

    /// Removes a topic. Scripts referencing it are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownTopic`] if it is not registered.
    pub fn remove(&self, name: &str) -> Result<Topic, ValidationError> {
        let mut entries = self.entries.write();
        let topic = entries
            .topics
            .remove(name)
            .ok_or_else(|| ValidationError::UnknownTopic {
                name: name.to_string(),
            })?;
        entries.order.retain(|n| n != name);
        Ok(topic)
    }

    /// Looks up a topic by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Topic> {
        self.entries.read().topics.get(name).cloned()
    }

    /// Returns true if the topic is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().topics.contains_key(name)
    }

    /// Fails with [`ValidationError::UnknownTopic`] unless the topic is registered.
    pub fn require(&self, name: &str) -> Result<(), ValidationError> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(ValidationError::UnknownTopic {
                name: name.to_string(),
            })
        }
    }

    /// Returns topic names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.read().order.clone()
    }

    /// Returns the number of registered topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().topics.len()
    }

    /// Returns true if no topics are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = TopicRegistry::new();
        registry.register("orders").unwrap();
        registry.register("timeseries").unwrap();

        assert!(registry.contains("orders"));
        assert_eq!(registry.get("timeseries").unwrap().name, "timeseries");
        assert_eq!(registry.names(), vec!["orders", "timeseries"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = TopicRegistry::new();
        registry.register("orders").unwrap();

        let err = registry.register("orders").unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateName {
                kind: EntityKind::Topic,
                name: "orders".to_string()
            }
        );
    }

    #[test]
    fn test_remove_unknown_topic() {
        let registry = TopicRegistry::new();
        assert!(matches!(
            registry.remove("ghost"),
            Err(ValidationError::UnknownTopic { .. })
        ));
    }

    #[test]
    fn test_remove_keeps_order_of_others() {
        let registry = TopicRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(name).unwrap();
        }
        registry.remove("b").unwrap();
        assert_eq!(registry.names(), vec!["a", "c"]);
        assert!(registry.require("b").is_err());
    }

    #[test]
    fn test_topic_name_rules() {
        assert!(validate_topic_name("asset_management").is_ok());
        assert!(validate_topic_name("orders.v2-eu").is_ok());
        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("..").is_err());
        assert!(validate_topic_name("has space").is_err());
        assert!(validate_topic_name(&"x".repeat(MAX_TOPIC_NAME_LEN + 1)).is_err());
        assert!(validate_topic_name(&"x".repeat(MAX_TOPIC_NAME_LEN)).is_ok());
    }
}
