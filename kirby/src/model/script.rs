//! Versioned deployable scripts and their topic edges.

use crate::core::{ContextId, ScriptId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A versioned package executing within one context.
///
/// Edges are only ever added one at a time so partial updates never need
/// the whole script to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Identifier.
    pub id: ScriptId,
    /// Package name.
    pub package_name: String,
    /// Package version.
    pub package_version: String,
    /// The context the script runs in.
    pub context: ContextId,
    sources: BTreeSet<String>,
    destinations: BTreeSet<String>,
    /// First time a runner reported this script.
    pub first_seen: Option<DateTime<Utc>>,
    /// Last time a runner reported this script.
    pub last_seen: Option<DateTime<Utc>>,
}

impl Script {
    /// Creates a script with no edges.
    #[must_use]
    pub fn new(
        package_name: impl Into<String>,
        package_version: impl Into<String>,
        context: ContextId,
    ) -> Self {
        Self {
            id: ScriptId::new(),
            package_name: package_name.into(),
            package_version: package_version.into(),
            context,
            sources: BTreeSet::new(),
            destinations: BTreeSet::new(),
            first_seen: None,
            last_seen: None,
        }
    }

    /// Returns `package/version`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.package_name, self.package_version)
    }

    /// Adds a source topic. Returns false if the edge already existed.
    pub fn add_source(&mut self, topic: impl Into<String>) -> bool {
        self.sources.insert(topic.into())
    }

    /// Adds a destination topic. Returns false if the edge already existed.
    pub fn add_destination(&mut self, topic: impl Into<String>) -> bool {
        self.destinations.insert(topic.into())
    }

    /// Topics the script consumes.
    #[must_use]
    pub const fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    /// Topics the script produces.
    #[must_use]
    pub const fn destinations(&self) -> &BTreeSet<String> {
        &self.destinations
    }

    /// Iterates over every referenced topic, sources first.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.sources
            .iter()
            .chain(self.destinations.iter())
            .map(String::as_str)
    }

    /// Topics the script both consumes and produces.
    #[must_use]
    pub fn self_loops(&self) -> Vec<&str> {
        self.sources
            .intersection(&self.destinations)
            .map(String::as_str)
            .collect()
    }

    /// Records a sighting at `at`.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if self.first_seen.is_none() {
            self.first_seen = Some(at);
        }
        self.last_seen = Some(at);
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.package_name, self.package_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_edges_are_idempotent() {
        let mut script = Script::new("orders_retriever", "3.1.0", ContextId::new());
        assert!(script.add_source("orders"));
        assert!(!script.add_source("orders"));
        assert!(script.add_destination("timeseries"));
        assert!(!script.add_destination("timeseries"));

        assert_eq!(script.sources().len(), 1);
        assert_eq!(script.destinations().len(), 1);
    }

    #[test]
    fn test_self_loops() {
        let mut script = Script::new("looper", "0.1.0", ContextId::new());
        script.add_source("a");
        script.add_destination("b");
        assert!(script.self_loops().is_empty());

        script.add_destination("a");
        assert_eq!(script.self_loops(), vec!["a"]);
    }

    #[test]
    fn test_touch_keeps_first_seen() {
        let mut script = Script::new("abort_all", "0.0.1", ContextId::new());
        let first = Utc::now();
        let later = first + Duration::minutes(5);

        script.touch(first);
        script.touch(later);
        assert_eq!(script.first_seen, Some(first));
        assert_eq!(script.last_seen, Some(later));
    }

    #[test]
    fn test_label_and_display() {
        let script = Script::new("orders_retriever", "3.1.0", ContextId::new());
        assert_eq!(script.label(), "orders_retriever/3.1.0");
        assert_eq!(script.to_string(), "orders_retriever / 3.1.0");
    }
}
