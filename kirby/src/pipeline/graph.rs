//! Scripts and the topics they consume and produce.

use super::cycles::{find_cycles, PipelineCycle};
use crate::core::{ContextId, EntityKind, ScriptId};
use crate::errors::ValidationError;
use crate::model::Script;
use crate::topics::TopicRegistry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Source and destination topics of one script.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScriptEdges {
    /// Topics consumed.
    pub sources: BTreeSet<String>,
    /// Topics produced.
    pub destinations: BTreeSet<String>,
}

/// A script referencing a topic that is no longer registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    /// The script.
    pub script: ScriptId,
    /// The script's `package/version`.
    pub label: String,
    /// The missing topic.
    pub topic: String,
}

/// Directed graph of scripts linked through topics.
///
/// Each script is its own aggregate behind its own lock, so edge updates on
/// different scripts never contend. Cycles are not rejected on write; use
/// [`PipelineGraph::detect_cycles`] to inspect them.
#[derive(Debug, Default)]
pub struct PipelineGraph {
    scripts: DashMap<ScriptId, Arc<RwLock<Script>>>,
    /// Insertion order, for deterministic traversal.
    order: RwLock<Vec<ScriptId>>,
}

impl PipelineGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a script.
    pub fn insert(&self, script: Script) -> ScriptId {
        let id = script.id;
        self.order.write().push(id);
        self.scripts.insert(id, Arc::new(RwLock::new(script)));
        id
    }

    /// Removes a script and its edges.
    pub fn remove(&self, script: ScriptId) -> Option<Script> {
        let (_, handle) = self.scripts.remove(&script)?;
        self.order.write().retain(|id| *id != script);
        let script = handle.read().clone();
        Some(script)
    }

    fn handle(&self, script: ScriptId) -> Result<Arc<RwLock<Script>>, ValidationError> {
        self.scripts
            .get(&script)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ValidationError::unknown(EntityKind::Script, script))
    }

    /// Returns a copy of a script.
    #[must_use]
    pub fn get(&self, script: ScriptId) -> Option<Script> {
        self.handle(script).ok().map(|h| h.read().clone())
    }

    /// Returns true if the script is in the graph.
    #[must_use]
    pub fn contains(&self, script: ScriptId) -> bool {
        self.scripts.contains_key(&script)
    }

    /// Adds a source edge. Returns false if the edge was already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the script is unknown.
    pub fn add_source(&self, script: ScriptId, topic: &str) -> Result<bool, ValidationError> {
        Ok(self.handle(script)?.write().add_source(topic))
    }

    /// Adds a destination edge. Returns false if the edge was already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the script is unknown.
    pub fn add_destination(&self, script: ScriptId, topic: &str) -> Result<bool, ValidationError> {
        Ok(self.handle(script)?.write().add_destination(topic))
    }

    /// Returns the edges of a script.
    ///
    /// # Errors
    ///
    /// Returns an error if the script is unknown.
    pub fn edges_of(&self, script: ScriptId) -> Result<ScriptEdges, ValidationError> {
        let handle = self.handle(script)?;
        let script = handle.read();
        Ok(ScriptEdges {
            sources: script.sources().clone(),
            destinations: script.destinations().clone(),
        })
    }

    /// Topics the script both consumes and produces.
    ///
    /// # Errors
    ///
    /// Returns an error if the script is unknown.
    pub fn self_loops(&self, script: ScriptId) -> Result<Vec<String>, ValidationError> {
        let handle = self.handle(script)?;
        let script = handle.read();
        Ok(script.self_loops().into_iter().map(str::to_string).collect())
    }

    /// Records that a runner reported the script at `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script is unknown.
    pub fn touch(&self, script: ScriptId, at: DateTime<Utc>) -> Result<(), ValidationError> {
        self.handle(script)?.write().touch(at);
        Ok(())
    }

    /// Returns copies of every script, in insertion order.
    #[must_use]
    pub fn scripts(&self) -> Vec<Script> {
        let order = self.order.read().clone();
        order
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Returns the scripts bound to a context.
    #[must_use]
    pub fn scripts_in_context(&self, context: ContextId) -> Vec<Script> {
        self.scripts()
            .into_iter()
            .filter(|s| s.context == context)
            .collect()
    }

    /// Union of every topic referenced as source or destination.
    #[must_use]
    pub fn topics_in_use(&self) -> BTreeSet<String> {
        self.scripts
            .iter()
            .flat_map(|entry| {
                let script = entry.value().read();
                script.topics().map(str::to_string).collect::<Vec<_>>()
            })
            .collect()
    }

    /// Lists references to topics missing from `registry`.
    #[must_use]
    pub fn dangling_references(&self, registry: &TopicRegistry) -> Vec<DanglingReference> {
        self.scripts()
            .into_iter()
            .flat_map(|script| {
                script
                    .topics()
                    .filter(|topic| !registry.contains(topic))
                    .map(|topic| DanglingReference {
                        script: script.id,
                        label: script.label(),
                        topic: topic.to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Reports every cycle reachable through script -> topic -> script edges.
    ///
    /// Read-only diagnostic: never fails and never mutates the graph.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<PipelineCycle> {
        find_cycles(&self.scripts())
    }

    /// Returns the number of scripts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Returns true if the graph has no scripts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_edges_of_orders_retriever() {
        let graph = PipelineGraph::new();
        let script = graph.insert(Script::new("orders_retriever", "3.1.0", ContextId::new()));

        graph.add_source(script, "orders").unwrap();
        graph.add_destination(script, "timeseries").unwrap();
        graph.add_destination(script, "asset_management").unwrap();

        assert_eq!(
            graph.edges_of(script).unwrap(),
            ScriptEdges {
                sources: set(&["orders"]),
                destinations: set(&["timeseries", "asset_management"]),
            }
        );
    }

    #[test]
    fn test_duplicate_edges_are_noops() {
        let graph = PipelineGraph::new();
        let script = graph.insert(Script::new("prepare_order_for_factory", "2.2.1", ContextId::new()));

        assert!(graph.add_source(script, "asset_management").unwrap());
        let once = graph.edges_of(script).unwrap();
        assert!(!graph.add_source(script, "asset_management").unwrap());
        assert_eq!(graph.edges_of(script).unwrap(), once);

        assert!(graph.add_destination(script, "factory").unwrap());
        let once = graph.edges_of(script).unwrap();
        assert!(!graph.add_destination(script, "factory").unwrap());
        assert_eq!(graph.edges_of(script).unwrap(), once);
    }

    #[test]
    fn test_unknown_script() {
        let graph = PipelineGraph::new();
        let err = graph.add_source(ScriptId::new(), "orders").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownEntity { kind: EntityKind::Script, .. }));
    }

    #[test]
    fn test_topics_in_use_unions_all_scripts() {
        let graph = PipelineGraph::new();
        let a = graph.insert(Script::new("a", "1", ContextId::new()));
        let b = graph.insert(Script::new("b", "1", ContextId::new()));
        graph.add_source(a, "orders").unwrap();
        graph.add_destination(a, "timeseries").unwrap();
        graph.add_source(b, "timeseries").unwrap();
        graph.add_destination(b, "errors_log").unwrap();

        assert_eq!(graph.topics_in_use(), set(&["errors_log", "orders", "timeseries"]));
    }

    #[test]
    fn test_remove_script_drops_its_topics() {
        let graph = PipelineGraph::new();
        let a = graph.insert(Script::new("a", "1", ContextId::new()));
        graph.add_destination(a, "errors_log").unwrap();

        let removed = graph.remove(a).unwrap();
        assert_eq!(removed.destinations(), &set(&["errors_log"]));
        assert!(graph.topics_in_use().is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_dangling_references() {
        let registry = TopicRegistry::new();
        registry.register("orders").unwrap();

        let graph = PipelineGraph::new();
        let a = graph.insert(Script::new("a", "1", ContextId::new()));
        graph.add_source(a, "orders").unwrap();
        graph.add_destination(a, "deleted_topic").unwrap();

        let dangling = graph.dangling_references(&registry);
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].topic, "deleted_topic");
        assert_eq!(dangling[0].label, "a/1");
    }

    #[test]
    fn test_scripts_in_context() {
        let graph = PipelineGraph::new();
        let context = ContextId::new();
        graph.insert(Script::new("a", "1", context));
        graph.insert(Script::new("b", "1", ContextId::new()));
        graph.insert(Script::new("c", "1", context));

        let names: Vec<_> = graph
            .scripts_in_context(context)
            .into_iter()
            .map(|s| s.package_name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
