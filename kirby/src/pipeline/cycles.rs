//! Cycle detection over script -> topic -> script edges.

use crate::core::ScriptId;
use crate::model::Script;
use serde::{Deserialize, Serialize};
use std::collections::{btree_set, HashMap, HashSet};
use std::fmt;

/// A closed walk through the pipeline.
///
/// `topics[i]` is produced by `scripts[i]` and consumed by
/// `scripts[(i + 1) % len]`. A self-loop is a cycle of one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCycle {
    /// Scripts on the cycle, starting with the one closest to a root.
    pub scripts: Vec<ScriptId>,
    /// `package/version` of each script, aligned with `scripts`.
    pub labels: Vec<String>,
    /// Topics linking consecutive scripts.
    pub topics: Vec<String>,
}

impl PipelineCycle {
    /// Number of scripts on the cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Always false; a cycle has at least one script.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Returns true if the cycle is a script feeding itself.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.scripts.len() == 1
    }

    /// Labels along the cycle, repeating the first at the end.
    #[must_use]
    pub fn path(&self) -> Vec<String> {
        let mut path = self.labels.clone();
        if let Some(first) = self.labels.first() {
            path.push(first.clone());
        }
        path
    }
}

impl fmt::Display for PipelineCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, topic) in self.labels.iter().zip(&self.topics) {
            write!(f, "{label} -[{topic}]-> ")?;
        }
        match self.labels.first() {
            Some(first) => write!(f, "{first}"),
            None => Ok(()),
        }
    }
}

/// A script on the walk stack and the edges still to follow from it.
struct Frame<'a> {
    node: usize,
    topics: btree_set::Iter<'a, String>,
    /// Consumers of the topic taken last.
    consumers: Vec<usize>,
    next: usize,
    /// True while that topic is on the path.
    open: bool,
}

struct Walker<'a> {
    scripts: &'a [Script],
    consumers: HashMap<&'a str, Vec<usize>>,
    visited: HashSet<usize>,
    rec_stack: HashSet<usize>,
    /// Scripts on the current DFS path, with the topic taken out of each.
    path: Vec<(usize, &'a str)>,
    cycles: Vec<PipelineCycle>,
}

impl<'a> Walker<'a> {
    fn new(scripts: &'a [Script]) -> Self {
        let mut consumers: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, script) in scripts.iter().enumerate() {
            for topic in script.sources() {
                consumers.entry(topic.as_str()).or_default().push(index);
            }
        }
        Self {
            scripts,
            consumers,
            visited: HashSet::new(),
            rec_stack: HashSet::new(),
            path: Vec::new(),
            cycles: Vec::new(),
        }
    }

    fn enter(&mut self, node: usize) -> Frame<'a> {
        self.visited.insert(node);
        self.rec_stack.insert(node);
        let scripts: &'a [Script] = self.scripts;
        Frame {
            node,
            topics: scripts[node].destinations().iter(),
            consumers: Vec::new(),
            next: 0,
            open: false,
        }
    }

    /// Depth-first walk from `root` on an explicit stack.
    fn walk(&mut self, root: usize) {
        let mut stack = vec![self.enter(root)];
        while let Some(frame) = stack.last_mut() {
            if let Some(&consumer) = frame.consumers.get(frame.next) {
                frame.next += 1;
                if !self.visited.contains(&consumer) {
                    stack.push(self.enter(consumer));
                } else if self.rec_stack.contains(&consumer) {
                    self.record(consumer);
                }
                continue;
            }

            if frame.open {
                self.path.pop();
                frame.open = false;
            }
            if let Some(topic) = frame.topics.next() {
                let topic = topic.as_str();
                self.path.push((frame.node, topic));
                frame.consumers = self.consumers.get(topic).cloned().unwrap_or_default();
                frame.next = 0;
                frame.open = true;
            } else {
                self.rec_stack.remove(&frame.node);
                stack.pop();
            }
        }
    }

    /// Records the back edge closing on `target`, which is on the path.
    fn record(&mut self, target: usize) {
        let Some(start) = self.path.iter().position(|(n, _)| *n == target) else {
            return;
        };
        let steps = &self.path[start..];
        self.cycles.push(PipelineCycle {
            scripts: steps.iter().map(|(n, _)| self.scripts[*n].id).collect(),
            labels: steps.iter().map(|(n, _)| self.scripts[*n].label()).collect(),
            topics: steps.iter().map(|(_, t)| (*t).to_string()).collect(),
        });
    }
}

/// Finds every back edge reachable from any script, in script order.
pub(crate) fn find_cycles(scripts: &[Script]) -> Vec<PipelineCycle> {
    let mut walker = Walker::new(scripts);
    for index in 0..scripts.len() {
        if !walker.visited.contains(&index) {
            walker.walk(index);
        }
    }
    walker.cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ContextId;
    use pretty_assertions::assert_eq;

    fn script(name: &str, sources: &[&str], destinations: &[&str]) -> Script {
        let mut script = Script::new(name, "1", ContextId::new());
        for topic in sources {
            script.add_source(*topic);
        }
        for topic in destinations {
            script.add_destination(*topic);
        }
        script
    }

    #[test]
    fn test_acyclic_bakery_pipeline() {
        let scripts = vec![
            script("orders_retriever", &["orders"], &["timeseries", "asset_management"]),
            script("prepare_order_for_factory", &["asset_management"], &["factory"]),
            script("abort_all", &[], &["errors_log"]),
        ];
        assert!(find_cycles(&scripts).is_empty());
    }

    #[test]
    fn test_two_script_cycle() {
        let scripts = vec![
            script("a", &["y"], &["x"]),
            script("b", &["x"], &["y"]),
        ];
        let cycles = find_cycles(&scripts);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].labels, vec!["a/1", "b/1"]);
        assert_eq!(cycles[0].topics, vec!["x", "y"]);
        assert_eq!(cycles[0].to_string(), "a/1 -[x]-> b/1 -[y]-> a/1");
        assert_eq!(cycles[0].path(), vec!["a/1", "b/1", "a/1"]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let scripts = vec![script("looper", &["a"], &["a"])];
        let cycles = find_cycles(&scripts);

        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].is_self_loop());
        assert_eq!(cycles[0].topics, vec!["a"]);
    }

    #[test]
    fn test_reports_independent_cycles() {
        let scripts = vec![
            script("a", &["y"], &["x"]),
            script("b", &["x"], &["y"]),
            script("c", &["z"], &["z"]),
            script("d", &["orders"], &["timeseries"]),
        ];
        let cycles = find_cycles(&scripts);
        assert_eq!(cycles.len(), 2);
        assert!(cycles.iter().any(PipelineCycle::is_self_loop));
    }

    #[test]
    fn test_long_chain_does_not_exhaust_stack() {
        let length = 100_000;
        let scripts: Vec<Script> = (0..length)
            .map(|i| {
                let source = format!("t{i}");
                let next = format!("t{}", (i + 1) % length);
                script(&format!("step{i}"), &[source.as_str()], &[next.as_str()])
            })
            .collect();
        let cycles = find_cycles(&scripts);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), length);
        assert_eq!(cycles[0].topics[0], "t1");
    }

    #[test]
    fn test_cycle_through_shared_topic() {
        let scripts = vec![
            script("a", &["back"], &["fan"]),
            script("b", &["fan"], &[]),
            script("c", &["fan"], &["back"]),
        ];
        let cycles = find_cycles(&scripts);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].labels, vec!["a/1", "c/1"]);
    }
}
