//! The pipeline graph: scripts linked through the topics they consume and
//! produce.
//!
//! Edges are added one at a time and are idempotent. Cycles are allowed on
//! write and surfaced by [`PipelineGraph::detect_cycles`].

mod cycles;
mod graph;

pub use cycles::PipelineCycle;
pub use graph::{DanglingReference, PipelineGraph, ScriptEdges};
