//! Catalog entities: environments, jobs, contexts, schedules, scripts.
//!
//! The types here enforce the invariants that are local to one aggregate
//! (a job and everything it owns, or a script). Invariants spanning
//! aggregates live in [`crate::catalog`].

mod config;
mod context;
mod environment;
mod job;
mod notification;
mod schedule;
mod script;

pub use config::{resolve_variables, ConfigKey, ConfigMap};
pub use context::Context;
pub use environment::Environment;
pub use job::Job;
pub use notification::Notification;
pub use schedule::{CronField, Schedule, Suspension};
pub use script::Script;
