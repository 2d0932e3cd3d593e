//! # Kirby
//!
//! Core of a data-pipeline coordinator: which scripts read and write which
//! broker topics, which jobs own them, who hears about failures, and how
//! topics are provisioned on the broker.
//!
//! - **Catalog**: environments, jobs, contexts, schedules and notification
//!   groups, with the invariants that span them
//! - **Pipeline graph**: scripts linked through topics, with cycle and
//!   dangling-reference diagnostics
//! - **Escalation**: which notification groups fire on a retry or a failure
//! - **Provisioning**: idempotent create/delete of broker topics with
//!   retries, cancellation and scoped ephemeral topics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kirby::prelude::*;
//!
//! let catalog = Catalog::new();
//! let job = catalog.create_job("Fetch Orders", JobType::Scheduled)?;
//! let admin = catalog.create_group("Admin", ["admin@example.com"])?;
//! catalog.add_notification(job, Notification::new([admin]).on_retry(true))?;
//!
//! let escalation = catalog.escalate(job, EscalationEvent::Retry)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod broker;
pub mod cancellation;
pub mod catalog;
pub mod core;
pub mod errors;
pub mod events;
pub mod logging;
pub mod model;
pub mod notifications;
pub mod pipeline;
pub mod testing;
pub mod topics;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::broker::{
        BrokerConfig, BrokerSettings, InMemoryBroker, ProvisionOutcome, RetryConfig,
        TopicHandle, TopicProvisioner, TopicSpec,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::catalog::{Catalog, EntityStore};
    pub use crate::core::{
        ContextId, EnvironmentId, EscalationEvent, JobId, JobType, NotificationGroupId,
        ProvisionState, ScriptId,
    };
    pub use crate::errors::{
        BrokerError, ConfigError, KirbyError, ProvisioningError, ValidationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::model::{Context, CronField, Job, Notification, Schedule, Script};
    pub use crate::notifications::{Escalation, Escalator, NotificationGroup, NotificationTransport};
    pub use crate::pipeline::{PipelineCycle, PipelineGraph};
    pub use crate::topics::{Topic, TopicRegistry};
}

#[cfg(test)]
mod tests {
    #[test]
    fn library_compiles() {
        assert!(true);
    }
}
