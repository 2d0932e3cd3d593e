//! Core domain vocabulary shared by every kirby component.
//!
//! This module contains:
//! - Typed entity identifiers
//! - Job type, escalation event and configuration scope enums
//! - The topic provisioning state machine

mod ids;
mod kinds;
mod state;

pub use ids::{
    ContextId, EnvironmentId, JobId, NotificationGroupId, NotificationId, ScriptId,
};
pub use kinds::{BrokerOperation, ConfigScope, EntityKind, EscalationEvent, JobType};
pub use state::ProvisionState;
