//! Job type, escalation event and other small enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a job is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Runs on the recurrence rules of its contexts' schedules.
    Scheduled,
    /// Runs when an external event fires; never carries schedules.
    Triggered,
}

impl JobType {
    /// Returns true if jobs of this type may own schedules.
    #[must_use]
    pub const fn accepts_schedules(self) -> bool {
        matches!(self, Self::Scheduled)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Triggered => write!(f, "triggered"),
        }
    }
}

/// Failure class routed through the escalation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationEvent {
    /// A script run failed and will be retried.
    Retry,
    /// A script run failed terminally.
    Failure,
}

impl fmt::Display for EscalationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Owner level of a configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    /// Applies to every context.
    Global,
    /// Applies to every context of one job.
    Job,
    /// Applies to a single context.
    Context,
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Job => write!(f, "job"),
            Self::Context => write!(f, "context"),
        }
    }
}

/// Entity kinds named in validation errors and store records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Deployment environment.
    Environment,
    /// Job.
    Job,
    /// Job/environment binding.
    Context,
    /// Recurrence rule.
    Schedule,
    /// Deployable script.
    Script,
    /// Broker topic.
    Topic,
    /// Notification attached to a job.
    Notification,
    /// Named recipient group.
    NotificationGroup,
    /// Configuration key.
    ConfigKey,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Environment => "environment",
            Self::Job => "job",
            Self::Context => "context",
            Self::Schedule => "schedule",
            Self::Script => "script",
            Self::Topic => "topic",
            Self::Notification => "notification",
            Self::NotificationGroup => "notification group",
            Self::ConfigKey => "config key",
        };
        f.write_str(name)
    }
}

/// Administrative broker call, used to label retries and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOperation {
    /// Opening the admin client.
    Connect,
    /// Listing topics.
    List,
    /// Creating a topic.
    Create,
    /// Deleting a topic.
    Delete,
}

impl fmt::Display for BrokerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::List => write!(f, "list"),
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
        }
    }
}
