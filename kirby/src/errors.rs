//! Error types for kirby.
//!
//! Administrative calls fail fast with a [`ValidationError`]. Broker clients
//! report [`BrokerError`]s, which the provisioner either retries, swallows
//! (unknown topic on delete) or turns into a [`ProvisioningError`].

use crate::core::{BrokerOperation, ContextId, EntityKind, JobType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for kirby operations.
#[derive(Debug, Error)]
pub enum KirbyError {
    /// An invariant was violated by an administrative call.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A provisioning call failed.
    #[error("{0}")]
    Provisioning(#[from] ProvisioningError),

    /// The broker configuration is malformed.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Handing an escalation to the transport failed.
    #[error("{0}")]
    Delivery(#[from] DeliveryError),

    /// The storage collaborator failed for a reason other than a duplicate.
    #[error("Storage error: {0}")]
    Store(String),
}

impl From<StoreError> for KirbyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { kind, name } => {
                Self::Validation(ValidationError::DuplicateName { kind, name })
            }
            StoreError::Backend(reason) => Self::Store(reason),
        }
    }
}

/// Invariant violation detected at write time. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A uniquely named entity already exists.
    #[error("A {kind} named '{name}' already exists")]
    DuplicateName {
        /// The entity kind.
        kind: EntityKind,
        /// The clashing name.
        name: String,
    },

    /// Schedules were attached to a job that cannot carry them.
    #[error("Job '{job}' is {job_type}; only scheduled jobs may carry schedules")]
    InvalidType {
        /// The job name.
        job: String,
        /// The job's (immutable) type.
        job_type: JobType,
    },

    /// A context still has scripts bound to it.
    #[error("Context {context} is still used by scripts: {}", scripts.join(", "))]
    ContextInUse {
        /// The context being removed.
        context: ContextId,
        /// Scripts bound to it, as `package/version`.
        scripts: Vec<String>,
    },

    /// A referenced entity does not exist.
    #[error("Unknown {kind}: {id}")]
    UnknownEntity {
        /// The entity kind.
        kind: EntityKind,
        /// The identifier or name that failed to resolve.
        id: String,
    },

    /// A topic is not present in the registry.
    #[error("Unknown topic: {name}")]
    UnknownTopic {
        /// The topic name.
        name: String,
    },

    /// A topic name is not accepted by the broker.
    #[error("Invalid topic name '{name}': {reason}")]
    InvalidTopicName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A schedule field is not a valid cron expression.
    #[error("The schedule cannot accept the value '{value}' given in the {field} attribute")]
    InvalidSchedule {
        /// The cron field (minute, hour, ...).
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A suspension window is empty or inverted.
    #[error("Invalid suspension: {reason}")]
    InvalidSuspension {
        /// Why it was rejected.
        reason: String,
    },

    /// A script consumes and produces the same topic.
    #[error("Script '{script}' uses topic '{topic}' as both source and destination")]
    SelfLoop {
        /// The script, as `package/version`.
        script: String,
        /// The looping topic.
        topic: String,
    },
}

impl ValidationError {
    /// Returns a stable machine-readable code for the error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateName { .. } => "duplicate_name",
            Self::InvalidType { .. } => "invalid_type",
            Self::ContextInUse { .. } => "context_in_use",
            Self::UnknownEntity { .. } => "unknown_entity",
            Self::UnknownTopic { .. } => "unknown_topic",
            Self::InvalidTopicName { .. } => "invalid_topic_name",
            Self::InvalidSchedule { .. } => "invalid_schedule",
            Self::InvalidSuspension { .. } => "invalid_suspension",
            Self::SelfLoop { .. } => "self_loop",
        }
    }

    /// Shorthand for an unknown entity error.
    #[must_use]
    pub fn unknown(kind: EntityKind, id: impl ToString) -> Self {
        Self::UnknownEntity {
            kind,
            id: id.to_string(),
        }
    }

    /// Converts to a dictionary representation for the front-end.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Error reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BrokerError {
    /// The topic (or one of its partitions) does not exist.
    #[error("Unknown topic or partition: {topic}")]
    UnknownTopic {
        /// The topic name.
        topic: String,
    },

    /// The topic already exists.
    #[error("Topic already exists: {topic}")]
    AlreadyExists {
        /// The topic name.
        topic: String,
    },

    /// The broker is up but not ready (e.g. metadata still propagating).
    #[error("Broker not ready: {0}")]
    NotReady(String),

    /// Network failure or request timeout.
    #[error("Transient broker failure: {0}")]
    Transient(String),

    /// Authentication or authorization failure.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Any other broker-side error.
    #[error("Broker error: {0}")]
    Other(String),
}

impl BrokerError {
    /// Returns true if the call may succeed when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::Transient(_))
    }

    /// Returns true if the error says the topic does not exist.
    #[must_use]
    pub const fn is_unknown_topic(&self) -> bool {
        matches!(self, Self::UnknownTopic { .. })
    }
}

/// Error surfaced by the topic provisioner.
#[derive(Debug, Clone, Error)]
pub enum ProvisioningError {
    /// Create found the topic already there. The caller must delete first.
    #[error("Topic '{topic}' already exists")]
    AlreadyExists {
        /// The topic name.
        topic: String,
    },

    /// The broker refused the credentials. Fatal.
    #[error("Not authorized to {operation} topic '{topic}': {reason}")]
    Unauthorized {
        /// The topic name.
        topic: String,
        /// The refused operation.
        operation: BrokerOperation,
        /// The broker's message.
        reason: String,
    },

    /// The retry budget ran out.
    #[error("Gave up on {operation} of topic '{topic}' after {attempts} attempts: {last_cause}")]
    Timeout {
        /// The topic name.
        topic: String,
        /// The operation being retried.
        operation: BrokerOperation,
        /// Total attempts made, equal to the configured maximum.
        attempts: usize,
        /// The error returned by the final attempt.
        #[source]
        last_cause: BrokerError,
    },

    /// The caller cancelled while the call was in flight.
    #[error("Provisioning of topic '{topic}' cancelled after {attempts} attempts")]
    Cancelled {
        /// The topic name.
        topic: String,
        /// Attempts made before cancellation was observed.
        attempts: usize,
    },

    /// The admin client could not be opened.
    #[error("Broker at {endpoints} unreachable after {attempts} attempts: {cause}")]
    Unreachable {
        /// Comma-separated bootstrap endpoints.
        endpoints: String,
        /// Connection attempts made.
        attempts: usize,
        /// The error returned by the final attempt.
        #[source]
        cause: BrokerError,
    },

    /// The broker returned a non-retryable error.
    #[error("Broker rejected {operation} of topic '{topic}': {cause}")]
    Broker {
        /// The topic name.
        topic: String,
        /// The rejected operation.
        operation: BrokerOperation,
        /// The broker error.
        #[source]
        cause: BrokerError,
    },
}

impl ProvisioningError {
    /// Returns the topic the error is about, if any.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::AlreadyExists { topic }
            | Self::Unauthorized { topic, .. }
            | Self::Timeout { topic, .. }
            | Self::Cancelled { topic, .. }
            | Self::Broker { topic, .. } => Some(topic),
            Self::Unreachable { .. } => None,
        }
    }

    /// Returns true if the error came from cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Error raised while reading broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// TLS is enabled but a certificate path is missing.
    #[error("{var} must be set when KAFKA_USE_TLS is enabled")]
    MissingTlsFile {
        /// The missing variable.
        var: &'static str,
    },

    /// A variable could not be parsed.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue {
        /// The variable name.
        var: &'static str,
        /// The raw value.
        value: String,
    },

    /// The settings are inconsistent.
    #[error("Invalid broker configuration: {0}")]
    Invalid(String),
}

/// Error raised by a notification transport.
#[derive(Debug, Clone, Error)]
#[error("Notification delivery failed for job '{job}': {reason}")]
pub struct DeliveryError {
    /// The job whose escalation failed.
    pub job: String,
    /// The transport's message.
    pub reason: String,
}

impl DeliveryError {
    /// Creates a new delivery error.
    #[must_use]
    pub fn new(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A unique constraint was violated.
    #[error("A {kind} named '{name}' violates a unique constraint")]
    Duplicate {
        /// The entity kind.
        kind: EntityKind,
        /// The clashing name.
        name: String,
    },

    /// Any other storage failure.
    #[error("{0}")]
    Backend(String),
}
