//! Broker client boundary.
//!
//! The provisioner only needs the admin surface; [`MessageClient`] exists so
//! tests can check a provisioned topic actually carries messages.

use crate::errors::BrokerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A topic creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    /// Topic name.
    pub name: String,
    /// Partition count.
    pub partitions: u32,
    /// Replication factor.
    pub replication_factor: u16,
}

impl NewTopic {
    /// Creates a request.
    #[must_use]
    pub fn new(name: impl Into<String>, partitions: u32, replication_factor: u16) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor,
        }
    }
}

/// Broker acknowledgement of a produced message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Topic written to.
    pub topic: String,
    /// Offset assigned to the message.
    pub offset: u64,
}

/// Administrative broker calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Lists topic names.
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError>;

    /// Creates topics, waiting at most `timeout` for the broker to confirm.
    async fn create_topics(&self, topics: &[NewTopic], timeout: Duration) -> Result<(), BrokerError>;

    /// Deletes topics. Fails with [`BrokerError::UnknownTopic`] if one is missing.
    async fn delete_topics(&self, topics: &[String]) -> Result<(), BrokerError>;

    /// Releases the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Produce/consume calls.
#[async_trait]
pub trait MessageClient: Send + Sync {
    /// Appends a message.
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<Ack, BrokerError>;

    /// Waits up to `timeout` for the next unread message.
    async fn next_message(&self, topic: &str, timeout: Duration) -> Result<Option<Vec<u8>>, BrokerError>;
}
