//! Broker topic provisioning.
//!
//! [`TopicProvisioner`] drives an [`AdminClient`] through an idempotent
//! delete-then-create protocol, retrying transient failures with
//! [`with_retry`]. [`InMemoryBroker`] stands in for a real cluster in tests
//! and local runs.

mod client;
mod config;
mod ephemeral;
mod integration_tests;
mod memory;
mod provisioner;
mod retry;

pub use client::{Ack, AdminClient, MessageClient, NewTopic};
pub use config::{
    BrokerConfig, BrokerSettings, TlsFiles, KAFKA_BOOTSTRAP_SERVERS, KAFKA_PARTITIONS,
    KAFKA_REPLICATION_FACTOR, KAFKA_SSL_CAFILE, KAFKA_SSL_CERTFILE, KAFKA_SSL_KEYFILE,
    KAFKA_TIMEOUT_MS, KAFKA_USE_TLS,
};
pub use ephemeral::{TopicHandle, CLEANUP_TIMEOUT};
pub use memory::InMemoryBroker;
pub use provisioner::{ProvisionOutcome, TopicCheck, TopicProvisioner, TopicSpec};
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryError, RetryState};
