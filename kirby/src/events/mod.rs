//! Domain events for observability.
//!
//! Provisioning state transitions and escalation hand-offs are reported
//! through an [`EventSink`] in addition to `tracing`.

mod sink;

pub use sink::{
    CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, ESCALATION_DISPATCHED,
    TOPIC_ABSENT, TOPIC_FAILED, TOPIC_READY, TOPIC_STATE,
};
