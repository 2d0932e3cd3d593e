//! Topic registry: the authoritative set of named broker channels.

mod registry;

pub use registry::{validate_topic_name, Topic, TopicRegistry, MAX_TOPIC_NAME_LEN};
