//! Fixtures shared by unit tests, integration tests and benches.

mod fixtures;

pub use fixtures::{unique_topic_name, Bakery, BAKERY_TOPICS};
