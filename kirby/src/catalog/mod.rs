//! The catalog: administrative calls over every entity, enforcing the
//! invariants that span aggregates, plus the persistence boundary.

#[allow(clippy::module_inception)]
mod catalog;
mod store;

pub use catalog::Catalog;
pub use store::{Change, EntityStore, NoOpStore, RecordingStore};
