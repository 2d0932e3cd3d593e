//! Persistence boundary for catalog mutations.

use crate::core::EntityKind;
use crate::errors::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A validated catalog mutation handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    /// A new entity.
    Created {
        /// Entity kind.
        kind: EntityKind,
        /// Identifier (a name for topics and config keys).
        id: String,
        /// Display name, used for unique constraints.
        name: String,
    },
    /// An existing entity gained or lost a child, edge or field.
    Updated {
        /// Entity kind.
        kind: EntityKind,
        /// Identifier.
        id: String,
    },
    /// A removed entity.
    Deleted {
        /// Entity kind.
        kind: EntityKind,
        /// Identifier.
        id: String,
    },
}

impl Change {
    /// Returns the entity kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Created { kind, .. } | Self::Updated { kind, .. } | Self::Deleted { kind, .. } => *kind,
        }
    }
}

/// Stores catalog changes.
///
/// The catalog calls [`EntityStore::persist`] once a mutation passed
/// validation and before committing it in memory; an error leaves the
/// catalog untouched.
pub trait EntityStore: Send + Sync {
    /// Persists one change.
    fn persist(&self, change: &Change) -> Result<(), StoreError>;
}

/// Accepts and forgets every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStore;

impl EntityStore for NoOpStore {
    fn persist(&self, _change: &Change) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Records changes in memory and replays scripted failures.
#[derive(Debug, Default)]
pub struct RecordingStore {
    changes: Mutex<Vec<Change>>,
    failures: Mutex<VecDeque<StoreError>>,
}

impl RecordingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `persist` call fail with `error`. Failures queue up.
    pub fn fail_next(&self, error: StoreError) {
        self.failures.lock().push_back(error);
    }

    /// Returns accepted changes in order.
    #[must_use]
    pub fn changes(&self) -> Vec<Change> {
        self.changes.lock().clone()
    }

    /// Returns the number of accepted changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.lock().len()
    }

    /// Returns true if no change was accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.lock().is_empty()
    }
}

impl EntityStore for RecordingStore {
    fn persist(&self, change: &Change) -> Result<(), StoreError> {
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        self.changes.lock().push(change.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_store_replays_failures_once() {
        let store = RecordingStore::new();
        let change = Change::Created {
            kind: EntityKind::Job,
            id: "1".to_string(),
            name: "Fetch Orders".to_string(),
        };

        store.fail_next(StoreError::Backend("disk full".to_string()));
        assert!(store.persist(&change).is_err());
        assert!(store.is_empty());

        store.persist(&change).unwrap();
        assert_eq!(store.changes(), vec![change]);
        assert_eq!(store.changes()[0].kind(), EntityKind::Job);
    }
}
