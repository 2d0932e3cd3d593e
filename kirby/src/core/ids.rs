//! Strongly typed identifiers for catalog entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh time-ordered identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wraps an existing UUID, e.g. one handed back by the store.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

entity_id!(
    /// Identifies an [`Environment`](crate::model::Environment).
    EnvironmentId
);
entity_id!(
    /// Identifies a [`Job`](crate::model::Job).
    JobId
);
entity_id!(
    /// Identifies a [`Context`](crate::model::Context).
    ContextId
);
entity_id!(
    /// Identifies a [`Script`](crate::model::Script).
    ScriptId
);
entity_id!(
    /// Identifies a [`Notification`](crate::model::Notification).
    NotificationId
);
entity_id!(
    /// Identifies a [`NotificationGroup`](crate::notifications::NotificationGroup).
    NotificationGroupId
);
