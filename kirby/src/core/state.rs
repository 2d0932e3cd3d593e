//! Topic provisioning state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of one topic-provisioning attempt.
///
/// ```text
/// PENDING -> ATTEMPTING_DELETE -> (DELETED | ABSENT_OK) -> ATTEMPTING_CREATE -> READY
///                  \                                              \
///                   +------------------> FAILED <-----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    /// Nothing has been sent to the broker yet.
    #[default]
    Pending,
    /// A delete call is in flight (possibly being retried).
    AttemptingDelete,
    /// The broker deleted the topic.
    Deleted,
    /// The broker reported the topic did not exist; the goal already held.
    AbsentOk,
    /// A create call is in flight (possibly being retried).
    AttemptingCreate,
    /// The topic exists and is empty.
    Ready,
    /// Retries were exhausted or the broker returned a fatal error.
    Failed,
}

impl ProvisionState {
    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::AttemptingDelete)
                | (
                    Self::AttemptingDelete,
                    Self::Deleted | Self::AbsentOk | Self::Failed
                )
                | (Self::Deleted | Self::AbsentOk, Self::AttemptingCreate)
                | (Self::AttemptingCreate, Self::Ready | Self::Failed)
        )
    }

    /// Returns true if the topic is known to be absent.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::Deleted | Self::AbsentOk)
    }

    /// Returns true while a broker call is in flight.
    #[must_use]
    pub const fn is_attempting(self) -> bool {
        matches!(self, Self::AttemptingDelete | Self::AttemptingCreate)
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::AttemptingDelete => write!(f, "attempting_delete"),
            Self::Deleted => write!(f, "deleted"),
            Self::AbsentOk => write!(f, "absent_ok"),
            Self::AttemptingCreate => write!(f, "attempting_create"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
