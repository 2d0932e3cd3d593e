//! Notifications attached to jobs.

use crate::core::{EscalationEvent, NotificationGroupId, NotificationId};
use serde::{Deserialize, Serialize};

/// Routes one flag combination of a job to a list of groups.
///
/// A job may carry several notifications, e.g. admins on retries and
/// failures, producers only on failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Identifier.
    pub id: NotificationId,
    /// Fire when a run will be retried.
    pub on_retry: bool,
    /// Fire when a run failed terminally.
    pub on_failure: bool,
    /// Target groups, in attachment order.
    pub groups: Vec<NotificationGroupId>,
}

impl Notification {
    /// Creates a failure-only notification for the given groups.
    #[must_use]
    pub fn new(groups: impl IntoIterator<Item = NotificationGroupId>) -> Self {
        Self {
            id: NotificationId::new(),
            on_retry: false,
            on_failure: true,
            groups: groups.into_iter().collect(),
        }
    }

    /// Sets the retry flag.
    #[must_use]
    pub const fn on_retry(mut self, enabled: bool) -> Self {
        self.on_retry = enabled;
        self
    }

    /// Sets the failure flag.
    #[must_use]
    pub const fn on_failure(mut self, enabled: bool) -> Self {
        self.on_failure = enabled;
        self
    }

    /// Returns true if this notification fires for `event`.
    #[must_use]
    pub const fn fires_on(&self, event: EscalationEvent) -> bool {
        match event {
            EscalationEvent::Retry => self.on_retry,
            EscalationEvent::Failure => self.on_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_failure_only() {
        let notification = Notification::new([NotificationGroupId::new()]);
        assert!(!notification.fires_on(EscalationEvent::Retry));
        assert!(notification.fires_on(EscalationEvent::Failure));
    }

    #[test]
    fn test_flags_are_independent() {
        let notification = Notification::new(Vec::new()).on_retry(true).on_failure(false);
        assert!(notification.fires_on(EscalationEvent::Retry));
        assert!(!notification.fires_on(EscalationEvent::Failure));
    }
}
