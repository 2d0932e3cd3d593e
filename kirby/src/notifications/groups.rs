//! Notification groups and their e-mail lists.

use crate::core::NotificationGroupId;
use serde::{Deserialize, Serialize};

/// One address owned by exactly one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEmail {
    /// The address.
    pub email: String,
}

/// A named, reusable list of recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationGroup {
    /// Identifier.
    pub id: NotificationGroupId,
    /// Unique name.
    pub name: String,
    emails: Vec<NotificationEmail>,
}

impl NotificationGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NotificationGroupId::new(),
            name: name.into(),
            emails: Vec::new(),
        }
    }

    /// Adds an address. Returns false if the group already had it.
    pub fn add_email(&mut self, email: impl Into<String>) -> bool {
        let email = email.into();
        if self.emails.iter().any(|e| e.email == email) {
            return false;
        }
        self.emails.push(NotificationEmail { email });
        true
    }

    /// Builder form of [`Self::add_email`].
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.add_email(email);
        self
    }

    /// Removes an address. Returns false if it was not in the group.
    pub fn remove_email(&mut self, email: &str) -> bool {
        let before = self.emails.len();
        self.emails.retain(|e| e.email != email);
        self.emails.len() != before
    }

    /// Returns the addresses in insertion order.
    #[must_use]
    pub fn emails(&self) -> &[NotificationEmail] {
        &self.emails
    }
}
