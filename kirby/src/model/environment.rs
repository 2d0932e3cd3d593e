//! Deployment environments.

use crate::core::EnvironmentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named deployment target such as "production".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Identifier.
    pub id: EnvironmentId,
    /// Unique name.
    pub name: String,
}

impl Environment {
    /// Creates a new environment.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EnvironmentId::new(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
