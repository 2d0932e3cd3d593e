//! Job/environment bindings.

use super::{ConfigMap, Schedule};
use crate::core::{ConfigScope, ContextId, EnvironmentId, JobId};
use serde::{Deserialize, Serialize};

/// Binds one job to one environment, optionally with schedules.
///
/// The same (job, environment) pair may appear in several contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Identifier.
    pub id: ContextId,
    /// Owning job.
    pub job: JobId,
    /// Target environment.
    pub environment: EnvironmentId,
    pub(crate) schedules: Vec<Schedule>,
    pub(crate) config: ConfigMap,
}

impl Context {
    pub(crate) fn new(job: JobId, environment: EnvironmentId) -> Self {
        Self {
            id: ContextId::new(),
            job,
            environment,
            schedules: Vec::new(),
            config: ConfigMap::new(ConfigScope::Context),
        }
    }

    /// Returns the owned schedules.
    #[must_use]
    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    /// Looks up an owned schedule by name.
    #[must_use]
    pub fn schedule(&self, name: &str) -> Option<&Schedule> {
        self.schedules.iter().find(|s| s.name == name)
    }

    pub(crate) fn schedule_mut(&mut self, name: &str) -> Option<&mut Schedule> {
        self.schedules.iter_mut().find(|s| s.name == name)
    }

    /// Returns the context-scoped configuration.
    #[must_use]
    pub const fn config(&self) -> &ConfigMap {
        &self.config
    }
}
