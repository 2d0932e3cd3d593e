//! The job aggregate: a job with its contexts, schedules and notifications.

use super::{ConfigMap, Context, Notification, Schedule, Suspension};
use crate::core::{
    ConfigScope, ContextId, EntityKind, EnvironmentId, JobId, JobType, NotificationGroupId,
    NotificationId,
};
use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A named unit of recurring or event-triggered work.
///
/// The job type is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier.
    pub id: JobId,
    /// Unique name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    job_type: JobType,
    contexts: Vec<Context>,
    notifications: Vec<Notification>,
    config: ConfigMap,
}

impl Job {
    /// Creates a job with no contexts or notifications.
    #[must_use]
    pub fn new(name: impl Into<String>, job_type: JobType) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            description: None,
            job_type,
            contexts: Vec::new(),
            notifications: Vec::new(),
            config: ConfigMap::new(ConfigScope::Job),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the job type.
    #[must_use]
    pub const fn job_type(&self) -> JobType {
        self.job_type
    }

    fn require_schedulable(&self) -> Result<(), ValidationError> {
        if self.job_type.accepts_schedules() {
            Ok(())
        } else {
            Err(ValidationError::InvalidType {
                job: self.name.clone(),
                job_type: self.job_type,
            })
        }
    }

    fn check_schedule_name(&self, name: &str) -> Result<(), ValidationError> {
        if self.schedule_names().any(|n| n == name) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::Schedule,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Binds the job to an environment.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidType`] if schedules are given to a
    /// job that is not scheduled, or [`ValidationError::DuplicateName`] if a
    /// schedule name repeats.
    pub fn attach_context(
        &mut self,
        environment: EnvironmentId,
        schedules: Vec<Schedule>,
    ) -> Result<ContextId, ValidationError> {
        if !schedules.is_empty() {
            self.require_schedulable()?;
        }

        let mut seen = HashSet::new();
        for schedule in &schedules {
            self.check_schedule_name(&schedule.name)?;
            if !seen.insert(schedule.name.as_str()) {
                return Err(ValidationError::DuplicateName {
                    kind: EntityKind::Schedule,
                    name: schedule.name.clone(),
                });
            }
        }

        let mut context = Context::new(self.id, environment);
        context.schedules = schedules;
        let id = context.id;
        self.contexts.push(context);
        Ok(id)
    }

    /// Adds a schedule to one of the job's contexts.
    ///
    /// # Errors
    ///
    /// Same rules as [`Job::attach_context`], plus an unknown-context error.
    pub fn add_schedule(&mut self, context: ContextId, schedule: Schedule) -> Result<(), ValidationError> {
        self.require_schedulable()?;
        self.check_schedule_name(&schedule.name)?;
        self.context_mut(context)?.schedules.push(schedule);
        Ok(())
    }

    /// Adds a suspension window to a schedule of one of the job's contexts.
    ///
    /// # Errors
    ///
    /// Returns an error if the context or schedule does not exist.
    pub fn add_suspension(
        &mut self,
        context: ContextId,
        schedule: &str,
        suspension: Suspension,
    ) -> Result<(), ValidationError> {
        self.context_mut(context)?
            .schedule_mut(schedule)
            .ok_or_else(|| ValidationError::unknown(EntityKind::Schedule, schedule))?
            .add_suspension(suspension);
        Ok(())
    }

    /// Removes a context together with its schedules.
    ///
    /// # Errors
    ///
    /// Returns an error if the context does not belong to this job.
    pub fn remove_context(&mut self, context: ContextId) -> Result<Context, ValidationError> {
        let index = self
            .contexts
            .iter()
            .position(|c| c.id == context)
            .ok_or_else(|| ValidationError::unknown(EntityKind::Context, context))?;
        Ok(self.contexts.remove(index))
    }

    /// Looks up a context.
    #[must_use]
    pub fn context(&self, context: ContextId) -> Option<&Context> {
        self.contexts.iter().find(|c| c.id == context)
    }

    pub(crate) fn context_mut(&mut self, context: ContextId) -> Result<&mut Context, ValidationError> {
        self.contexts
            .iter_mut()
            .find(|c| c.id == context)
            .ok_or_else(|| ValidationError::unknown(EntityKind::Context, context))
    }

    /// Returns the contexts in attachment order.
    #[must_use]
    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    /// Iterates over the names of every schedule the job owns.
    pub fn schedule_names(&self) -> impl Iterator<Item = &str> {
        self.contexts
            .iter()
            .flat_map(|c| c.schedules.iter().map(|s| s.name.as_str()))
    }

    /// Attaches a notification, keeping attachment order.
    pub fn add_notification(&mut self, notification: Notification) -> NotificationId {
        let id = notification.id;
        self.notifications.push(notification);
        id
    }

    /// Attaches a single-group notification.
    pub fn notify(
        &mut self,
        group: NotificationGroupId,
        on_retry: bool,
        on_failure: bool,
    ) -> NotificationId {
        self.add_notification(
            Notification::new([group])
                .on_retry(on_retry)
                .on_failure(on_failure),
        )
    }

    /// Detaches a notification.
    pub fn remove_notification(&mut self, notification: NotificationId) -> Option<Notification> {
        let index = self.notifications.iter().position(|n| n.id == notification)?;
        Some(self.notifications.remove(index))
    }

    /// Returns the notifications in attachment order.
    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Returns the job-scoped configuration.
    #[must_use]
    pub const fn config(&self) -> &ConfigMap {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut ConfigMap {
        &mut self.config
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.job_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CronField;

    fn every_minute() -> Schedule {
        Schedule::new("Every minute")
    }

    #[test]
    fn test_job_display() {
        let job = Job::new("Fetch Orders", JobType::Scheduled);
        assert_eq!(job.to_string(), "Fetch Orders (scheduled)");
    }

    #[test]
    fn test_scheduled_job_accepts_schedules() {
        let mut job = Job::new("Fetch Orders", JobType::Scheduled);
        let env = EnvironmentId::new();
        let context = job.attach_context(env, vec![every_minute()]).unwrap();

        let ctx = job.context(context).unwrap();
        assert_eq!(ctx.environment, env);
        assert_eq!(ctx.job, job.id);
        assert_eq!(ctx.schedules()[0].name, "Every minute");
    }

    #[test]
    fn test_triggered_job_rejects_schedules() {
        let mut job = Job::new("Collect Register", JobType::Triggered);
        let err = job
            .attach_context(EnvironmentId::new(), vec![every_minute()])
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidType { job_type: JobType::Triggered, .. }));
        assert!(job.contexts().is_empty());

        let context = job.attach_context(EnvironmentId::new(), Vec::new()).unwrap();
        assert!(matches!(
            job.add_schedule(context, every_minute()),
            Err(ValidationError::InvalidType { .. })
        ));
    }

    #[test]
    fn test_same_environment_many_contexts() {
        let mut job = Job::new("Prepare Daily Orders", JobType::Scheduled);
        let env = EnvironmentId::new();
        let midnight = Schedule::new("midnight")
            .with_field(CronField::Minute, "0")
            .and_then(|s| s.with_field(CronField::Hour, "0"))
            .unwrap();

        let a = job.attach_context(env, vec![midnight]).unwrap();
        let b = job.attach_context(env, vec![every_minute()]).unwrap();
        assert_ne!(a, b);
        assert_eq!(job.contexts().len(), 2);
    }

    #[test]
    fn test_schedule_names_unique_within_job() {
        let mut job = Job::new("Fetch Orders", JobType::Scheduled);
        let env = EnvironmentId::new();
        assert!(job
            .attach_context(env, vec![every_minute(), every_minute()])
            .is_err());

        let context = job.attach_context(env, vec![every_minute()]).unwrap();
        assert!(matches!(
            job.add_schedule(context, every_minute()),
            Err(ValidationError::DuplicateName { kind: EntityKind::Schedule, .. })
        ));
    }

    #[test]
    fn test_remove_context_drops_schedules() {
        let mut job = Job::new("Fetch Orders", JobType::Scheduled);
        let context = job
            .attach_context(EnvironmentId::new(), vec![every_minute()])
            .unwrap();

        let removed = job.remove_context(context).unwrap();
        assert_eq!(removed.schedules().len(), 1);
        assert_eq!(job.schedule_names().count(), 0);
        assert!(job.remove_context(context).is_err());
    }

    #[test]
    fn test_notifications_keep_attachment_order() {
        let mut job = Job::new("Fetch Orders", JobType::Scheduled);
        let admin = NotificationGroupId::new();
        let producers = NotificationGroupId::new();

        let first = job.notify(admin, true, true);
        job.notify(producers, false, true);
        assert_eq!(job.notifications()[0].groups, vec![admin]);
        assert_eq!(job.notifications()[1].groups, vec![producers]);

        job.remove_notification(first).unwrap();
        assert_eq!(job.notifications().len(), 1);
    }
}
