//! The administrative façade over jobs, scripts, topics and groups.

use super::store::{Change, EntityStore, NoOpStore};
use crate::core::{
    ContextId, EntityKind, EnvironmentId, EscalationEvent, JobId, JobType, NotificationGroupId,
    NotificationId, ScriptId,
};
use crate::errors::{KirbyError, ValidationError};
use crate::model::{
    resolve_variables, ConfigMap, Context, Environment, Job, Notification, Schedule, Script,
    Suspension,
};
use crate::notifications::{self, Escalation, NotificationGroup};
use crate::pipeline::{DanglingReference, PipelineCycle, PipelineGraph, ScriptEdges};
use crate::topics::{Topic, TopicRegistry};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point for every administrative call.
///
/// Each job and each script is an aggregate behind its own lock; a mutation
/// only locks the aggregate it changes. Checks spanning aggregates (unique
/// names, scripts still bound to a context, registered topics) are enforced
/// here.
///
/// Lock order: schedule names, then the context index, then a job.
pub struct Catalog {
    environments: RwLock<Vec<Environment>>,
    jobs: DashMap<JobId, Arc<RwLock<Job>>>,
    job_names: RwLock<BTreeMap<String, JobId>>,
    /// Context -> owning job.
    contexts: DashMap<ContextId, JobId>,
    /// Schedule names are unique across the whole catalog.
    schedule_names: Mutex<HashSet<String>>,
    groups: RwLock<Vec<NotificationGroup>>,
    topics: TopicRegistry,
    graph: PipelineGraph,
    global_config: RwLock<ConfigMap>,
    store: Arc<dyn EntityStore>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("jobs", &self.jobs.len())
            .field("contexts", &self.contexts.len())
            .field("scripts", &self.graph.len())
            .field("topics", &self.topics.len())
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Creates an empty catalog that persists nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(NoOpStore))
    }

    /// Creates an empty catalog backed by `store`.
    #[must_use]
    pub fn with_store(store: Arc<dyn EntityStore>) -> Self {
        Self {
            environments: RwLock::new(Vec::new()),
            jobs: DashMap::new(),
            job_names: RwLock::new(BTreeMap::new()),
            contexts: DashMap::new(),
            schedule_names: Mutex::new(HashSet::new()),
            groups: RwLock::new(Vec::new()),
            topics: TopicRegistry::new(),
            graph: PipelineGraph::new(),
            global_config: RwLock::new(ConfigMap::default()),
            store,
        }
    }

    fn persist(&self, change: Change) -> Result<(), KirbyError> {
        self.store.persist(&change)?;
        Ok(())
    }

    /// Creates an environment.
    pub fn create_environment(&self, name: impl Into<String>) -> Result<EnvironmentId, KirbyError> {
        let environment = Environment::new(name);
        let mut environments = self.environments.write();
        if environments.iter().any(|e| e.name == environment.name) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::Environment,
                name: environment.name,
            }
            .into());
        }
        self.persist(Change::Created {
            kind: EntityKind::Environment,
            id: environment.id.to_string(),
            name: environment.name.clone(),
        })?;
        debug!(environment = %environment.name, "Environment created");
        let id = environment.id;
        environments.push(environment);
        Ok(id)
    }

    /// Looks up an environment.
    #[must_use]
    pub fn environment(&self, id: EnvironmentId) -> Option<Environment> {
        self.environments.read().iter().find(|e| e.id == id).cloned()
    }

    /// Looks up an environment by name.
    #[must_use]
    pub fn environment_by_name(&self, name: &str) -> Option<Environment> {
        self.environments.read().iter().find(|e| e.name == name).cloned()
    }

    /// Creates a job with no contexts or notifications.
    pub fn create_job(&self, name: impl Into<String>, job_type: JobType) -> Result<JobId, KirbyError> {
        let job = Job::new(name, job_type);
        let mut names = self.job_names.write();
        if names.contains_key(&job.name) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::Job,
                name: job.name,
            }
            .into());
        }
        self.persist(Change::Created {
            kind: EntityKind::Job,
            id: job.id.to_string(),
            name: job.name.clone(),
        })?;
        info!(job = %job.name, job_type = %job.job_type(), "Job created");
        let id = job.id;
        names.insert(job.name.clone(), id);
        self.jobs.insert(id, Arc::new(RwLock::new(job)));
        Ok(id)
    }

    /// Sets or replaces a job's description.
    pub fn describe_job(&self, job: JobId, description: impl Into<String>) -> Result<(), KirbyError> {
        let description = description.into();
        self.update_job(job, |draft| {
            draft.description = Some(description);
            Ok((
                (),
                Change::Updated {
                    kind: EntityKind::Job,
                    id: draft.id.to_string(),
                },
            ))
        })
    }

    fn job_handle(&self, id: JobId) -> Result<Arc<RwLock<Job>>, ValidationError> {
        self.jobs
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ValidationError::unknown(EntityKind::Job, id))
    }

    /// Applies `apply` to a draft of the job, persists the returned change,
    /// then commits the draft. The job is write-locked throughout.
    fn update_job<T, F>(&self, id: JobId, apply: F) -> Result<T, KirbyError>
    where
        F: FnOnce(&mut Job) -> Result<(T, Change), ValidationError>,
    {
        let handle = self.job_handle(id)?;
        let mut job = handle.write();
        let mut draft = job.clone();
        let (value, change) = apply(&mut draft)?;
        self.persist(change)?;
        *job = draft;
        Ok(value)
    }

    /// Returns a copy of a job.
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.job_handle(id).ok().map(|h| h.read().clone())
    }

    /// Looks up a job by name.
    #[must_use]
    pub fn job_by_name(&self, name: &str) -> Option<Job> {
        let id = *self.job_names.read().get(name)?;
        self.job(id)
    }

    /// Returns copies of every job, ordered by name.
    #[must_use]
    pub fn jobs(&self) -> Vec<Job> {
        let ids: Vec<JobId> = self.job_names.read().values().copied().collect();
        ids.into_iter().filter_map(|id| self.job(id)).collect()
    }

    fn job_of_context(&self, context: ContextId) -> Result<JobId, ValidationError> {
        self.contexts
            .get(&context)
            .map(|entry| *entry.value())
            .ok_or_else(|| ValidationError::unknown(EntityKind::Context, context))
    }

    /// Binds a job to an environment with optional schedules.
    ///
    /// Fails with `InvalidType` if schedules are given to a job that is not
    /// scheduled, and with `DuplicateName` if a schedule name is already used
    /// anywhere in the catalog.
    pub fn attach_context(
        &self,
        job: JobId,
        environment: EnvironmentId,
        schedules: Vec<Schedule>,
    ) -> Result<ContextId, KirbyError> {
        if self.environment(environment).is_none() {
            return Err(ValidationError::unknown(EntityKind::Environment, environment).into());
        }

        let mut names = self.schedule_names.lock();
        if let Some(taken) = schedules.iter().find(|s| names.contains(&s.name)) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::Schedule,
                name: taken.name.clone(),
            }
            .into());
        }
        let new_names: Vec<String> = schedules.iter().map(|s| s.name.clone()).collect();

        let context = self.update_job(job, |draft| {
            let context = draft.attach_context(environment, schedules)?;
            Ok((
                context,
                Change::Created {
                    kind: EntityKind::Context,
                    id: context.to_string(),
                    name: draft.name.clone(),
                },
            ))
        })?;

        names.extend(new_names);
        self.contexts.insert(context, job);
        debug!(job = %job, context = %context, environment = %environment, "Context attached");
        Ok(context)
    }

    /// Adds a schedule to an existing context.
    pub fn add_schedule(&self, context: ContextId, schedule: Schedule) -> Result<(), KirbyError> {
        let mut names = self.schedule_names.lock();
        if names.contains(&schedule.name) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::Schedule,
                name: schedule.name,
            }
            .into());
        }
        let job = self.job_of_context(context)?;
        let name = schedule.name.clone();
        self.update_job(job, |draft| {
            draft.add_schedule(context, schedule)?;
            Ok((
                (),
                Change::Created {
                    kind: EntityKind::Schedule,
                    id: name.clone(),
                    name: name.clone(),
                },
            ))
        })?;
        names.insert(name);
        Ok(())
    }

    /// Adds a suspension window to a schedule.
    pub fn add_suspension(
        &self,
        context: ContextId,
        schedule: &str,
        suspension: Suspension,
    ) -> Result<(), KirbyError> {
        let job = self.job_of_context(context)?;
        self.update_job(job, |draft| {
            draft.add_suspension(context, schedule, suspension)?;
            Ok((
                (),
                Change::Updated {
                    kind: EntityKind::Schedule,
                    id: schedule.to_string(),
                },
            ))
        })
    }

    /// Removes a context and its schedules.
    ///
    /// Fails with `ContextInUse`, changing nothing, while scripts are bound
    /// to the context.
    pub fn remove_context(&self, context: ContextId) -> Result<Context, KirbyError> {
        let mut names = self.schedule_names.lock();
        let Entry::Occupied(entry) = self.contexts.entry(context) else {
            return Err(ValidationError::unknown(EntityKind::Context, context).into());
        };

        let bound = self.graph.scripts_in_context(context);
        if !bound.is_empty() {
            return Err(ValidationError::ContextInUse {
                context,
                scripts: bound.iter().map(Script::label).collect(),
            }
            .into());
        }

        let job = *entry.get();
        let removed = self.update_job(job, |draft| {
            let removed = draft.remove_context(context)?;
            Ok((
                removed,
                Change::Deleted {
                    kind: EntityKind::Context,
                    id: context.to_string(),
                },
            ))
        })?;
        for schedule in removed.schedules() {
            names.remove(&schedule.name);
        }
        entry.remove();
        debug!(context = %context, schedules = removed.schedules().len(), "Context removed");
        Ok(removed)
    }

    /// Looks up a context.
    #[must_use]
    pub fn context(&self, context: ContextId) -> Option<Context> {
        let job = self.job_of_context(context).ok()?;
        self.job(job)?.context(context).cloned()
    }

    /// Registers a script bound to `context`.
    pub fn register_script(
        &self,
        package_name: impl Into<String>,
        package_version: impl Into<String>,
        context: ContextId,
    ) -> Result<ScriptId, KirbyError> {
        // Held until the script is in the graph so remove_context cannot
        // slip in between.
        let guard = self
            .contexts
            .get(&context)
            .ok_or_else(|| ValidationError::unknown(EntityKind::Context, context))?;

        let script = Script::new(package_name, package_version, context);
        self.persist(Change::Created {
            kind: EntityKind::Script,
            id: script.id.to_string(),
            name: script.label(),
        })?;
        debug!(script = %script.label(), context = %context, "Script registered");
        let id = self.graph.insert(script);
        drop(guard);
        Ok(id)
    }

    /// Removes a script and its edges.
    pub fn detach_script(&self, script: ScriptId) -> Result<Script, KirbyError> {
        if !self.graph.contains(script) {
            return Err(ValidationError::unknown(EntityKind::Script, script).into());
        }
        self.persist(Change::Deleted {
            kind: EntityKind::Script,
            id: script.to_string(),
        })?;
        self.graph
            .remove(script)
            .ok_or_else(|| ValidationError::unknown(EntityKind::Script, script).into())
    }

    /// Records that a runner reported `script` at `at`.
    pub fn touch_script(&self, script: ScriptId, at: DateTime<Utc>) -> Result<(), KirbyError> {
        if !self.graph.contains(script) {
            return Err(ValidationError::unknown(EntityKind::Script, script).into());
        }
        self.persist(Change::Updated {
            kind: EntityKind::Script,
            id: script.to_string(),
        })?;
        self.graph.touch(script, at)?;
        Ok(())
    }

    fn check_edge(&self, script: ScriptId, topic: &str) -> Result<ScriptEdges, KirbyError> {
        self.topics.require(topic)?;
        Ok(self.graph.edges_of(script)?)
    }

    /// Adds a source edge. Returns false if it already existed.
    pub fn add_source(&self, script: ScriptId, topic: &str) -> Result<bool, KirbyError> {
        if self.check_edge(script, topic)?.sources.contains(topic) {
            return Ok(false);
        }
        self.persist(Change::Updated {
            kind: EntityKind::Script,
            id: script.to_string(),
        })?;
        Ok(self.graph.add_source(script, topic)?)
    }

    /// Adds a destination edge. Returns false if it already existed.
    pub fn add_destination(&self, script: ScriptId, topic: &str) -> Result<bool, KirbyError> {
        if self.check_edge(script, topic)?.destinations.contains(topic) {
            return Ok(false);
        }
        self.persist(Change::Updated {
            kind: EntityKind::Script,
            id: script.to_string(),
        })?;
        Ok(self.graph.add_destination(script, topic)?)
    }

    /// Returns a script's edges.
    pub fn edges_of(&self, script: ScriptId) -> Result<ScriptEdges, KirbyError> {
        Ok(self.graph.edges_of(script)?)
    }

    /// Returns a copy of a script.
    #[must_use]
    pub fn script(&self, script: ScriptId) -> Option<Script> {
        self.graph.get(script)
    }

    /// Finds a script by package name and version.
    #[must_use]
    pub fn script_by_label(&self, package_name: &str, package_version: &str) -> Option<Script> {
        self.graph
            .scripts()
            .into_iter()
            .find(|s| s.package_name == package_name && s.package_version == package_version)
    }

    /// Fails if the script may not run: a topic used as both source and
    /// destination, or a topic that is no longer registered.
    pub fn check_runnable(&self, script: ScriptId) -> Result<(), KirbyError> {
        let current = self
            .graph
            .get(script)
            .ok_or_else(|| ValidationError::unknown(EntityKind::Script, script))?;
        if let Some(topic) = current.self_loops().first() {
            return Err(ValidationError::SelfLoop {
                script: current.label(),
                topic: (*topic).to_string(),
            }
            .into());
        }
        self.required_topics(script)?;
        Ok(())
    }

    /// Topics the script needs before it can run, all registered.
    ///
    /// Fails closed with `UnknownTopic` on a reference to a deleted topic.
    pub fn required_topics(&self, script: ScriptId) -> Result<BTreeSet<String>, KirbyError> {
        let edges = self.graph.edges_of(script)?;
        let topics: BTreeSet<String> = edges.sources.into_iter().chain(edges.destinations).collect();
        for topic in &topics {
            self.topics.require(topic)?;
        }
        Ok(topics)
    }

    /// Reports every cycle in the pipeline.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<PipelineCycle> {
        self.graph.detect_cycles()
    }

    /// Lists script references to unregistered topics.
    #[must_use]
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        self.graph.dangling_references(&self.topics)
    }

    /// The pipeline graph.
    #[must_use]
    pub const fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Registers a topic.
    pub fn register_topic(&self, name: impl Into<String>) -> Result<Topic, KirbyError> {
        let topic = Topic::new(name)?;
        if self.topics.contains(&topic.name) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::Topic,
                name: topic.name,
            }
            .into());
        }
        self.persist(Change::Created {
            kind: EntityKind::Topic,
            id: topic.name.clone(),
            name: topic.name.clone(),
        })?;
        Ok(self.topics.register(topic.name)?)
    }

    /// Removes a topic. Scripts still referencing it fail their next
    /// [`Catalog::check_runnable`].
    pub fn remove_topic(&self, name: &str) -> Result<Topic, KirbyError> {
        self.topics.require(name)?;
        self.persist(Change::Deleted {
            kind: EntityKind::Topic,
            id: name.to_string(),
        })?;
        Ok(self.topics.remove(name)?)
    }

    /// The topic registry.
    #[must_use]
    pub const fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Creates a notification group.
    pub fn create_group<I, S>(&self, name: impl Into<String>, emails: I) -> Result<NotificationGroupId, KirbyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group = NotificationGroup::new(name);
        for email in emails {
            group.add_email(email);
        }
        let mut groups = self.groups.write();
        if groups.iter().any(|g| g.name == group.name) {
            return Err(ValidationError::DuplicateName {
                kind: EntityKind::NotificationGroup,
                name: group.name,
            }
            .into());
        }
        self.persist(Change::Created {
            kind: EntityKind::NotificationGroup,
            id: group.id.to_string(),
            name: group.name.clone(),
        })?;
        let id = group.id;
        groups.push(group);
        Ok(id)
    }

    /// Adds an address to a group. Returns false if it was already there.
    pub fn add_group_email(&self, group: NotificationGroupId, email: impl Into<String>) -> Result<bool, KirbyError> {
        let email = email.into();
        let mut groups = self.groups.write();
        let target = groups
            .iter_mut()
            .find(|g| g.id == group)
            .ok_or_else(|| ValidationError::unknown(EntityKind::NotificationGroup, group))?;
        if target.emails().iter().any(|e| e.email == email) {
            return Ok(false);
        }
        self.persist(Change::Updated {
            kind: EntityKind::NotificationGroup,
            id: group.to_string(),
        })?;
        Ok(target.add_email(email))
    }

    /// Looks up a group.
    #[must_use]
    pub fn group(&self, id: NotificationGroupId) -> Option<NotificationGroup> {
        self.groups.read().iter().find(|g| g.id == id).cloned()
    }

    /// Looks up a group by name.
    #[must_use]
    pub fn group_by_name(&self, name: &str) -> Option<NotificationGroup> {
        self.groups.read().iter().find(|g| g.name == name).cloned()
    }

    fn require_groups(&self, ids: &[NotificationGroupId]) -> Result<(), ValidationError> {
        let groups = self.groups.read();
        match ids.iter().find(|id| !groups.iter().any(|g| g.id == **id)) {
            Some(missing) => Err(ValidationError::unknown(EntityKind::NotificationGroup, missing)),
            None => Ok(()),
        }
    }

    /// Attaches a notification to a job.
    pub fn add_notification(&self, job: JobId, notification: Notification) -> Result<NotificationId, KirbyError> {
        self.require_groups(&notification.groups)?;
        self.update_job(job, |draft| {
            let id = draft.add_notification(notification);
            Ok((
                id,
                Change::Created {
                    kind: EntityKind::Notification,
                    id: id.to_string(),
                    name: draft.name.clone(),
                },
            ))
        })
    }

    /// Detaches a notification from a job.
    pub fn remove_notification(&self, job: JobId, notification: NotificationId) -> Result<Notification, KirbyError> {
        self.update_job(job, |draft| {
            let removed = draft
                .remove_notification(notification)
                .ok_or_else(|| ValidationError::unknown(EntityKind::Notification, notification))?;
            Ok((
                removed,
                Change::Deleted {
                    kind: EntityKind::Notification,
                    id: notification.to_string(),
                },
            ))
        })
    }

    /// Groups to notify when `job` hits `event`.
    pub fn classify(&self, job: JobId, event: EscalationEvent) -> Result<Vec<NotificationGroupId>, KirbyError> {
        let handle = self.job_handle(job)?;
        let job = handle.read();
        Ok(notifications::classify(&job, event))
    }

    /// Addresses of `groups`, flattened and de-duplicated in group order.
    #[must_use]
    pub fn recipients(&self, groups: &[NotificationGroupId]) -> Vec<String> {
        let known = self.groups.read();
        let resolved = groups.iter().filter_map(|id| known.iter().find(|g| g.id == *id));
        notifications::recipients(resolved)
    }

    /// Builds the hand-off record for the notification transport.
    ///
    /// Returns `None` when no group is interested in `event`.
    pub fn escalate(&self, job: JobId, event: EscalationEvent) -> Result<Option<Escalation>, KirbyError> {
        let handle = self.job_handle(job)?;
        let job = handle.read();
        Ok(Escalation::build(&job, event, |id| self.group(id)))
    }

    /// Sets a catalog-wide variable.
    pub fn set_global_config(&self, name: impl Into<String>, value: impl ToString) -> Result<(), KirbyError> {
        let name = name.into();
        let mut config = self.global_config.write();
        let mut draft = config.clone();
        draft.set(name.clone(), value)?;
        self.persist(Change::Created {
            kind: EntityKind::ConfigKey,
            id: name.clone(),
            name,
        })?;
        *config = draft;
        Ok(())
    }

    /// Sets a variable for every context of `job`.
    pub fn set_job_config(&self, job: JobId, name: impl Into<String>, value: impl ToString) -> Result<(), KirbyError> {
        let name = name.into();
        self.update_job(job, |draft| {
            draft.config_mut().set(name.clone(), value)?;
            Ok((
                (),
                Change::Created {
                    kind: EntityKind::ConfigKey,
                    id: format!("{}/{name}", draft.id),
                    name: name.clone(),
                },
            ))
        })
    }

    /// Sets a variable for one context.
    pub fn set_context_config(
        &self,
        context: ContextId,
        name: impl Into<String>,
        value: impl ToString,
    ) -> Result<(), KirbyError> {
        let name = name.into();
        let job = self.job_of_context(context)?;
        self.update_job(job, |draft| {
            draft.context_mut(context)?.config.set(name.clone(), value)?;
            Ok((
                (),
                Change::Created {
                    kind: EntityKind::ConfigKey,
                    id: format!("{context}/{name}"),
                    name: name.clone(),
                },
            ))
        })
    }

    /// Effective variables of a context: global, then job, then context.
    pub fn variables(&self, context: ContextId) -> Result<BTreeMap<String, String>, KirbyError> {
        let job = self.job_handle(self.job_of_context(context)?)?;
        let job = job.read();
        let ctx = job
            .context(context)
            .ok_or_else(|| ValidationError::unknown(EntityKind::Context, context))?;
        let global = self.global_config.read();
        Ok(resolve_variables(&global, job.config(), ctx.config()))
    }
}
