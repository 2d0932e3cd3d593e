//! Idempotent topic create/delete against a broker admin client.

use super::client::{AdminClient, NewTopic};
use super::config::{BrokerConfig, BrokerSettings};
use super::retry::{with_retry, RetryError};
use crate::cancellation::CancellationToken;
use crate::core::{BrokerOperation, ProvisionState};
use crate::errors::{BrokerError, ProvisioningError};
use crate::events::{
    EventSink, NoOpEventSink, TOPIC_ABSENT, TOPIC_FAILED, TOPIC_READY, TOPIC_STATE,
};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Layout of a topic to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    /// Partition count.
    pub partitions: u32,
    /// Replication factor.
    pub replication_factor: u16,
    /// How long the broker may take to confirm a create.
    pub timeout_ms: u64,
}

impl Default for TopicSpec {
    fn default() -> Self {
        Self {
            partitions: 1,
            replication_factor: 1,
            timeout_ms: 1500,
        }
    }
}

impl TopicSpec {
    /// Takes the layout and timeout from broker settings.
    #[must_use]
    pub const fn from_settings(settings: &BrokerSettings) -> Self {
        Self {
            partitions: settings.partitions,
            replication_factor: settings.replication_factor,
            timeout_ms: settings.timeout_ms,
        }
    }

    /// The create timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of a provisioning call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    /// The topic name.
    pub topic: String,
    /// Final state reached.
    pub state: ProvisionState,
    /// Broker calls made across all phases.
    pub attempts: usize,
    /// True when provisioning is disabled and nothing was sent.
    pub skipped: bool,
}

impl ProvisionOutcome {
    fn skipped(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            state: ProvisionState::Pending,
            attempts: 0,
            skipped: true,
        }
    }
}

/// Which of the expected topics exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCheck {
    /// Topics found on the broker.
    pub present: Vec<String>,
    /// Topics the broker does not know.
    pub missing: Vec<String>,
    /// True when provisioning is disabled and the broker was not asked.
    pub skipped: bool,
}

impl TopicCheck {
    /// Returns true if nothing is missing.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && !self.skipped
    }
}

struct Active {
    admin: Arc<dyn AdminClient>,
    settings: BrokerSettings,
}

enum Backend {
    Active(Active),
    Disabled,
}

/// Creates and deletes broker topics, retrying transient failures.
///
/// Calls on the same topic name are serialised; calls on different names
/// run concurrently. Clones share the admin client, the per-topic locks and
/// the closed flag.
#[derive(Clone)]
pub struct TopicProvisioner {
    backend: Arc<Backend>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    sink: Arc<dyn EventSink>,
    closed: Arc<AtomicBool>,
}

impl TopicProvisioner {
    /// Wraps an open admin client.
    #[must_use]
    pub fn new(admin: Arc<dyn AdminClient>, settings: BrokerSettings) -> Self {
        Self::with_backend(Backend::Active(Active { admin, settings }))
    }

    /// Creates a provisioner that never talks to a broker.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_backend(Backend::Disabled)
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend: Arc::new(backend),
            locks: Arc::new(DashMap::new()),
            sink: Arc::new(NoOpEventSink),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens the admin client through `connector`, retrying with the
    /// configured policy. A disabled config yields a disabled provisioner.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Unreachable`] if every attempt failed,
    /// the connector returned a non-retryable error, or `cancel` fired.
    pub async fn connect<C, Fut>(
        config: &BrokerConfig,
        cancel: &CancellationToken,
        mut connector: C,
    ) -> Result<Self, ProvisioningError>
    where
        C: FnMut(BrokerSettings) -> Fut,
        Fut: Future<Output = Result<Arc<dyn AdminClient>, BrokerError>>,
    {
        let settings = match config {
            BrokerConfig::Configured(settings) => settings.clone(),
            BrokerConfig::Disabled => {
                warn!("KAFKA_BOOTSTRAP_SERVERS not set, topic provisioning disabled");
                return Ok(Self::disabled());
            }
        };

        let endpoints = settings.endpoints();
        let result = with_retry(
            &settings.retry,
            cancel,
            "connect",
            BrokerError::is_retryable,
            |_| connector(settings.clone()),
        )
        .await;

        match result {
            Ok((admin, attempts)) => {
                info!(endpoints = %endpoints, attempts, "Connected to broker");
                Ok(Self::new(admin, settings))
            }
            Err(RetryError::Exhausted { attempts, last: cause } | RetryError::Fatal { attempts, error: cause }) => {
                warn!(endpoints = %endpoints, attempts, error = %cause, "Broker unreachable");
                Err(ProvisioningError::Unreachable {
                    endpoints,
                    attempts,
                    cause,
                })
            }
            Err(RetryError::Cancelled { attempts }) => {
                debug!(endpoints = %endpoints, attempts, "Connect cancelled");
                Err(ProvisioningError::Unreachable {
                    endpoints,
                    attempts,
                    cause: BrokerError::Other("connect cancelled".to_string()),
                })
            }
        }
    }

    /// Sets the sink receiving `topic.*` events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns true if provisioning is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(*self.backend, Backend::Disabled)
    }

    /// Returns true once [`TopicProvisioner::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Default layout for new topics.
    #[must_use]
    pub fn default_spec(&self) -> TopicSpec {
        match &*self.backend {
            Backend::Active(active) => TopicSpec::from_settings(&active.settings),
            Backend::Disabled => TopicSpec::default(),
        }
    }

    fn lock_for(&self, topic: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Waits for exclusive use of `topic`.
    async fn hold(&self, topic: &str) -> TopicLock {
        let mut held = TopicLock {
            guard: None,
            locks: Arc::clone(&self.locks),
            topic: topic.to_string(),
        };
        held.guard = Some(self.lock_for(topic).lock_owned().await);
        held
    }

    /// Like [`TopicProvisioner::hold`], but gives up when `cancel` fires.
    async fn acquire(&self, topic: &str, cancel: &CancellationToken) -> Result<TopicLock, ProvisioningError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(topic = %topic, "Cancelled while waiting for topic lock");
                Err(ProvisioningError::Cancelled {
                    topic: topic.to_string(),
                    attempts: 0,
                })
            }
            held = self.hold(topic) => Ok(held),
        }
    }

    fn active(&self, topic: &str, operation: BrokerOperation) -> Result<Option<&Active>, ProvisioningError> {
        match &*self.backend {
            Backend::Disabled => {
                warn!(topic = %topic, operation = %operation, "Topic provisioning disabled, skipping");
                Ok(None)
            }
            Backend::Active(_) if self.is_closed() => Err(ProvisioningError::Broker {
                topic: topic.to_string(),
                operation,
                cause: BrokerError::Other("provisioner is closed".to_string()),
            }),
            Backend::Active(active) => Ok(Some(active)),
        }
    }

    /// Deletes `topic`. A topic that is already gone counts as success and
    /// ends in [`ProvisionState::AbsentOk`].
    ///
    /// # Errors
    ///
    /// Returns the mapped [`ProvisioningError`] if retries ran out, the
    /// broker refused, or `cancel` fired.
    pub async fn ensure_absent(
        &self,
        topic: &str,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, ProvisioningError> {
        let Some(active) = self.active(topic, BrokerOperation::Delete)? else {
            return Ok(ProvisionOutcome::skipped(topic));
        };
        let _held = self.acquire(topic, cancel).await?;

        let mut progress = Progress::new(topic, &*self.sink);
        let attempts = self.delete_phase(active, &mut progress, cancel).await?;
        self.sink
            .emit(TOPIC_ABSENT, Some(json!({ "topic": topic, "state": progress.state })))
            .await;
        info!(topic = %topic, state = %progress.state, attempts, "Topic absent");

        Ok(progress.finish(attempts))
    }

    /// Deletes then creates `topic`, leaving it empty and ready.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::AlreadyExists`] if the create still
    /// found the topic; otherwise as [`TopicProvisioner::ensure_absent`].
    pub async fn ensure_present(
        &self,
        topic: &str,
        spec: TopicSpec,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, ProvisioningError> {
        let Some(active) = self.active(topic, BrokerOperation::Create)? else {
            return Ok(ProvisionOutcome::skipped(topic));
        };
        let _held = self.acquire(topic, cancel).await?;

        let mut progress = Progress::new(topic, &*self.sink);
        let deletes = self.delete_phase(active, &mut progress, cancel).await?;

        progress.advance(ProvisionState::AttemptingCreate).await;
        let request = vec![NewTopic::new(topic, spec.partitions, spec.replication_factor)];
        let timeout = spec.timeout();
        let result = with_retry(
            &active.settings.retry,
            cancel,
            &format!("create {topic}"),
            BrokerError::is_retryable,
            |_| {
                let admin = Arc::clone(&active.admin);
                let request = request.clone();
                async move { admin.create_topics(&request, timeout).await }
            },
        )
        .await;

        match result {
            Ok(((), creates)) => {
                progress.advance(ProvisionState::Ready).await;
                let attempts = deletes + creates;
                self.sink
                    .emit(TOPIC_READY, Some(json!({ "topic": topic, "attempts": attempts })))
                    .await;
                info!(
                    topic = %topic,
                    partitions = spec.partitions,
                    replication_factor = spec.replication_factor,
                    attempts,
                    "Topic ready"
                );
                Ok(progress.finish(attempts))
            }
            Err(err) => {
                let err = provisioning_error(topic, BrokerOperation::Create, err);
                progress.fail(BrokerOperation::Create, &err).await;
                Err(err)
            }
        }
    }

    /// Runs [`TopicProvisioner::ensure_present`] for every name at once.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the other calls still run to completion.
    pub async fn ensure_all_present<I, S>(
        &self,
        topics: I,
        spec: TopicSpec,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProvisionOutcome>, ProvisioningError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let topics: Vec<S> = topics.into_iter().collect();
        let calls = topics
            .iter()
            .map(|topic| self.ensure_present(topic.as_ref(), spec, cancel));
        join_all(calls).await.into_iter().collect()
    }

    async fn delete_phase(
        &self,
        active: &Active,
        progress: &mut Progress<'_>,
        cancel: &CancellationToken,
    ) -> Result<usize, ProvisioningError> {
        progress.advance(ProvisionState::AttemptingDelete).await;
        let topic = progress.topic;
        let names = vec![topic.to_string()];
        let result = with_retry(
            &active.settings.retry,
            cancel,
            &format!("delete {topic}"),
            BrokerError::is_retryable,
            |_| {
                let admin = Arc::clone(&active.admin);
                let names = names.clone();
                async move { admin.delete_topics(&names).await }
            },
        )
        .await;

        match result {
            Ok(((), attempts)) => {
                progress.advance(ProvisionState::Deleted).await;
                Ok(attempts)
            }
            Err(RetryError::Fatal { attempts, error }) if error.is_unknown_topic() => {
                debug!(topic = %topic, "Topic did not exist");
                progress.advance(ProvisionState::AbsentOk).await;
                Ok(attempts)
            }
            Err(err) => {
                let err = provisioning_error(topic, BrokerOperation::Delete, err);
                progress.fail(BrokerOperation::Delete, &err).await;
                Err(err)
            }
        }
    }

    /// One delete attempt bounded by `timeout`, for cleanup paths that must
    /// not block. Returns true if the topic is known to be gone.
    pub async fn delete_best_effort(&self, topic: &str, timeout: Duration) -> bool {
        let Ok(Some(active)) = self.active(topic, BrokerOperation::Delete) else {
            return false;
        };
        let names = vec![topic.to_string()];
        let attempt = async {
            let _held = self.hold(topic).await;
            active.admin.delete_topics(&names).await
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(())) => {
                debug!(topic = %topic, "Best-effort delete succeeded");
                true
            }
            Ok(Err(e)) if e.is_unknown_topic() => true,
            Ok(Err(e)) => {
                warn!(topic = %topic, error = %e, "Best-effort delete failed");
                false
            }
            Err(_) => {
                warn!(topic = %topic, timeout = ?timeout, "Best-effort delete timed out");
                false
            }
        }
    }

    async fn list(
        &self,
        active: &Active,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ProvisioningError> {
        with_retry(
            &active.settings.retry,
            cancel,
            "list",
            BrokerError::is_retryable,
            |_| {
                let admin = Arc::clone(&active.admin);
                async move { admin.list_topics().await }
            },
        )
        .await
        .map(|(topics, _)| topics)
        .map_err(|err| provisioning_error(label, BrokerOperation::List, err))
    }

    /// Returns true if the broker lists `topic`. Always false when disabled.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`ProvisioningError`] if listing failed.
    pub async fn topic_exists(&self, topic: &str, cancel: &CancellationToken) -> Result<bool, ProvisioningError> {
        let Some(active) = self.active(topic, BrokerOperation::List)? else {
            return Ok(false);
        };
        let topics = self.list(active, topic, cancel).await?;
        Ok(topics.iter().any(|t| t == topic))
    }

    /// Splits `expected` into topics the broker has and topics it lacks.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`ProvisioningError`] if listing failed.
    pub async fn verify<I, S>(&self, expected: I, cancel: &CancellationToken) -> Result<TopicCheck, ProvisioningError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expected: Vec<String> = expected.into_iter().map(Into::into).collect();
        let label = expected.join(",");
        let Some(active) = self.active(&label, BrokerOperation::List)? else {
            return Ok(TopicCheck {
                present: Vec::new(),
                missing: expected,
                skipped: true,
            });
        };

        let listed = self.list(active, &label, cancel).await?;
        let (present, missing) = expected
            .into_iter()
            .partition(|name| listed.iter().any(|t| t == name));
        Ok(TopicCheck {
            present,
            missing,
            skipped: false,
        })
    }

    /// Closes the admin client. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the client's error from the first close.
    pub async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match &*self.backend {
            Backend::Active(active) => {
                info!(endpoints = %active.settings.endpoints(), "Closing broker admin client");
                active.admin.close().await
            }
            Backend::Disabled => Ok(()),
        }
    }
}

impl std::fmt::Debug for TopicProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoints = match &*self.backend {
            Backend::Active(active) => Some(active.settings.endpoints()),
            Backend::Disabled => None,
        };
        f.debug_struct("TopicProvisioner")
            .field("endpoints", &endpoints)
            .field("locks", &self.locks.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Exclusive use of one topic name. The map entry is dropped with the last
/// holder or waiter.
struct TopicLock {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    topic: String,
}

impl Drop for TopicLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.topic, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Walks one topic through [`ProvisionState`], reporting every step.
struct Progress<'a> {
    topic: &'a str,
    state: ProvisionState,
    sink: &'a dyn EventSink,
}

impl<'a> Progress<'a> {
    fn new(topic: &'a str, sink: &'a dyn EventSink) -> Self {
        Self {
            topic,
            state: ProvisionState::Pending,
            sink,
        }
    }

    async fn advance(&mut self, next: ProvisionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(topic = %self.topic, from = %self.state, to = %next, "Topic state");
        self.sink
            .emit(
                TOPIC_STATE,
                Some(json!({ "topic": self.topic, "from": self.state, "to": next })),
            )
            .await;
        self.state = next;
    }

    async fn fail(&mut self, operation: BrokerOperation, err: &ProvisioningError) {
        if self.state.is_attempting() {
            self.advance(ProvisionState::Failed).await;
        }
        warn!(topic = %self.topic, operation = %operation, error = %err, "Topic provisioning failed");
        self.sink
            .emit(
                TOPIC_FAILED,
                Some(json!({
                    "topic": self.topic,
                    "operation": operation.to_string(),
                    "error": err.to_string(),
                })),
            )
            .await;
    }

    fn finish(self, attempts: usize) -> ProvisionOutcome {
        ProvisionOutcome {
            topic: self.topic.to_string(),
            state: self.state,
            attempts,
            skipped: false,
        }
    }
}

fn provisioning_error(topic: &str, operation: BrokerOperation, err: RetryError<BrokerError>) -> ProvisioningError {
    let topic = topic.to_string();
    match err {
        RetryError::Exhausted { attempts, last } => ProvisioningError::Timeout {
            topic,
            operation,
            attempts,
            last_cause: last,
        },
        RetryError::Cancelled { attempts } => ProvisioningError::Cancelled { topic, attempts },
        RetryError::Fatal {
            error: BrokerError::AlreadyExists { .. },
            ..
        } => ProvisioningError::AlreadyExists { topic },
        RetryError::Fatal {
            error: BrokerError::Authorization(reason),
            ..
        } => ProvisioningError::Unauthorized {
            topic,
            operation,
            reason,
        },
        RetryError::Fatal { error, .. } => ProvisioningError::Broker {
            topic,
            operation,
            cause: error,
        },
    }
}
