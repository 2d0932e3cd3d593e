//! An in-process broker with fault injection.

use super::client::{Ack, AdminClient, MessageClient, NewTopic};
use crate::core::BrokerOperation;
use crate::errors::BrokerError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct TopicLog {
    spec: NewTopic,
    messages: VecDeque<Vec<u8>>,
    next_offset: u64,
}

#[derive(Debug, Default)]
struct State {
    topics: Mutex<BTreeMap<String, TopicLog>>,
    faults: Mutex<HashMap<BrokerOperation, VecDeque<BrokerError>>>,
    lost_replies: Mutex<HashMap<BrokerOperation, VecDeque<BrokerError>>>,
    calls: Mutex<HashMap<BrokerOperation, usize>>,
    closed: AtomicBool,
    arrivals: Notify,
}

/// Broker living in the test process.
///
/// Clones share state, so a test can keep one handle for inspection and
/// give another to the provisioner.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<State>,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls of `operation` fail with `error`.
    pub fn fail_next(&self, operation: BrokerOperation, count: usize, error: BrokerError) {
        let mut faults = self.state.faults.lock();
        let queue = faults.entry(operation).or_default();
        queue.extend(std::iter::repeat(error).take(count));
    }

    /// Applies the next `count` successful calls of `operation` but answers
    /// them with `error`, like a reply lost after the broker acted.
    pub fn lose_replies(&self, operation: BrokerOperation, count: usize, error: BrokerError) {
        let mut lost = self.state.lost_replies.lock();
        let queue = lost.entry(operation).or_default();
        queue.extend(std::iter::repeat(error).take(count));
    }

    /// Drops pending faults and lost replies.
    pub fn clear_faults(&self) {
        self.state.faults.lock().clear();
        self.state.lost_replies.lock().clear();
    }

    /// Number of calls made to `operation`, failed ones included.
    #[must_use]
    pub fn calls(&self, operation: BrokerOperation) -> usize {
        self.state.calls.lock().get(&operation).copied().unwrap_or(0)
    }

    /// Creates a topic directly, bypassing faults.
    pub fn seed_topic(&self, name: impl Into<String>) {
        let name = name.into();
        self.state.topics.lock().insert(
            name.clone(),
            TopicLog {
                spec: NewTopic::new(name, 1, 1),
                messages: VecDeque::new(),
                next_offset: 0,
            },
        );
    }

    /// Returns true if the topic exists.
    #[must_use]
    pub fn has_topic(&self, name: &str) -> bool {
        self.state.topics.lock().contains_key(name)
    }

    /// Returns the creation request of a topic.
    #[must_use]
    pub fn topic_spec(&self, name: &str) -> Option<NewTopic> {
        self.state.topics.lock().get(name).map(|log| log.spec.clone())
    }

    /// Returns true once `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Records a call and returns the injected fault, if any.
    fn enter(&self, operation: BrokerOperation) -> Result<(), BrokerError> {
        *self.state.calls.lock().entry(operation).or_default() += 1;
        if self.is_closed() {
            return Err(BrokerError::Other("client closed".to_string()));
        }
        match self
            .state
            .faults
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn reply(&self, operation: BrokerOperation) -> Result<(), BrokerError> {
        match self
            .state
            .lost_replies
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Stands in for opening a connection; honours `Connect` faults.
    pub async fn connect(&self) -> Result<Arc<dyn AdminClient>, BrokerError> {
        self.enter(BrokerOperation::Connect)?;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl AdminClient for InMemoryBroker {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        self.enter(BrokerOperation::List)?;
        Ok(self.state.topics.lock().keys().cloned().collect())
    }

    async fn create_topics(&self, topics: &[NewTopic], _timeout: Duration) -> Result<(), BrokerError> {
        self.enter(BrokerOperation::Create)?;
        let mut existing = self.state.topics.lock();
        if let Some(clash) = topics.iter().find(|t| existing.contains_key(&t.name)) {
            return Err(BrokerError::AlreadyExists {
                topic: clash.name.clone(),
            });
        }
        for topic in topics {
            existing.insert(
                topic.name.clone(),
                TopicLog {
                    spec: topic.clone(),
                    messages: VecDeque::new(),
                    next_offset: 0,
                },
            );
        }
        drop(existing);
        self.reply(BrokerOperation::Create)
    }

    async fn delete_topics(&self, topics: &[String]) -> Result<(), BrokerError> {
        self.enter(BrokerOperation::Delete)?;
        let mut existing = self.state.topics.lock();
        if let Some(missing) = topics.iter().find(|t| !existing.contains_key(*t)) {
            return Err(BrokerError::UnknownTopic {
                topic: missing.clone(),
            });
        }
        for topic in topics {
            existing.remove(topic);
        }
        drop(existing);
        self.reply(BrokerOperation::Delete)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.arrivals.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl MessageClient for InMemoryBroker {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<Ack, BrokerError> {
        let offset = {
            let mut topics = self.state.topics.lock();
            let log = topics.get_mut(topic).ok_or_else(|| BrokerError::UnknownTopic {
                topic: topic.to_string(),
            })?;
            log.messages.push_back(payload);
            log.next_offset += 1;
            log.next_offset - 1
        };
        self.state.arrivals.notify_waiters();
        Ok(Ack {
            topic: topic.to_string(),
            offset,
        })
    }

    async fn next_message(&self, topic: &str, timeout: Duration) -> Result<Option<Vec<u8>>, BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            let arrived = self.state.arrivals.notified();
            {
                let mut topics = self.state.topics.lock();
                let log = topics.get_mut(topic).ok_or_else(|| BrokerError::UnknownTopic {
                    topic: topic.to_string(),
                })?;
                if let Some(message) = log.messages.pop_front() {
                    return Ok(Some(message));
                }
            }
            if self.is_closed() || tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return Ok(None);
            }
        }
    }
}
