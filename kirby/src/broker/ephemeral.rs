//! Topics that live only for the duration of a block.

use super::provisioner::{ProvisionOutcome, TopicProvisioner, TopicSpec};
use crate::cancellation::CancellationToken;
use crate::errors::ProvisioningError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bound on the single delete attempted after cancellation or drop.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle given to the body of an ephemeral scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    /// The topic name.
    pub name: String,
    /// False when provisioning is disabled and the topic was never created.
    pub provisioned: bool,
    /// How the topic was provisioned.
    pub outcome: ProvisionOutcome,
}

/// Deletes the topic if the scope is dropped before it finishes cleanup.
struct CleanupGuard {
    armed: Option<(TopicProvisioner, String)>,
}

impl CleanupGuard {
    fn arm(provisioner: &TopicProvisioner, topic: &str) -> Self {
        Self {
            armed: Some((provisioner.clone(), topic.to_string())),
        }
    }

    fn disarm(&mut self) {
        self.armed = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some((provisioner, topic)) = self.armed.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(topic = %topic, "Ephemeral scope dropped, scheduling delete");
                runtime.spawn(async move {
                    provisioner.delete_best_effort(&topic, CLEANUP_TIMEOUT).await;
                });
            }
            Err(_) => warn!(topic = %topic, "Ephemeral scope dropped outside a runtime, topic left behind"),
        }
    }
}

impl TopicProvisioner {
    /// Creates `topic`, runs `body` with it and deletes it on every exit.
    ///
    /// If the body fails and cleanup also fails, the body's error wins and
    /// the cleanup error is logged. If provisioning itself fails, one bounded
    /// delete runs before the error is returned. On cancellation one is
    /// attempted before [`ProvisioningError::Cancelled`] is returned.
    /// Dropping the returned future schedules the same delete on the
    /// current runtime. When provisioning is disabled the body runs with an
    /// unprovisioned handle.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or a provisioning error converted into `E`.
    pub async fn with_ephemeral_topic<T, E, F, Fut>(
        &self,
        topic: &str,
        spec: TopicSpec,
        cancel: &CancellationToken,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(TopicHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ProvisioningError>,
    {
        if self.is_disabled() {
            let outcome = self.ensure_present(topic, spec, cancel).await?;
            return body(TopicHandle {
                name: topic.to_string(),
                provisioned: false,
                outcome,
            })
            .await;
        }

        let mut guard = CleanupGuard::arm(self, topic);
        let outcome = match self.ensure_present(topic, spec, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // A failed create may still have been applied.
                debug!(topic = %topic, error = %err, "Provisioning failed, deleting topic");
                self.delete_best_effort(topic, CLEANUP_TIMEOUT).await;
                guard.disarm();
                return Err(err.into());
            }
        };
        let attempts = outcome.attempts;
        let handle = TopicHandle {
            name: topic.to_string(),
            provisioned: true,
            outcome,
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = body(handle) => Some(result),
        };

        let Some(result) = result else {
            debug!(topic = %topic, "Ephemeral scope cancelled, deleting topic");
            self.delete_best_effort(topic, CLEANUP_TIMEOUT).await;
            guard.disarm();
            return Err(ProvisioningError::Cancelled {
                topic: topic.to_string(),
                attempts,
            }
            .into());
        };

        let cleanup = self.ensure_absent(topic, &CancellationToken::new()).await;
        guard.disarm();
        match (result, cleanup) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                warn!(topic = %topic, error = %cleanup_err, "Cleanup failed after body error");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProvisionState;

    #[tokio::test]
    async fn test_disabled_runs_body_unprovisioned() {
        let provisioner = TopicProvisioner::disabled();
        let handle = provisioner
            .with_ephemeral_topic("orders", TopicSpec::default(), &CancellationToken::new(), |handle| async move {
                Ok::<_, ProvisioningError>(handle)
            })
            .await
            .unwrap();

        assert!(!handle.provisioned);
        assert!(handle.outcome.skipped);
        assert_eq!(handle.outcome.state, ProvisionState::Pending);
    }

    #[test]
    fn test_guard_outside_runtime_does_not_panic() {
        let guard = CleanupGuard::arm(&TopicProvisioner::disabled(), "orders");
        drop(guard);
    }
}
