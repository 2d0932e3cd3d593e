//! Delivery boundary for escalations.

use super::Escalation;
use crate::errors::DeliveryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

/// Delivers an escalation to its recipients (e-mail, chat, pager).
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Delivers one escalation.
    async fn deliver(&self, escalation: &Escalation) -> Result<(), DeliveryError>;
}

/// Writes escalations to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTransport;

#[async_trait]
impl NotificationTransport for LoggingTransport {
    async fn deliver(&self, escalation: &Escalation) -> Result<(), DeliveryError> {
        warn!(
            job = %escalation.job_name,
            event = %escalation.event,
            recipients = ?escalation.recipients,
            "Job escalation"
        );
        Ok(())
    }
}

/// Keeps delivered escalations in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct CollectingTransport {
    delivered: Mutex<Vec<Escalation>>,
    failure: Mutex<Option<String>>,
}

impl CollectingTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following delivery fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    /// Returns delivered escalations in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Escalation> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl NotificationTransport for CollectingTransport {
    async fn deliver(&self, escalation: &Escalation) -> Result<(), DeliveryError> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(DeliveryError::new(escalation.job_name.clone(), reason));
        }
        self.delivered.lock().push(escalation.clone());
        Ok(())
    }
}
