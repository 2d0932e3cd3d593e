//! Deciding which groups hear about a failing job.

use super::{NotificationGroup, NotificationTransport};
use crate::core::{EscalationEvent, JobId, NotificationGroupId};
use crate::errors::DeliveryError;
use crate::events::{EventSink, NoOpEventSink, ESCALATION_DISPATCHED};
use crate::model::Job;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Groups to notify for `event`, in first-attachment order.
///
/// Walks the job's notifications in attachment order and keeps every group
/// of those whose flag for `event` is set, dropping repeats. An empty result
/// means nobody is notified.
#[must_use]
pub fn classify(job: &Job, event: EscalationEvent) -> Vec<NotificationGroupId> {
    let mut seen = HashSet::new();
    job.notifications()
        .iter()
        .filter(|n| n.fires_on(event))
        .flat_map(|n| n.groups.iter().copied())
        .filter(|group| seen.insert(*group))
        .collect()
}

/// Flattens the groups' addresses, dropping repeats, in group order.
#[must_use]
pub fn recipients<'a>(groups: impl IntoIterator<Item = &'a NotificationGroup>) -> Vec<String> {
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .flat_map(|g| g.emails().iter().map(|e| e.email.clone()))
        .filter(|email| seen.insert(email.clone()))
        .collect()
}

/// Hand-off record for the notification transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    /// The failing job.
    pub job_id: JobId,
    /// Its name, for message subjects.
    pub job_name: String,
    /// Failure class.
    pub event: EscalationEvent,
    /// Groups selected by [`classify`].
    pub groups: Vec<NotificationGroupId>,
    /// Addresses of those groups.
    pub recipients: Vec<String>,
}

impl Escalation {
    /// Builds the record, resolving group ids with `lookup`.
    ///
    /// Returns `None` when no group matches. Unknown group ids are kept in
    /// `groups` but contribute no recipients.
    pub fn build<F>(job: &Job, event: EscalationEvent, lookup: F) -> Option<Self>
    where
        F: Fn(NotificationGroupId) -> Option<NotificationGroup>,
    {
        let groups = classify(job, event);
        if groups.is_empty() {
            return None;
        }
        let resolved: Vec<NotificationGroup> = groups.iter().filter_map(|id| lookup(*id)).collect();
        Some(Self {
            job_id: job.id,
            job_name: job.name.clone(),
            event,
            recipients: recipients(&resolved),
            groups,
        })
    }

    /// Returns true if there is nobody to deliver to.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Hands escalations to a transport and reports them as events.
pub struct Escalator {
    transport: Arc<dyn NotificationTransport>,
    sink: Arc<dyn EventSink>,
}

impl Escalator {
    /// Creates an escalator without event reporting.
    #[must_use]
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Self {
        Self {
            transport,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Delivers `escalation`. Returns false without calling the transport
    /// when it has no recipients.
    ///
    /// # Errors
    ///
    /// Returns the transport's error.
    pub async fn dispatch(&self, escalation: &Escalation) -> Result<bool, DeliveryError> {
        if escalation.is_empty() {
            debug!(job = %escalation.job_name, event = %escalation.event, "No recipients, escalation dropped");
            return Ok(false);
        }

        self.transport.deliver(escalation).await?;
        info!(
            job = %escalation.job_name,
            event = %escalation.event,
            recipients = escalation.recipients.len(),
            "Escalation dispatched"
        );
        self.sink
            .emit(
                ESCALATION_DISPATCHED,
                Some(serde_json::json!({
                    "job_id": escalation.job_id,
                    "job_name": escalation.job_name,
                    "event": escalation.event,
                    "recipients": escalation.recipients,
                })),
            )
            .await;
        Ok(true)
    }
}

impl std::fmt::Debug for Escalator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Escalator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobType;
    use crate::events::CollectingEventSink;
    use crate::model::Notification;
    use crate::notifications::CollectingTransport;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct Groups {
        admin: NotificationGroup,
        producers: NotificationGroup,
        bakery: NotificationGroup,
    }

    fn groups() -> Groups {
        Groups {
            admin: NotificationGroup::new("Admin").with_email("admin@bakery.example"),
            producers: NotificationGroup::new("Producers")
                .with_email("flour@mill.example")
                .with_email("admin@bakery.example"),
            bakery: NotificationGroup::new("Bakery").with_email("baker@bakery.example"),
        }
    }

    fn fetch_orders(g: &Groups) -> Job {
        let mut job = Job::new("Fetch Orders", JobType::Scheduled);
        job.add_notification(Notification::new([g.admin.id]).on_retry(true).on_failure(true));
        job.add_notification(Notification::new([g.producers.id, g.bakery.id]));
        job
    }

    #[test]
    fn test_fetch_orders_scenario() {
        let g = groups();
        let job = fetch_orders(&g);

        assert_eq!(classify(&job, EscalationEvent::Retry), vec![g.admin.id]);
        assert_eq!(
            classify(&job, EscalationEvent::Failure),
            vec![g.admin.id, g.producers.id, g.bakery.id]
        );
    }

    #[test]
    fn test_groups_deduplicated_in_first_seen_order() {
        let g = groups();
        let mut job = Job::new("Stop everything", JobType::Triggered);
        job.add_notification(Notification::new([g.bakery.id, g.admin.id]));
        job.add_notification(Notification::new([g.admin.id, g.producers.id, g.bakery.id]));

        assert_eq!(
            classify(&job, EscalationEvent::Failure),
            vec![g.bakery.id, g.admin.id, g.producers.id]
        );
    }

    #[test]
    fn test_no_matching_flag_is_silent() {
        let g = groups();
        let mut job = Job::new("Collect Register", JobType::Triggered);
        job.add_notification(Notification::new([g.admin.id]));

        assert!(classify(&job, EscalationEvent::Retry).is_empty());
        assert!(Escalation::build(&job, EscalationEvent::Retry, |_| None).is_none());
    }

    #[test]
    fn test_recipients_flatten_without_duplicates() {
        let g = groups();
        assert_eq!(
            recipients([&g.admin, &g.producers, &g.bakery]),
            vec!["admin@bakery.example", "flour@mill.example", "baker@bakery.example"]
        );
    }

    #[test]
    fn test_build_resolves_recipients() {
        let g = groups();
        let job = fetch_orders(&g);
        let by_id: HashMap<_, _> = [&g.admin, &g.producers, &g.bakery]
            .into_iter()
            .map(|group| (group.id, group.clone()))
            .collect();

        let escalation = Escalation::build(&job, EscalationEvent::Retry, |id| by_id.get(&id).cloned()).unwrap();
        assert_eq!(escalation.job_name, "Fetch Orders");
        assert_eq!(escalation.groups, vec![g.admin.id]);
        assert_eq!(escalation.recipients, vec!["admin@bakery.example"]);
    }

    #[tokio::test]
    async fn test_dispatch_delivers_and_reports() {
        let g = groups();
        let job = fetch_orders(&g);
        let escalation = Escalation::build(&job, EscalationEvent::Failure, |id| {
            [&g.admin, &g.producers, &g.bakery]
                .into_iter()
                .find(|group| group.id == id)
                .cloned()
        })
        .unwrap();

        let transport = Arc::new(CollectingTransport::new());
        let sink = Arc::new(CollectingEventSink::new());
        let escalator = Escalator::new(transport.clone()).with_event_sink(sink.clone());

        assert!(escalator.dispatch(&escalation).await.unwrap());
        assert_eq!(transport.delivered(), vec![escalation]);
        assert_eq!(sink.names(), vec![ESCALATION_DISPATCHED]);
    }

    #[tokio::test]
    async fn test_dispatch_skips_empty_escalation() {
        let g = groups();
        let job = fetch_orders(&g);
        let escalation = Escalation::build(&job, EscalationEvent::Retry, |_| None).unwrap();

        let transport = Arc::new(CollectingTransport::new());
        let escalator = Escalator::new(transport.clone());
        assert!(!escalator.dispatch(&escalation).await.unwrap());
        assert!(transport.delivered().is_empty());
    }
}
