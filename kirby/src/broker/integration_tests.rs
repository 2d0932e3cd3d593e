//! Provisioning scenarios against the in-memory broker.

#[cfg(test)]
mod tests {
    use crate::broker::{
        AdminClient, BrokerConfig, BrokerSettings, InMemoryBroker, JitterStrategy, MessageClient,
        RetryConfig, TopicProvisioner, TopicSpec,
    };
    use crate::cancellation::CancellationToken;
    use crate::core::{BrokerOperation, ProvisionState};
    use crate::errors::{BrokerError, ProvisioningError};
    use crate::events::{CollectingEventSink, TOPIC_ABSENT, TOPIC_FAILED, TOPIC_READY};
    use crate::testing::{unique_topic_name, BAKERY_TOPICS};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const MAX_ATTEMPTS: usize = 3;

    fn settings() -> BrokerSettings {
        BrokerSettings::new(["localhost:9092"]).with_retry(
            RetryConfig::new()
                .with_max_attempts(MAX_ATTEMPTS)
                .with_base_delay_ms(1)
                .with_max_delay_ms(5)
                .with_jitter(JitterStrategy::None),
        )
    }

    async fn connect(broker: &InMemoryBroker) -> TopicProvisioner {
        let config = BrokerConfig::Configured(settings());
        TopicProvisioner::connect(&config, &CancellationToken::new(), |_| broker.connect())
            .await
            .unwrap()
    }

    async fn wait_until_absent(broker: &InMemoryBroker, topic: &str) -> bool {
        for _ in 0..100 {
            if !broker.has_topic(topic) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_present_then_absent_twice() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let cancel = CancellationToken::new();
        let topic = unique_topic_name("orders");

        let created = provisioner
            .ensure_present(&topic, TopicSpec::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(created.state, ProvisionState::Ready);
        assert!(broker.has_topic(&topic));

        let deleted = provisioner.ensure_absent(&topic, &cancel).await.unwrap();
        assert_eq!(deleted.state, ProvisionState::Deleted);

        let again = provisioner.ensure_absent(&topic, &cancel).await.unwrap();
        assert_eq!(again.state, ProvisionState::AbsentOk);
        assert!(!broker.has_topic(&topic));
    }

    #[tokio::test]
    async fn test_present_recreates_existing_topic_empty() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        broker.seed_topic("asset_management");
        assert_ok!(broker.send("asset_management", b"stale".to_vec()).await);

        let outcome = provisioner
            .ensure_present("asset_management", TopicSpec::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.state, ProvisionState::Ready);

        let next = broker
            .next_message("asset_management", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn test_transient_faults_below_budget_succeed() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        broker.fail_next(
            BrokerOperation::Create,
            MAX_ATTEMPTS - 1,
            BrokerError::Transient("leader not available".to_string()),
        );

        let outcome = provisioner
            .ensure_present("timeseries", TopicSpec::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.state, ProvisionState::Ready);
        assert_eq!(broker.calls(BrokerOperation::Create), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_transient_faults_at_budget_time_out() {
        let broker = InMemoryBroker::new();
        let sink = Arc::new(CollectingEventSink::new());
        let provisioner = connect(&broker).await.with_event_sink(sink.clone());
        broker.fail_next(
            BrokerOperation::Create,
            MAX_ATTEMPTS,
            BrokerError::NotReady("metadata propagating".to_string()),
        );

        let err = provisioner
            .ensure_present("timeseries", TopicSpec::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisioningError::Timeout { attempts: MAX_ATTEMPTS, operation: BrokerOperation::Create, .. }
        ));
        assert_eq!(broker.calls(BrokerOperation::Create), MAX_ATTEMPTS);
        assert_eq!(sink.payloads(TOPIC_FAILED).len(), 1);
        assert!(sink.payloads(TOPIC_READY).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_broker() {
        let broker = InMemoryBroker::new();
        broker.fail_next(
            BrokerOperation::Connect,
            MAX_ATTEMPTS,
            BrokerError::Transient("connection refused".to_string()),
        );
        let config = BrokerConfig::Configured(settings());

        let err = TopicProvisioner::connect(&config, &CancellationToken::new(), |_| broker.connect())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::Unreachable { attempts: MAX_ATTEMPTS, .. }));
        assert_eq!(err.topic(), None);
    }

    #[tokio::test]
    async fn test_ephemeral_topic_removed_after_ok() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let sink = Arc::new(CollectingEventSink::new());
        let provisioner = provisioner.with_event_sink(sink.clone());
        let topic = unique_topic_name("factory");

        let ack = provisioner
            .with_ephemeral_topic(&topic, TopicSpec::default(), &CancellationToken::new(), |handle| {
                let broker = broker.clone();
                async move {
                    assert!(handle.provisioned);
                    broker
                        .send(&handle.name, b"order-42".to_vec())
                        .await
                        .map_err(anyhow::Error::from)
                }
            })
            .await
            .unwrap();

        assert_eq!(ack.offset, 0);
        assert!(!broker.has_topic(&topic));
        assert_eq!(sink.payloads(TOPIC_ABSENT).len(), 1);
    }

    #[tokio::test]
    async fn test_ephemeral_topic_removed_after_body_error() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let topic = unique_topic_name("errors_log");

        let result: anyhow::Result<()> = provisioner
            .with_ephemeral_topic(&topic, TopicSpec::default(), &CancellationToken::new(), |_| async {
                Err(anyhow::anyhow!("script crashed"))
            })
            .await;

        let err = assert_err!(result);
        assert_eq!(err.to_string(), "script crashed");
        assert!(!broker.has_topic(&topic));
    }

    #[tokio::test]
    async fn test_ephemeral_body_error_wins_over_cleanup_error() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let topic = unique_topic_name("cashregister");

        let result: anyhow::Result<()> = provisioner
            .with_ephemeral_topic(&topic, TopicSpec::default(), &CancellationToken::new(), |_| {
                let broker = broker.clone();
                async move {
                    broker.fail_next(
                        BrokerOperation::Delete,
                        1,
                        BrokerError::Authorization("ACL denied".to_string()),
                    );
                    Err(anyhow::anyhow!("script crashed"))
                }
            })
            .await;

        assert_eq!(assert_err!(result).to_string(), "script crashed");
    }

    #[tokio::test]
    async fn test_ephemeral_topic_removed_after_cancellation() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let topic = unique_topic_name("orders");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel("operator abort");
        });

        let result: Result<(), ProvisioningError> = provisioner
            .with_ephemeral_topic(&topic, TopicSpec::default(), &cancel, |_| std::future::pending())
            .await;

        assert!(assert_err!(result).is_cancelled());
        assert!(!broker.has_topic(&topic));
    }

    #[tokio::test]
    async fn test_ephemeral_topic_removed_when_create_reply_lost() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let topic = unique_topic_name("orders");
        broker.lose_replies(
            BrokerOperation::Create,
            1,
            BrokerError::Transient("request timed out".to_string()),
        );

        let result: Result<(), ProvisioningError> = provisioner
            .with_ephemeral_topic(&topic, TopicSpec::default(), &CancellationToken::new(), |_| async {
                Ok(())
            })
            .await;

        assert!(matches!(assert_err!(result), ProvisioningError::AlreadyExists { .. }));
        assert_eq!(broker.calls(BrokerOperation::Create), 2);
        assert!(!broker.has_topic(&topic));
        let listed = assert_ok!(broker.list_topics().await);
        assert!(!listed.contains(&topic));
    }

    #[tokio::test]
    async fn test_ephemeral_topic_removed_after_create_timeout() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let topic = unique_topic_name("factory");
        broker.fail_next(
            BrokerOperation::Create,
            MAX_ATTEMPTS - 1,
            BrokerError::NotReady("metadata propagating".to_string()),
        );
        broker.lose_replies(
            BrokerOperation::Create,
            1,
            BrokerError::Transient("request timed out".to_string()),
        );

        let result: Result<(), ProvisioningError> = provisioner
            .with_ephemeral_topic(&topic, TopicSpec::default(), &CancellationToken::new(), |_| async {
                Ok(())
            })
            .await;

        assert!(matches!(
            assert_err!(result),
            ProvisioningError::Timeout { attempts: MAX_ATTEMPTS, operation: BrokerOperation::Create, .. }
        ));
        assert_eq!(broker.calls(BrokerOperation::Create), MAX_ATTEMPTS);
        assert!(!broker.has_topic(&topic));
    }

    #[tokio::test]
    async fn test_ephemeral_topic_removed_when_future_dropped() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let topic = unique_topic_name("orders");
        let cancel = CancellationToken::new();

        let scope = provisioner.with_ephemeral_topic(&topic, TopicSpec::default(), &cancel, |_| {
            std::future::pending::<Result<(), ProvisioningError>>()
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), scope).await;

        assert!(timed_out.is_err());
        assert!(wait_until_absent(&broker, &topic).await);
    }

    #[tokio::test]
    async fn test_same_topic_calls_serialise() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(
            provisioner.ensure_present("factory", TopicSpec::default(), &cancel),
            provisioner.ensure_present("factory", TopicSpec::default(), &cancel),
        );

        let states = [first.unwrap().state, second.unwrap().state];
        assert_eq!(states, [ProvisionState::Ready, ProvisionState::Ready]);
        assert!(broker.has_topic("factory"));
    }

    #[tokio::test]
    async fn test_different_topics_run_concurrently() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let cancel = CancellationToken::new();

        let names: Vec<String> = (0..8).map(|i| format!("partition_{i}")).collect();
        let outcomes = provisioner
            .ensure_all_present(&names, TopicSpec::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), names.len());
        assert!(outcomes.iter().all(|o| o.state == ProvisionState::Ready));
        let check = provisioner.verify(names.clone(), &cancel).await.unwrap();
        assert!(check.is_complete());
        assert_eq!(check.present, names);
    }

    #[tokio::test]
    async fn test_bakery_topics_provisioned() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let cancel = CancellationToken::new();
        broker.seed_topic("orders");

        provisioner
            .ensure_all_present(BAKERY_TOPICS, provisioner.default_spec(), &cancel)
            .await
            .unwrap();

        let check = provisioner.verify(BAKERY_TOPICS, &cancel).await.unwrap();
        assert!(check.is_complete());
        assert_eq!(broker.topic_spec("factory").map(|t| t.partitions), Some(1));
    }

    #[tokio::test]
    async fn test_verify_reports_missing() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;
        let cancel = CancellationToken::new();
        broker.seed_topic("orders");

        let check = provisioner.verify(["orders", "factory"], &cancel).await.unwrap();
        assert_eq!(check.present, vec!["orders"]);
        assert_eq!(check.missing, vec!["factory"]);
        assert!(provisioner.topic_exists("orders", &cancel).await.unwrap());
        assert!(!provisioner.topic_exists("factory", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_close_releases_client_once() {
        let broker = InMemoryBroker::new();
        let provisioner = connect(&broker).await;

        assert_ok!(provisioner.close().await);
        assert_ok!(provisioner.close().await);
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn test_disabled_config_skips_everything() {
        let config = assert_ok!(BrokerConfig::from_lookup(|_| None));
        let provisioner = TopicProvisioner::connect(&config, &CancellationToken::new(), |_| async {
            Err(BrokerError::Other("must not connect".to_string()))
        })
        .await
        .unwrap();

        assert!(provisioner.is_disabled());
        let outcome = provisioner
            .ensure_present("orders", TopicSpec::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.skipped);
    }
}
