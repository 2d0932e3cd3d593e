//! The bakery: a small but complete catalog used across tests and benches.

use crate::catalog::Catalog;
use crate::core::{ContextId, EnvironmentId, JobId, JobType, NotificationGroupId, ScriptId};
use crate::model::{CronField, Notification, Schedule};
use anyhow::Context as _;
use uuid::Uuid;

/// Topics registered by [`Bakery::build`], in registration order.
pub const BAKERY_TOPICS: [&str; 6] = [
    "cashregister",
    "orders",
    "errors_log",
    "asset_management",
    "factory",
    "timeseries",
];

/// A catalog with three groups, four jobs, six topics and four scripts.
///
/// `Fetch Orders` notifies Admin on retries and failures and
/// Producers/Bakery on failures only; the other jobs notify Admin on both.
#[derive(Debug)]
pub struct Bakery {
    /// The populated catalog.
    pub catalog: Catalog,
    /// The single environment every context targets.
    pub environment: EnvironmentId,
    /// `Admin` group.
    pub admin: NotificationGroupId,
    /// `Producers` group.
    pub producers: NotificationGroupId,
    /// `Bakery` group.
    pub bakery: NotificationGroupId,
    /// Scheduled, every minute.
    pub fetch_orders: JobId,
    /// Triggered.
    pub collect_register: JobId,
    /// Scheduled, every day at 00:00.
    pub prepare_daily_orders: JobId,
    /// Scheduled, without schedules.
    pub stop_everything: JobId,
    /// Context of `Fetch Orders`.
    pub orders_context: ContextId,
    /// Context of `Collect Register`.
    pub cashregister_context: ContextId,
    /// Context of `Prepare Daily Orders`.
    pub prepare_context: ContextId,
    /// Context of `Stop everything`.
    pub abort_context: ContextId,
    /// orders -> timeseries, asset_management.
    pub orders_retriever: ScriptId,
    /// cashregister -> timeseries, asset_management.
    pub cashregister_retriever: ScriptId,
    /// asset_management -> factory.
    pub prepare_order_for_factory: ScriptId,
    /// -> errors_log.
    pub abort_all: ScriptId,
}

impl Bakery {
    /// Builds the bakery in a fresh catalog.
    pub fn build() -> anyhow::Result<Self> {
        Self::build_in(Catalog::new())
    }

    /// Builds the bakery in `catalog`, which should be empty.
    pub fn build_in(catalog: Catalog) -> anyhow::Result<Self> {
        let environment = catalog.create_environment("test_env")?;

        let admin = catalog.create_group("Admin", ["admin@some-test-server.somewhere"])?;
        let producers = catalog.create_group(
            "Producers",
            [
                "producer1@some-test-server.somewhere",
                "producer2@some-test-server.somewhere",
            ],
        )?;
        let bakery = catalog.create_group("Bakery", ["bakery@some-test-server.somewhere"])?;

        let admin_always = || Notification::new([admin]).on_retry(true).on_failure(true);

        let fetch_orders = catalog.create_job("Fetch Orders", JobType::Scheduled)?;
        catalog.add_notification(fetch_orders, admin_always())?;
        catalog.add_notification(fetch_orders, Notification::new([producers, bakery]))?;

        let collect_register = catalog.create_job("Collect Register", JobType::Triggered)?;
        catalog.add_notification(collect_register, admin_always())?;

        let prepare_daily_orders = catalog.create_job("Prepare Daily Orders", JobType::Scheduled)?;
        catalog.add_notification(prepare_daily_orders, admin_always())?;

        let stop_everything = catalog.create_job("Stop everything", JobType::Scheduled)?;
        catalog.add_notification(stop_everything, admin_always())?;

        let midnight = Schedule::new("Every day at 00:00")
            .with_field(CronField::Minute, "0")?
            .with_field(CronField::Hour, "0")?;

        let orders_context =
            catalog.attach_context(fetch_orders, environment, vec![Schedule::new("Every minute")])?;
        let cashregister_context = catalog.attach_context(collect_register, environment, Vec::new())?;
        let prepare_context = catalog.attach_context(prepare_daily_orders, environment, vec![midnight])?;
        let abort_context = catalog.attach_context(stop_everything, environment, Vec::new())?;

        for topic in BAKERY_TOPICS {
            catalog
                .register_topic(topic)
                .with_context(|| format!("registering topic {topic}"))?;
        }

        let orders_retriever = catalog.register_script("orders_retriever", "3.1.0", orders_context)?;
        catalog.add_source(orders_retriever, "orders")?;
        catalog.add_destination(orders_retriever, "timeseries")?;
        catalog.add_destination(orders_retriever, "asset_management")?;

        let cashregister_retriever =
            catalog.register_script("cashregister_retriever", "2.0.4", cashregister_context)?;
        catalog.add_source(cashregister_retriever, "cashregister")?;
        catalog.add_destination(cashregister_retriever, "timeseries")?;
        catalog.add_destination(cashregister_retriever, "asset_management")?;

        let prepare_order_for_factory =
            catalog.register_script("prepare_order_for_factory", "2.2.1", prepare_context)?;
        catalog.add_source(prepare_order_for_factory, "asset_management")?;
        catalog.add_destination(prepare_order_for_factory, "factory")?;

        let abort_all = catalog.register_script("abort_all", "0.0.1", abort_context)?;
        catalog.add_destination(abort_all, "errors_log")?;

        Ok(Self {
            catalog,
            environment,
            admin,
            producers,
            bakery,
            fetch_orders,
            collect_register,
            prepare_daily_orders,
            stop_everything,
            orders_context,
            cashregister_context,
            prepare_context,
            abort_context,
            orders_retriever,
            cashregister_retriever,
            prepare_order_for_factory,
            abort_all,
        })
    }
}

/// Returns a broker-legal topic name unlikely to collide with another test.
#[must_use]
pub fn unique_topic_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}
