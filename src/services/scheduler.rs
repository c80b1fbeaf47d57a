//! The leased per-minute check tick.
//!
//! One tick selects due monitors, probes them with bounded concurrency,
//! persists each result atomically, fans out transition events, and then
//! refreshes the public snapshot. Per-monitor failures never abort siblings.

use crate::config::AppConfig;
use crate::db::channel_repository::ChannelRepository;
use crate::db::lock_repository::LockRepository;
use crate::db::maintenance_repository::MaintenanceRepository;
use crate::db::monitor_repository::MonitorRepository;
use crate::db::check_repository::CheckRepository;
use crate::models::channel::NotificationChannel;
use crate::models::monitor::{Monitor, MonitorStatus};
use crate::services::notifier::{build_event_payload, Notifier};
use crate::services::{probe_service, snapshot_service, transition};
use crate::utils::timeutil;
use futures::future::join_all;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

const TICK_LEASE: &str = "scheduler:tick";

#[derive(Debug, Default, Serialize)]
pub struct TickSummary {
    pub ran: bool,
    pub checked_at: i64,
    pub due: usize,
    pub events: usize,
}

pub struct Scheduler {
    pool: SqlitePool,
    config: AppConfig,
    notifier: Notifier,
}

impl Scheduler {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let notifier = Notifier::new(pool.clone());
        Self {
            pool,
            config,
            notifier,
        }
    }

    pub async fn run_tick(&self, now: i64) -> Result<TickSummary, sqlx::Error> {
        let checked_at = timeutil::floor_to_minute(now);

        let locks = LockRepository::new(&self.pool);
        if !locks
            .try_acquire(TICK_LEASE, now, self.config.scheduler_lease_sec)
            .await?
        {
            info!("Tick at {} skipped, lease is held", checked_at);
            return Ok(TickSummary {
                ran: false,
                checked_at,
                ..Default::default()
            });
        }

        let monitors = MonitorRepository::new(&self.pool).get_due(checked_at).await?;
        if monitors.is_empty() {
            snapshot_service::refresh_best_effort(&self.pool, &self.config, now).await;
            return Ok(TickSummary {
                ran: true,
                checked_at,
                ..Default::default()
            });
        }
        info!("Tick at {}: {} monitors due", checked_at, monitors.len());

        let in_maintenance = MaintenanceRepository::new(&self.pool)
            .get_active_monitor_ids(now)
            .await?;
        let channels = ChannelRepository::new(&self.pool).get_active().await?;

        let semaphore = Arc::new(Semaphore::new(self.config.probe_concurrency));
        let tasks = monitors.iter().map(|monitor| {
            let semaphore = semaphore.clone();
            let channels = &channels;
            let in_maintenance = &in_maintenance;

            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                self.check_one(monitor, checked_at, channels, in_maintenance)
                    .await
            }
        });

        let events = join_all(tasks).await.into_iter().filter(|&e| e).count();

        snapshot_service::refresh_best_effort(&self.pool, &self.config, now).await;

        Ok(TickSummary {
            ran: true,
            checked_at,
            due: monitors.len(),
            events,
        })
    }

    /// Probe one monitor and persist the result. Returns whether an event
    /// was dispatched. All failures are contained here.
    async fn check_one(
        &self,
        monitor: &Monitor,
        checked_at: i64,
        channels: &[NotificationChannel],
        in_maintenance: &HashSet<i64>,
    ) -> bool {
        let outcome = probe_service::run_probe(monitor).await;

        let monitors = MonitorRepository::new(&self.pool);
        let prev = match monitors.get_state(monitor.id).await {
            Ok(prev) => prev,
            Err(e) => {
                error!("Failed to load state for monitor {}: {:?}", monitor.id, e);
                return false;
            }
        };

        let t = transition::evaluate(prev.as_ref(), monitor.id, &outcome, checked_at);

        if let Err(e) = CheckRepository::new(&self.pool)
            .persist_batch(checked_at, &outcome, &t.next, t.outage_action)
            .await
        {
            error!("Failed to persist check for monitor {}: {:?}", monitor.id, e);
            return false;
        }

        if !t.changed || in_maintenance.contains(&monitor.id) {
            return false;
        }

        let prev_status = prev.map(|s| s.status);
        let event = match (prev_status, t.next.status) {
            (Some(MonitorStatus::Up) | Some(MonitorStatus::Unknown) | None, MonitorStatus::Down) => {
                Some("monitor.down")
            }
            (Some(MonitorStatus::Down), MonitorStatus::Up) => Some("monitor.up"),
            _ => None,
        };
        let Some(event) = event else { return false };

        let direction = if event == "monitor.down" { "down" } else { "up" };
        let event_key = format!("monitor:{}:{}:{}", monitor.id, direction, checked_at);
        let payload = build_event_payload(event, &event_key, checked_at, monitor, &outcome);

        info!("Monitor {} transition: {} ({})", monitor.id, event, event_key);

        // Hand off to the notifier without holding up the tick.
        let notifier = self.notifier.clone();
        let channels = channels.to_vec();
        tokio::spawn(async move {
            notifier
                .dispatch_event(&channels, &event_key, &payload, checked_at)
                .await;
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::outage_repository::OutageRepository;
    use crate::db::test_pool;
    use crate::models::check::CheckOutcome;
    use crate::models::monitor::MonitorKind;
    use sqlx::Row;

    fn config() -> AppConfig {
        AppConfig {
            admin_token: "t".to_string(),
            ..AppConfig::default()
        }
    }

    async fn insert_monitor(pool: &SqlitePool, target: &str) -> Monitor {
        let monitor = Monitor {
            id: 0,
            name: "m".to_string(),
            kind: MonitorKind::Tcp,
            target: target.to_string(),
            interval_sec: 60,
            timeout_ms: 1000,
            is_active: true,
            http_method: None,
            http_headers: None,
            http_body: None,
            expected_status: None,
            response_keyword: None,
            response_forbidden_keyword: None,
            created_at: 0,
            updated_at: 0,
        };
        let id = MonitorRepository::new(pool).create(&monitor).await.unwrap();
        Monitor { id, ..monitor }
    }

    #[tokio::test]
    async fn test_tick_lease_blocks_overlap() {
        let pool = test_pool().await;
        let scheduler = Scheduler::new(pool.clone(), config());

        let first = scheduler.run_tick(1000).await.unwrap();
        assert!(first.ran);
        let second = scheduler.run_tick(1010).await.unwrap();
        assert!(!second.ran);
    }

    #[tokio::test]
    async fn test_tick_floors_checked_at() {
        let pool = test_pool().await;
        let scheduler = Scheduler::new(pool.clone(), config());
        let summary = scheduler.run_tick(1234).await.unwrap();
        assert_eq!(summary.checked_at, 1200);
    }

    #[tokio::test]
    async fn test_maintenance_suppresses_notification_but_opens_outage() {
        let pool = test_pool().await;
        let scheduler = Scheduler::new(pool.clone(), config());

        let monitor = insert_monitor(&pool, "host.invalid:9999").await;

        // Active maintenance window covering the monitor at tick time.
        crate::db::maintenance_repository::MaintenanceRepository::new(&pool)
            .create("planned work", None, 0, 10_000, &[monitor.id], 0)
            .await
            .unwrap();
        // An active channel that would otherwise receive the event.
        let webhook = serde_json::from_value(serde_json::json!({
            "url": "https://hooks.example.com/x"
        }))
        .unwrap();
        crate::db::channel_repository::ChannelRepository::new(&pool)
            .create("ops", "webhook", &webhook, 0)
            .await
            .unwrap();

        let summary = scheduler.run_tick(60).await.unwrap();
        assert!(summary.ran);
        assert_eq!(summary.events, 0);

        let outage = OutageRepository::new(&pool)
            .get_ongoing(monitor.id)
            .await
            .unwrap();
        assert!(outage.is_some());

        let deliveries: i64 = sqlx::query("SELECT COUNT(*) AS n FROM notification_deliveries")
            .fetch_one(&pool)
            .await
            .unwrap()
            .try_get("n")
            .unwrap();
        assert_eq!(deliveries, 0);
    }

    #[tokio::test]
    async fn test_down_then_up_lifecycle() {
        let pool = test_pool().await;
        let scheduler = Scheduler::new(pool.clone(), config());

        // An unresolvable-but-valid target: the probe classifies it down.
        let monitor = insert_monitor(&pool, "host.invalid:9999").await;

        let summary = scheduler.run_tick(60).await.unwrap();
        assert!(summary.ran);
        assert_eq!(summary.due, 1);

        let state = MonitorRepository::new(&pool)
            .get_state(monitor.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.status, MonitorStatus::Down);

        let outage = OutageRepository::new(&pool)
            .get_ongoing(monitor.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outage.started_at, 60);

        // Recovery path exercised through the same persistence batch the
        // scheduler uses.
        let t = transition::evaluate(Some(&state), monitor.id, &CheckOutcome::up(5, None), 120);
        CheckRepository::new(&pool)
            .persist_batch(120, &CheckOutcome::up(5, None), &t.next, t.outage_action)
            .await
            .unwrap();

        let outage = OutageRepository::new(&pool)
            .get_overlapping(monitor.id, 0, 1000)
            .await
            .unwrap();
        assert_eq!(outage[0].ended_at, Some(120));
    }
}
