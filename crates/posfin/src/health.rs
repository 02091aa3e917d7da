//! Liveness tracking for the background tasks and the datastore.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::audit::{AlertDeduper, AlertSeverity, AlertSink, AlertType, SystemAlert};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::lifecycle::store::LifecycleStore;

/// The periodic tasks whose cycles are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    StatusMonitor,
    Sweep,
    RevenueMonitor,
}

impl TaskKind {
    pub const fn label(self) -> &'static str {
        match self {
            TaskKind::StatusMonitor => "status_monitor",
            TaskKind::Sweep => "sweep",
            TaskKind::RevenueMonitor => "revenue_monitor",
        }
    }
}

/// Last-cycle timestamps shared by the tasks and the health loop.
#[derive(Debug, Default)]
pub struct EngineHeartbeat {
    cycles: Mutex<BTreeMap<TaskKind, DateTime<Utc>>>,
}

impl EngineHeartbeat {
    pub fn record(&self, task: TaskKind, at: DateTime<Utc>) {
        let mut cycles = self.cycles.lock().expect("heartbeat mutex poisoned");
        cycles.insert(task, at);
    }

    pub fn last(&self, task: TaskKind) -> Option<DateTime<Utc>> {
        let cycles = self.cycles.lock().expect("heartbeat mutex poisoned");
        cycles.get(&task).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskHealth {
    pub task: TaskKind,
    pub last_cycle: Option<DateTime<Utc>>,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub store_reachable: bool,
    pub tasks: Vec<TaskHealth>,
    pub checked_at: DateTime<Utc>,
}

/// Periodic check that the datastore answers and that every monitor task has
/// completed a cycle recently.
pub struct HealthMonitor<S, A> {
    store: Arc<S>,
    alerts: Arc<A>,
    heartbeat: Arc<EngineHeartbeat>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    deduper: Mutex<AlertDeduper>,
}

impl<S, A> HealthMonitor<S, A>
where
    S: LifecycleStore,
    A: AlertSink,
{
    pub fn new(
        store: Arc<S>,
        alerts: Arc<A>,
        heartbeat: Arc<EngineHeartbeat>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            alerts,
            heartbeat,
            clock,
            config,
            deduper: Mutex::new(AlertDeduper::default()),
        }
    }

    pub fn check(&self) -> HealthReport {
        let now = self.clock.now();
        let store_reachable = match self.store.ping() {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "datastore unreachable during health check");
                false
            }
        };

        // A task is stale once it has missed three consecutive cycles.
        let expectations = [
            (TaskKind::StatusMonitor, self.config.status_interval_secs),
            (TaskKind::Sweep, self.config.sweep_interval_secs),
            (TaskKind::RevenueMonitor, self.config.revenue_interval_secs),
        ];
        let tasks: Vec<TaskHealth> = expectations
            .into_iter()
            .map(|(task, interval_secs)| {
                let last_cycle = self.heartbeat.last(task);
                let allowance = Duration::seconds(interval_secs as i64 * 3);
                let stale = last_cycle.is_some_and(|at| now - at > allowance);
                TaskHealth {
                    task,
                    last_cycle,
                    stale,
                }
            })
            .collect();

        let healthy = store_reachable && tasks.iter().all(|task| !task.stale);
        if !healthy {
            let should_publish = self.deduper.lock().expect("deduper mutex poisoned").should_publish(
                "engine",
                AlertType::HealthCheckFailed,
                now,
                self.config.alert_cooldown(),
            );
            if should_publish {
                let stale_tasks: Vec<&str> = tasks
                    .iter()
                    .filter(|task| task.stale)
                    .map(|task| task.task.label())
                    .collect();
                let alert = SystemAlert {
                    alert_type: AlertType::HealthCheckFailed,
                    severity: AlertSeverity::Critical,
                    title: "Lifecycle engine health check failed".to_string(),
                    message: format!(
                        "store_reachable={store_reachable}, stale_tasks=[{}]",
                        stale_tasks.join(", "),
                    ),
                    related_entity: None,
                    created_at: now,
                };
                if let Err(err) = self.alerts.publish(alert) {
                    warn!(error = %err, "failed to publish health alert");
                }
            }
        }

        HealthReport {
            healthy,
            store_reachable,
            tasks,
            checked_at: now,
        }
    }

    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.health_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.check();
                    if !report.healthy {
                        warn!(store_reachable = report.store_reachable, "engine unhealthy");
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("health loop stopped");
    }
}
