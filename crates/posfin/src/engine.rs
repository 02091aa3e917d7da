//! Composition facade bundling the engine's components behind one handle.
//!
//! The process's composition root constructs the handle with explicit
//! dependencies (store, alert sink, clock, config); the HTTP router and the
//! CLI drive everything through it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AlertSink;
use crate::clock::Clock;
use crate::config::{EngineConfig, LedgerConfig};
use crate::health::{EngineHeartbeat, HealthMonitor, HealthReport, TaskKind};
use crate::lifecycle::domain::{ApplicationId, ApplicationSnapshot, ApplicationStatus};
use crate::lifecycle::executor::{EngineError, TransitionExecutor};
use crate::lifecycle::monitor::{CycleSummary, SweepSummary, TransitionMonitor};
use crate::lifecycle::reconciler::{StatusReconciler, ValidatedStatus};
use crate::lifecycle::store::{LifecycleStore, StatusBreakdownRow};
use crate::revenue::domain::{DailyRevenuePoint, RevenueStats};
use crate::revenue::ledger::{LedgerCycleSummary, RevenueLedger};
use crate::revenue::repository::RevenueStore;

/// Operator-selectable scope for an on-demand run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    StatusTransitions,
    Revenue,
    Health,
    All,
}

/// Outcome of an on-demand check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualCheckReport {
    pub kind: CheckKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CycleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<LedgerCycleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskHeartbeatView {
    pub task: TaskKind,
    pub last_cycle: Option<DateTime<Utc>>,
}

/// Per-status counts and task liveness for the operator dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringStats {
    pub generated_at: DateTime<Utc>,
    pub statuses: Vec<StatusBreakdownRow>,
    pub tasks: Vec<TaskHeartbeatView>,
}

/// An open auction close to expiring unanswered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrgentApplication {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub auction_end_time: Option<DateTime<Utc>>,
    pub minutes_remaining: i64,
}

pub struct EngineHandle<S, A> {
    pub store: Arc<S>,
    pub alerts: Arc<A>,
    pub clock: Arc<dyn Clock>,
    pub heartbeat: Arc<EngineHeartbeat>,
    pub monitor: Arc<TransitionMonitor<S, A>>,
    pub reconciler: Arc<StatusReconciler<S>>,
    pub ledger: Arc<RevenueLedger<S, A>>,
    pub health: Arc<HealthMonitor<S, A>>,
    executor: Arc<TransitionExecutor<S>>,
    config: EngineConfig,
}

impl<S, A> Clone for EngineHandle<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            alerts: Arc::clone(&self.alerts),
            clock: Arc::clone(&self.clock),
            heartbeat: Arc::clone(&self.heartbeat),
            monitor: Arc::clone(&self.monitor),
            reconciler: Arc::clone(&self.reconciler),
            ledger: Arc::clone(&self.ledger),
            health: Arc::clone(&self.health),
            executor: Arc::clone(&self.executor),
            config: self.config.clone(),
        }
    }
}

impl<S, A> EngineHandle<S, A>
where
    S: LifecycleStore + RevenueStore,
    A: AlertSink,
{
    pub fn new(
        store: Arc<S>,
        alerts: Arc<A>,
        clock: Arc<dyn Clock>,
        engine: EngineConfig,
        ledger: LedgerConfig,
    ) -> Self {
        let heartbeat = Arc::new(EngineHeartbeat::default());
        let reconciler = Arc::new(StatusReconciler::new(
            Arc::clone(&store),
            engine.clone(),
            Arc::clone(&clock),
        ));
        let monitor = Arc::new(TransitionMonitor::new(
            Arc::clone(&store),
            Arc::clone(&alerts),
            Arc::clone(&reconciler),
            Arc::clone(&clock),
            engine.clone(),
            Arc::clone(&heartbeat),
        ));
        let ledger = Arc::new(RevenueLedger::new(
            Arc::clone(&store),
            Arc::clone(&alerts),
            Arc::clone(&clock),
            ledger,
            Arc::clone(&heartbeat),
        ));
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&store),
            Arc::clone(&alerts),
            Arc::clone(&heartbeat),
            Arc::clone(&clock),
            engine.clone(),
        ));
        let executor = Arc::new(TransitionExecutor::new(Arc::clone(&store), engine.clone()));

        Self {
            store,
            alerts,
            clock,
            heartbeat,
            monitor,
            reconciler,
            ledger,
            health,
            executor,
            config: engine,
        }
    }

    /// Reconciler-validated status for a single application. Never stale:
    /// drift is corrected before the status is returned.
    pub async fn validated_status(
        &self,
        id: &ApplicationId,
    ) -> Result<ValidatedStatus, EngineError> {
        self.reconciler.validate(id).await
    }

    /// Operator reactivation back into a fresh auction window.
    pub async fn reactivate(&self, id: &ApplicationId) -> Result<ApplicationSnapshot, EngineError> {
        self.executor.reactivate(id, self.clock.now()).await
    }

    /// Applications within the alert horizon of expiring unanswered.
    pub fn urgent(&self) -> Result<Vec<UrgentApplication>, EngineError> {
        let now = self.clock.now();
        let snapshots = self
            .store
            .approaching_deadline(now, self.config.urgency_horizon())?;
        Ok(snapshots
            .into_iter()
            .map(|snapshot| UrgentApplication {
                minutes_remaining: snapshot
                    .auction_end_time
                    .map(|end| (end - now).num_minutes())
                    .unwrap_or_default(),
                application_id: snapshot.id,
                status: snapshot.status,
                auction_end_time: snapshot.auction_end_time,
            })
            .collect())
    }

    /// Operator-invoked on-demand run of the requested cycles.
    pub async fn manual_check(&self, kind: CheckKind) -> ManualCheckReport {
        let mut report = ManualCheckReport {
            kind,
            status: None,
            sweep: None,
            revenue: None,
            health: None,
        };
        match kind {
            CheckKind::StatusTransitions => {
                report.status = Some(self.monitor.run_cycle().await);
            }
            CheckKind::Revenue => {
                report.revenue = Some(self.ledger.run_cycle().await);
            }
            CheckKind::Health => {
                report.health = Some(self.health.check());
            }
            CheckKind::All => {
                report.status = Some(self.monitor.run_cycle().await);
                report.sweep = Some(self.monitor.run_sweep().await);
                report.revenue = Some(self.ledger.run_cycle().await);
                report.health = Some(self.health.check());
            }
        }
        report
    }

    pub fn monitoring_stats(&self) -> Result<MonitoringStats, EngineError> {
        let now = self.clock.now();
        let statuses = self.store.status_breakdown(now)?;
        let tasks = [TaskKind::StatusMonitor, TaskKind::Sweep, TaskKind::RevenueMonitor]
            .into_iter()
            .map(|task| TaskHeartbeatView {
                task,
                last_cycle: self.heartbeat.last(task),
            })
            .collect();
        Ok(MonitoringStats {
            generated_at: now,
            statuses,
            tasks,
        })
    }

    pub fn revenue_stats(&self) -> Result<RevenueStats, EngineError> {
        self.ledger.revenue_stats()
    }

    pub fn revenue_trends(&self) -> Result<Vec<DailyRevenuePoint>, EngineError> {
        self.ledger.revenue_trends()
    }
}
