//! Deadline-driven background monitor.
//!
//! Two cadences share this type: the fast cycle scans for due transitions
//! and raises urgency alerts; the slow sweep runs batch reconciliation and
//! expires elapsed offer-selection windows. Each cycle owns its own unit of
//! work per application; a failure on one application never aborts the rest
//! of the cycle.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::domain::{ApplicationSnapshot, TransitionActor};
use super::executor::{begin_with_backoff, ExecutionOutcome, TransitionExecutor};
use super::machine::{decide, integrity_check};
use super::reconciler::{ReconciliationSummary, StatusReconciler};
use super::store::LifecycleStore;
use crate::audit::{AlertDeduper, AlertSeverity, AlertSink, AlertType, SystemAlert};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::health::{EngineHeartbeat, TaskKind};

/// Counters from one fast monitor cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CycleSummary {
    pub examined: u64,
    pub transitioned: u64,
    pub skipped_conflicts: u64,
    pub integrity_issues: u64,
    pub alerts_raised: u64,
    pub errors: u64,
}

/// Counters from one slow sweep.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SweepSummary {
    pub reconciliation: ReconciliationSummary,
    pub selection_windows_expired: u64,
    pub offers_closed: u64,
    pub errors: u64,
}

pub struct TransitionMonitor<S, A> {
    store: Arc<S>,
    alerts: Arc<A>,
    reconciler: Arc<StatusReconciler<S>>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    executor: TransitionExecutor<S>,
    heartbeat: Arc<EngineHeartbeat>,
    deduper: Mutex<AlertDeduper>,
}

impl<S, A> TransitionMonitor<S, A>
where
    S: LifecycleStore,
    A: AlertSink,
{
    pub fn new(
        store: Arc<S>,
        alerts: Arc<A>,
        reconciler: Arc<StatusReconciler<S>>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        heartbeat: Arc<EngineHeartbeat>,
    ) -> Self {
        let executor = TransitionExecutor::new(Arc::clone(&store), config.clone());
        Self {
            store,
            alerts,
            reconciler,
            clock,
            config,
            executor,
            heartbeat,
            deduper: Mutex::new(AlertDeduper::default()),
        }
    }

    /// One fast cycle: apply due transitions, then scan for auctions close
    /// to expiring unanswered.
    pub async fn run_cycle(&self) -> CycleSummary {
        let now = self.clock.now();
        let mut summary = CycleSummary::default();

        let due = match self.store.due_for_transition(now, self.config.scan_limit) {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err, "due-transition scan failed; retrying next cycle");
                summary.errors += 1;
                self.heartbeat.record(TaskKind::StatusMonitor, now);
                return summary;
            }
        };

        for snapshot in due {
            summary.examined += 1;

            if let Some(issue) = integrity_check(&snapshot, now) {
                summary.integrity_issues += 1;
                warn!(
                    application_id = %issue.application_id.0,
                    detail = %issue.detail,
                    "contradictory snapshot skipped",
                );
                if self.should_alert(&issue.application_id.0, AlertType::DataIntegrity) {
                    self.publish(
                        SystemAlert {
                            alert_type: AlertType::DataIntegrity,
                            severity: AlertSeverity::Warning,
                            title: "Contradictory application state".to_string(),
                            message: issue.detail.clone(),
                            related_entity: Some(issue.application_id.0.clone()),
                            created_at: now,
                        },
                        &mut summary,
                    );
                }
                continue;
            }

            let Some(transition) = decide(&snapshot, now) else {
                continue;
            };

            match self
                .executor
                .execute(&snapshot.id, &transition, TransitionActor::Monitor, now)
                .await
            {
                Ok(ExecutionOutcome::Applied { .. }) => summary.transitioned += 1,
                Ok(ExecutionOutcome::SkippedConflict { .. }) => summary.skipped_conflicts += 1,
                Err(err) => {
                    summary.errors += 1;
                    warn!(
                        application_id = %snapshot.id.0,
                        error = %err,
                        "transition failed; left for the next cycle",
                    );
                }
            }
        }

        self.urgency_scan(&mut summary);
        self.heartbeat.record(TaskKind::StatusMonitor, now);
        debug!(
            examined = summary.examined,
            transitioned = summary.transitioned,
            conflicts = summary.skipped_conflicts,
            "monitor cycle finished",
        );
        summary
    }

    /// One slow sweep: batch drift repair plus selection-window expiry.
    pub async fn run_sweep(&self) -> SweepSummary {
        let now = self.clock.now();
        let mut summary = SweepSummary::default();

        match self.reconciler.validate_all().await {
            Ok(reconciliation) => summary.reconciliation = reconciliation,
            Err(err) => {
                error!(error = %err, "batch reconciliation failed");
                summary.errors += 1;
            }
        }

        match self.store.elapsed_selection_windows(now) {
            Ok(elapsed) => {
                for id in elapsed {
                    match begin_with_backoff(self.store.as_ref()).await {
                        Ok(mut uow) => {
                            let closed = match uow.mark_open_offers_lost(&id) {
                                Ok(closed) => closed,
                                Err(err) => {
                                    uow.rollback();
                                    summary.errors += 1;
                                    warn!(application_id = %id.0, error = %err, "offer expiry failed");
                                    continue;
                                }
                            };
                            match uow.commit() {
                                Ok(()) => {
                                    summary.selection_windows_expired += 1;
                                    summary.offers_closed += u64::from(closed);
                                    info!(
                                        application_id = %id.0,
                                        offers_closed = closed,
                                        "selection window elapsed; open offers marked lost",
                                    );
                                }
                                Err(err) => {
                                    summary.errors += 1;
                                    warn!(application_id = %id.0, error = %err, "offer expiry commit failed");
                                }
                            }
                        }
                        Err(err) => {
                            summary.errors += 1;
                            warn!(application_id = %id.0, error = %err, "offer expiry acquisition failed");
                        }
                    }
                }
            }
            Err(err) => {
                summary.errors += 1;
                error!(error = %err, "selection-window scan failed");
            }
        }

        self.heartbeat.record(TaskKind::Sweep, now);
        summary
    }

    fn urgency_scan(&self, summary: &mut CycleSummary) {
        let now = self.clock.now();
        let urgent = match self
            .store
            .approaching_deadline(now, self.config.urgency_horizon())
        {
            Ok(urgent) => urgent,
            Err(err) => {
                summary.errors += 1;
                warn!(error = %err, "urgency scan failed");
                return;
            }
        };

        for snapshot in urgent {
            if !self.should_alert(&snapshot.id.0, AlertType::DeadlineApproaching) {
                continue;
            }
            self.publish(deadline_alert(&snapshot, now), summary);
        }
    }

    fn should_alert(&self, entity: &str, alert_type: AlertType) -> bool {
        self.deduper
            .lock()
            .expect("deduper mutex poisoned")
            .should_publish(entity, alert_type, self.clock.now(), self.config.alert_cooldown())
    }

    fn publish(&self, alert: SystemAlert, summary: &mut CycleSummary) {
        match self.alerts.publish(alert) {
            Ok(()) => summary.alerts_raised += 1,
            Err(err) => {
                summary.errors += 1;
                warn!(error = %err, "alert publish failed");
            }
        }
    }

    /// Fast cycle loop. An in-flight cycle always finishes before the stop
    /// signal is honored.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.status_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("status monitor stopped");
    }

    /// Slow sweep loop.
    pub async fn run_sweep_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_sweep().await;
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("sweep loop stopped");
    }
}

fn deadline_alert(snapshot: &ApplicationSnapshot, now: chrono::DateTime<chrono::Utc>) -> SystemAlert {
    let minutes_remaining = snapshot
        .auction_end_time
        .map(|end| (end - now).num_minutes())
        .unwrap_or_default();
    SystemAlert {
        alert_type: AlertType::DeadlineApproaching,
        severity: AlertSeverity::Warning,
        title: "Auction closing with no offers".to_string(),
        message: format!(
            "application {} has no offers and its auction window closes in {minutes_remaining} minutes",
            snapshot.id.0,
        ),
        related_entity: Some(snapshot.id.0.clone()),
        created_at: now,
    }
}
