//! Revenue collection ledger maintenance.
//!
//! Entries are created transactionally by the purchase transition; this
//! service owns everything after creation: timeouts, verification against
//! the fixed fee, bounded retries, and the daily anomaly scan.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::anomaly::{self, RevenueAnomaly};
use super::domain::{CollectionStatus, DailyRevenuePoint, RevenueStats, PURCHASE_FEE};
use super::repository::RevenueStore;
use crate::audit::{AlertDeduper, AlertSeverity, AlertSink, AlertType, SystemAlert};
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::health::{EngineHeartbeat, TaskKind};
use crate::lifecycle::executor::EngineError;

const EXHAUSTED_NOTE: &str = "collection retries exhausted";

/// Counters from one ledger maintenance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LedgerCycleSummary {
    pub backfilled: u64,
    pub timed_out: u64,
    pub verified: u64,
    pub flagged: u64,
    pub retried: u64,
    pub exhausted: u64,
    pub anomalies: u64,
    pub errors: u64,
}

pub struct RevenueLedger<S, A> {
    store: Arc<S>,
    alerts: Arc<A>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    heartbeat: Arc<EngineHeartbeat>,
    deduper: Mutex<AlertDeduper>,
}

impl<S, A> RevenueLedger<S, A>
where
    S: RevenueStore,
    A: AlertSink,
{
    pub fn new(
        store: Arc<S>,
        alerts: Arc<A>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
        heartbeat: Arc<EngineHeartbeat>,
    ) -> Self {
        Self {
            store,
            alerts,
            clock,
            config,
            heartbeat,
            deduper: Mutex::new(AlertDeduper::default()),
        }
    }

    /// One maintenance cycle. Phases run independently; a failure in one
    /// never skips the others.
    pub async fn run_cycle(&self) -> LedgerCycleSummary {
        let now = self.clock.now();
        let mut summary = LedgerCycleSummary::default();

        self.backfill(&mut summary);
        self.expire_stuck_pending(&mut summary);
        self.verify_collected(&mut summary);
        self.retry_failed(&mut summary);
        self.scan_anomalies(&mut summary);

        self.heartbeat.record(TaskKind::RevenueMonitor, now);
        debug!(
            timed_out = summary.timed_out,
            verified = summary.verified,
            retried = summary.retried,
            "ledger cycle finished",
        );
        summary
    }

    /// Creates entries for purchases that landed after their application
    /// already completed, keeping the ledger reconciled with purchases.
    fn backfill(&self, summary: &mut LedgerCycleSummary) {
        let now = self.clock.now();
        match self.store.create_missing_entries(PURCHASE_FEE, now) {
            Ok(created) => {
                for entry in &created {
                    info!(
                        entry_id = %entry.id,
                        application_id = %entry.application_id.0,
                        bank_id = %entry.bank_id.0,
                        "ledger entry backfilled for unbilled purchase",
                    );
                }
                summary.backfilled += created.len() as u64;
            }
            Err(err) => {
                summary.errors += 1;
                error!(error = %err, "ledger backfill failed");
            }
        }
    }

    /// Entries pending longer than the timeout are failed with a "timeout"
    /// reason and surfaced to the operator, never silently retried.
    fn expire_stuck_pending(&self, summary: &mut LedgerCycleSummary) {
        let now = self.clock.now();
        let cutoff = now - self.config.pending_timeout();
        let stuck = match self.store.pending_older_than(cutoff) {
            Ok(stuck) => stuck,
            Err(err) => {
                summary.errors += 1;
                error!(error = %err, "pending-timeout scan failed");
                return;
            }
        };

        for entry in stuck {
            match self
                .store
                .mark_failed(&entry.id, CollectionStatus::Pending, "timeout", now)
            {
                Ok(()) => {
                    summary.timed_out += 1;
                    self.publish(
                        SystemAlert {
                            alert_type: AlertType::CollectionTimeout,
                            severity: AlertSeverity::Warning,
                            title: "Fee collection timed out".to_string(),
                            message: format!(
                                "entry {} for application {} stayed pending past the timeout",
                                entry.id, entry.application_id.0,
                            ),
                            related_entity: Some(entry.id.clone()),
                            created_at: now,
                        },
                        summary,
                    );
                }
                // Another writer moved the entry; nothing to do.
                Err(crate::lifecycle::store::StoreError::Conflict) => {}
                Err(err) => {
                    summary.errors += 1;
                    warn!(entry_id = %entry.id, error = %err, "timeout marking failed");
                }
            }
        }
    }

    /// Collected entries are checked against the fixed fee. Verification
    /// never mutates the amount.
    fn verify_collected(&self, summary: &mut LedgerCycleSummary) {
        let now = self.clock.now();
        let unverified = match self.store.collected_unverified() {
            Ok(unverified) => unverified,
            Err(err) => {
                summary.errors += 1;
                error!(error = %err, "verification scan failed");
                return;
            }
        };

        for entry in unverified {
            if entry.amount == PURCHASE_FEE {
                match self.store.mark_verified(
                    &entry.id,
                    "collected amount matches the expected fee",
                    now,
                ) {
                    Ok(()) => summary.verified += 1,
                    Err(err) => {
                        summary.errors += 1;
                        warn!(entry_id = %entry.id, error = %err, "verification failed");
                    }
                }
            } else {
                let note = format!(
                    "expected {PURCHASE_FEE}, collected {}",
                    entry.amount,
                );
                match self.store.flag_unverified(&entry.id, &note, now) {
                    Ok(()) => {
                        summary.flagged += 1;
                        self.publish(
                            SystemAlert {
                                alert_type: AlertType::CollectionVerification,
                                severity: AlertSeverity::Critical,
                                title: "Collected fee does not match the expected amount"
                                    .to_string(),
                                message: format!("entry {}: {note}", entry.id),
                                related_entity: Some(entry.id.clone()),
                                created_at: now,
                            },
                            summary,
                        );
                    }
                    Err(err) => {
                        summary.errors += 1;
                        warn!(entry_id = %entry.id, error = %err, "verification flag failed");
                    }
                }
            }
        }
    }

    /// Failed entries get bounded retries; beyond the bound they stay failed
    /// permanently and are alerted exactly once.
    fn retry_failed(&self, summary: &mut LedgerCycleSummary) {
        let now = self.clock.now();
        let failed = match self.store.failed_entries() {
            Ok(failed) => failed,
            Err(err) => {
                summary.errors += 1;
                error!(error = %err, "failed-entry scan failed");
                return;
            }
        };

        for entry in failed {
            if entry
                .verification_notes
                .as_deref()
                .is_some_and(|note| note == EXHAUSTED_NOTE)
            {
                continue;
            }

            let within_window = now - entry.created_at <= self.config.retry_window();
            if entry.retry_count < self.config.max_retries && within_window {
                // Space retries out instead of bouncing a fresh failure
                // straight back to pending in the same cycle.
                if now - entry.updated_at < self.config.retry_delay() {
                    continue;
                }
                match self.store.reset_for_retry(&entry.id, now) {
                    Ok(count) => {
                        summary.retried += 1;
                        debug!(entry_id = %entry.id, retry_count = count, "collection retry scheduled");
                    }
                    Err(err) => {
                        summary.errors += 1;
                        warn!(entry_id = %entry.id, error = %err, "retry reset failed");
                    }
                }
            } else {
                match self.store.note_exhausted(&entry.id, now) {
                    Ok(()) => {
                        summary.exhausted += 1;
                        self.publish(
                            SystemAlert {
                                alert_type: AlertType::RetryExhausted,
                                severity: AlertSeverity::Critical,
                                title: "Fee collection permanently failed".to_string(),
                                message: format!(
                                    "entry {} for application {} exhausted its retries (count {})",
                                    entry.id, entry.application_id.0, entry.retry_count,
                                ),
                                related_entity: Some(entry.id.clone()),
                                created_at: now,
                            },
                            summary,
                        );
                    }
                    Err(err) => {
                        summary.errors += 1;
                        warn!(entry_id = %entry.id, error = %err, "exhaustion marking failed");
                    }
                }
            }
        }
    }

    fn scan_anomalies(&self, summary: &mut LedgerCycleSummary) {
        let now = self.clock.now();
        let series = match self.store.daily_series(now, self.config.anomaly_window_days) {
            Ok(series) => series,
            Err(err) => {
                summary.errors += 1;
                error!(error = %err, "daily-series query failed");
                return;
            }
        };

        for anomaly in anomaly::detect(&series, self.config.anomaly_threshold) {
            let entity = format!("{}:{}", anomaly.day, anomaly.metric.label());
            let should_publish = self
                .deduper
                .lock()
                .expect("deduper mutex poisoned")
                .should_publish(&entity, AlertType::RevenueAnomaly, now, chrono::Duration::hours(24));
            if should_publish {
                summary.anomalies += 1;
                self.publish(anomaly_alert(&anomaly, now), summary);
            }
        }
    }

    pub fn revenue_stats(&self) -> Result<RevenueStats, EngineError> {
        Ok(self.store.stats()?)
    }

    pub fn revenue_trends(&self) -> Result<Vec<DailyRevenuePoint>, EngineError> {
        let now = self.clock.now();
        Ok(self
            .store
            .daily_series(now, self.config.anomaly_window_days)?)
    }

    pub async fn run(
        self: Arc<Self>,
        interval: std::time::Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
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
        info!("revenue monitor stopped");
    }

    fn publish(&self, alert: SystemAlert, summary: &mut LedgerCycleSummary) {
        if let Err(err) = self.alerts.publish(alert) {
            summary.errors += 1;
            warn!(error = %err, "alert publish failed");
        }
    }
}

fn anomaly_alert(anomaly: &RevenueAnomaly, now: chrono::DateTime<chrono::Utc>) -> SystemAlert {
    SystemAlert {
        alert_type: AlertType::RevenueAnomaly,
        severity: AlertSeverity::Warning,
        title: format!("Unusual daily {}", anomaly.metric.label()),
        message: format!(
            "{}: observed {:.0} against a trailing mean of {:.0} (std dev {:.0})",
            anomaly.day, anomaly.observed, anomaly.mean, anomaly.std_dev,
        ),
        related_entity: Some(anomaly.day.to_string()),
        created_at: now,
    }
}
