//! Recomputes the canonical status for one or many applications and corrects
//! persisted drift.
//!
//! Status can be read through paths that bypass the monitor's cadence, so
//! the reconciler is invocable inline on any read path that needs a fresh
//! status; the monitor's sweep is just a cleanup pass over the same rule.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::domain::{ApplicationId, ApplicationStatus, TransitionActor};
use super::executor::{EngineError, ExecutionOutcome, TransitionExecutor};
use super::machine::{decide, integrity_check};
use super::store::{LifecycleStore, StoreError};
use crate::clock::Clock;
use crate::config::EngineConfig;

/// Outcome of validating one application's status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedStatus {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub was_corrected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-application failure recorded during a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationError {
    pub application_id: ApplicationId,
    pub detail: String,
}

/// Aggregate outcome of a batch reconciliation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReconciliationSummary {
    pub total: u64,
    pub corrected: u64,
    pub already_correct: u64,
    pub errored: u64,
    pub errors: Vec<ReconciliationError>,
}

pub struct StatusReconciler<S> {
    store: Arc<S>,
    executor: TransitionExecutor<S>,
    clock: Arc<dyn Clock>,
}

impl<S> StatusReconciler<S>
where
    S: LifecycleStore,
{
    pub fn new(store: Arc<S>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let executor = TransitionExecutor::new(Arc::clone(&store), config);
        Self {
            store,
            executor,
            clock,
        }
    }

    /// Validates one application: recomputes the status implied by current
    /// timestamps and counters, corrects the persisted value if it differs,
    /// and reports whether a correction happened. Idempotent; safe to call
    /// concurrently with the monitor.
    pub async fn validate(&self, id: &ApplicationId) -> Result<ValidatedStatus, EngineError> {
        let now = self.clock.now();
        let snapshot = self.store.fetch(id)?.ok_or(StoreError::NotFound)?;

        if let Some(issue) = integrity_check(&snapshot, now) {
            warn!(
                application_id = %issue.application_id.0,
                detail = %issue.detail,
                "data integrity observation during validation",
            );
            return Ok(ValidatedStatus {
                application_id: id.clone(),
                status: snapshot.status,
                was_corrected: false,
                reason: None,
            });
        }

        let Some(transition) = decide(&snapshot, now) else {
            return Ok(ValidatedStatus {
                application_id: id.clone(),
                status: snapshot.status,
                was_corrected: false,
                reason: None,
            });
        };

        match self
            .executor
            .execute(id, &transition, TransitionActor::Reconciler, now)
            .await?
        {
            ExecutionOutcome::Applied { transition, .. } => Ok(ValidatedStatus {
                application_id: id.clone(),
                status: transition.to,
                was_corrected: true,
                reason: Some(transition.trigger.describe().to_string()),
            }),
            // A concurrent writer corrected it first; defer to the winner.
            ExecutionOutcome::SkippedConflict { current } => Ok(ValidatedStatus {
                application_id: id.clone(),
                status: current,
                was_corrected: false,
                reason: None,
            }),
        }
    }

    /// Validates every application. One application's failure never aborts
    /// the batch; errors are recorded per item and the batch continues.
    pub async fn validate_all(&self) -> Result<ReconciliationSummary, EngineError> {
        let ids = self.store.all_ids()?;
        let mut summary = ReconciliationSummary::default();
        for id in ids {
            summary.total += 1;
            match self.validate(&id).await {
                Ok(outcome) if outcome.was_corrected => summary.corrected += 1,
                Ok(_) => summary.already_correct += 1,
                Err(err) => {
                    summary.errored += 1;
                    warn!(application_id = %id.0, error = %err, "reconciliation failed for application");
                    summary.errors.push(ReconciliationError {
                        application_id: id,
                        detail: err.to_string(),
                    });
                }
            }
        }
        Ok(summary)
    }
}
