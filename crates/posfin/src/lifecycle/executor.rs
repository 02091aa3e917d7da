//! Transactional application of lifecycle transitions.
//!
//! The monitor, the reconciler, and operator actions all execute transitions
//! through this one path, so the optimistic pre-check, the audit append, the
//! phase-deadline bookkeeping, and the ledger-entry creation always happen in
//! the same unit of work, committed or rolled back as a whole.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::domain::{
    ApplicationId, ApplicationSnapshot, ApplicationStatus, Transition, TransitionActor,
    TransitionTrigger,
};
use super::store::{LifecycleStore, StatusUpdate, StoreError, UnitOfWork};
use crate::audit::{AlertError, StatusAuditLogEntry};
use crate::config::EngineConfig;
use crate::revenue::domain::PURCHASE_FEE;

/// Service-level error for the lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Result of attempting a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Applied {
        transition: Transition,
        ledger_entries: usize,
    },
    /// The persisted status no longer matched the expected pre-transition
    /// state; a concurrent writer won and this attempt deferred to it.
    SkippedConflict { current: ApplicationStatus },
}

const ACQUIRE_ATTEMPTS: u32 = 3;
const ACQUIRE_BASE_DELAY_MS: u64 = 50;

/// Acquires a transactional handle, retrying transient failures with a
/// doubling backoff. Never sleeps while holding a handle.
pub(crate) async fn begin_with_backoff<S>(
    store: &S,
) -> Result<Box<dyn UnitOfWork + '_>, StoreError>
where
    S: LifecycleStore + ?Sized,
{
    let mut attempt = 0;
    loop {
        // Two-step match keeps the (non-Send) handle out of the arm that
        // suspends on the backoff sleep.
        let failure = match store.begin() {
            Ok(uow) => return Ok(uow),
            Err(failure) => failure,
        };
        match failure {
            StoreError::Unavailable(detail) if attempt + 1 < ACQUIRE_ATTEMPTS => {
                attempt += 1;
                let delay = ACQUIRE_BASE_DELAY_MS * (1 << attempt);
                warn!(%detail, attempt, delay_ms = delay, "datastore acquisition failed; backing off");
                tokio::time::sleep(StdDuration::from_millis(delay)).await;
            }
            err => return Err(err),
        }
    }
}

enum ApplyResult {
    Applied { ledger_entries: usize },
    Conflict(ApplicationStatus),
}

pub struct TransitionExecutor<S> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S> TransitionExecutor<S>
where
    S: LifecycleStore,
{
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Executes one transition inside a single unit of work. Concurrency
    /// conflicts are skips, not errors; anything else rolls the unit back
    /// and leaves the application for the next cycle.
    pub async fn execute(
        &self,
        id: &ApplicationId,
        transition: &Transition,
        actor: TransitionActor,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let mut uow = begin_with_backoff(self.store.as_ref()).await?;
        match self.apply(uow.as_mut(), id, transition, actor, now) {
            Ok(ApplyResult::Applied { ledger_entries }) => {
                uow.commit()?;
                debug!(
                    application_id = %id.0,
                    from = transition.from.label(),
                    to = transition.to.label(),
                    actor = actor.label(),
                    ledger_entries,
                    "transition applied",
                );
                Ok(ExecutionOutcome::Applied {
                    transition: *transition,
                    ledger_entries,
                })
            }
            Ok(ApplyResult::Conflict(current)) => {
                uow.rollback();
                debug!(
                    application_id = %id.0,
                    expected = transition.from.label(),
                    current = current.label(),
                    "transition skipped: concurrent writer won",
                );
                Ok(ExecutionOutcome::SkippedConflict { current })
            }
            Err(err) => {
                uow.rollback();
                Err(err.into())
            }
        }
    }

    /// Operator-only reactivation into a fresh auction window. Idempotent:
    /// an already-open application is returned unchanged.
    pub async fn reactivate(
        &self,
        id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<ApplicationSnapshot, EngineError> {
        let current = self
            .store
            .fetch(id)?
            .ok_or(StoreError::NotFound)?;
        if current.status == ApplicationStatus::LiveAuction {
            return Ok(current);
        }
        let transition = Transition::reactivation(current.status);
        self.execute(id, &transition, TransitionActor::Operator, now)
            .await?;
        self.store.fetch(id)?.ok_or_else(|| StoreError::NotFound.into())
    }

    fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        id: &ApplicationId,
        transition: &Transition,
        actor: TransitionActor,
        now: DateTime<Utc>,
    ) -> Result<ApplyResult, StoreError> {
        let current = uow.fetch_application(id)?.ok_or(StoreError::NotFound)?;
        if current.status != transition.from {
            return Ok(ApplyResult::Conflict(current.status));
        }

        let update = self.phase_update(transition, &current, actor, now);
        match uow.update_status(id, transition.from, update) {
            Ok(()) => {}
            Err(StoreError::Conflict) => return Ok(ApplyResult::Conflict(current.status)),
            Err(err) => return Err(err),
        }

        uow.append_audit(StatusAuditLogEntry {
            application_id: id.clone(),
            from_status: transition.from,
            to_status: transition.to,
            actor,
            reason: audit_reason(actor, transition.trigger),
            recorded_at: now,
        })?;

        let mut ledger_entries = 0;
        if transition.to == ApplicationStatus::Completed {
            for purchase in uow.unbilled_purchases(id)? {
                uow.insert_ledger_entry(id, &purchase.bank_id, PURCHASE_FEE, now)?;
                ledger_entries += 1;
            }
        }

        if transition.trigger == TransitionTrigger::OperatorReactivation {
            uow.mark_open_offers_lost(id)?;
        }

        Ok(ApplyResult::Applied { ledger_entries })
    }

    /// Deadline bookkeeping for the phase being entered. Exactly one of the
    /// two deadlines stays armed.
    fn phase_update(
        &self,
        transition: &Transition,
        current: &ApplicationSnapshot,
        actor: TransitionActor,
        now: DateTime<Utc>,
    ) -> StatusUpdate {
        let (auction_end_time, offer_selection_end_time, clear_counters) = match transition.to {
            ApplicationStatus::LiveAuction => {
                (Some(now + self.config.auction_window()), None, true)
            }
            ApplicationStatus::Completed => {
                // Offers on the table but no purchase yet: the business now
                // chooses among them within the selection window.
                let selection = if current.purchases_count == 0 && current.offers_count > 0 {
                    Some(now + self.config.selection_window())
                } else {
                    None
                };
                (None, selection, false)
            }
            ApplicationStatus::Ignored => (None, None, false),
        };

        let corrected = actor == TransitionActor::Reconciler;
        StatusUpdate {
            status: transition.to,
            auction_end_time,
            offer_selection_end_time,
            was_corrected: corrected,
            correction_reason: corrected.then(|| audit_reason(actor, transition.trigger)),
            clear_counters,
        }
    }
}

fn audit_reason(actor: TransitionActor, trigger: TransitionTrigger) -> String {
    match actor {
        TransitionActor::Monitor => format!("scheduled transition: {}", trigger.describe()),
        TransitionActor::Reconciler => format!("automatic correction: {}", trigger.describe()),
        TransitionActor::Operator => trigger.describe().to_string(),
    }
}
