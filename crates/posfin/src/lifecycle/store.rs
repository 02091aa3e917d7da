//! Storage abstraction for the lifecycle engine.
//!
//! Connection pooling and retry plumbing live behind these traits; the engine
//! consumes the datastore only as "acquire a transactional handle, run
//! statements, release." Every write path goes through a [`UnitOfWork`] that
//! commits or rolls back atomically.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{ApplicationId, ApplicationSnapshot, ApplicationStatus, BankId, PurchaseRecord};
use crate::audit::StatusAuditLogEntry;
use crate::revenue::domain::{Money, RevenueCollectionEntry};

/// Error enumeration for datastore failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("concurrent update detected")]
    Conflict,
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// Status change applied inside a unit of work. Deadline fields are the new
/// values for the target phase; `None` disarms a deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ApplicationStatus,
    pub auction_end_time: Option<DateTime<Utc>>,
    pub offer_selection_end_time: Option<DateTime<Utc>>,
    pub was_corrected: bool,
    pub correction_reason: Option<String>,
    /// Operator reactivation clears offer/purchase tracking residue so the
    /// revived auction starts clean.
    pub clear_counters: bool,
}

/// One transactional unit of work. A bounded sequence of statements followed
/// by exactly one `commit` or `rollback`; dropping without committing must
/// behave like a rollback.
///
/// Deliberately not `Send`: a unit is acquired, driven, and released without
/// ever being held across a suspension point, so implementations may hold
/// locks or connections that cannot cross threads.
pub trait UnitOfWork {
    /// Re-reads the application row inside the transaction, guarding against
    /// concurrent writers.
    fn fetch_application(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationSnapshot>, StoreError>;

    /// Applies a status update. Fails with [`StoreError::Conflict`] when the
    /// persisted status no longer matches `expected`.
    fn update_status(
        &mut self,
        id: &ApplicationId,
        expected: ApplicationStatus,
        update: StatusUpdate,
    ) -> Result<(), StoreError>;

    fn append_audit(&mut self, entry: StatusAuditLogEntry) -> Result<(), StoreError>;

    /// Purchases of this application with no ledger entry yet.
    fn unbilled_purchases(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Vec<PurchaseRecord>, StoreError>;

    /// Creates a pending ledger entry; the store assigns the identity.
    fn insert_ledger_entry(
        &mut self,
        application_id: &ApplicationId,
        bank_id: &BankId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<RevenueCollectionEntry, StoreError>;

    /// Marks still-submitted offers on this application `deal_lost`,
    /// returning how many were closed.
    fn mark_open_offers_lost(&mut self, id: &ApplicationId) -> Result<u32, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn rollback(self: Box<Self>);
}

/// Per-status aggregate used by the monitoring dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBreakdownRow {
    pub status: ApplicationStatus,
    pub count: u64,
    pub average_age_hours: f64,
}

/// Read-side and transactional access to applications, offers, and purchases.
pub trait LifecycleStore: Send + Sync {
    /// Acquires a transactional handle. Transient acquisition failures
    /// surface as [`StoreError::Unavailable`] and are retried with backoff
    /// by the caller.
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, StoreError>;

    /// Cheap reachability probe for the health loop.
    fn ping(&self) -> Result<(), StoreError>;

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationSnapshot>, StoreError>;

    /// Bounded, indexed scan for applications whose deadline has elapsed or
    /// whose counters imply a due transition. Never a full-table scan in
    /// steady state.
    fn due_for_transition(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApplicationSnapshot>, StoreError>;

    /// Open auctions within `horizon` of an unmet deadline.
    fn approaching_deadline(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<ApplicationSnapshot>, StoreError>;

    /// Completed applications whose offer-selection window has elapsed and
    /// that still carry submitted offers.
    fn elapsed_selection_windows(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApplicationId>, StoreError>;

    fn all_ids(&self) -> Result<Vec<ApplicationId>, StoreError>;

    fn status_breakdown(&self, now: DateTime<Utc>) -> Result<Vec<StatusBreakdownRow>, StoreError>;
}
