//! Storage abstraction for the revenue collection ledger.

use chrono::{DateTime, Utc};

use super::domain::{CollectionStatus, DailyRevenuePoint, Money, RevenueCollectionEntry, RevenueStats};
use crate::lifecycle::domain::ApplicationId;
use crate::lifecycle::store::StoreError;

/// Ledger-side access. Maintenance operations are single-statement updates
/// guarded by an expected-status pre-check, mirroring the optimistic
/// discipline of the lifecycle unit of work.
pub trait RevenueStore: Send + Sync {
    /// Pending entries whose last update is at or before `cutoff`.
    fn pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RevenueCollectionEntry>, StoreError>;

    /// Collected entries not yet examined by verification.
    fn collected_unverified(&self) -> Result<Vec<RevenueCollectionEntry>, StoreError>;

    fn failed_entries(&self) -> Result<Vec<RevenueCollectionEntry>, StoreError>;

    /// Moves an entry to `failed` with a reason. Conflict when the persisted
    /// status no longer matches `expected`.
    fn mark_failed(
        &self,
        entry_id: &str,
        expected: CollectionStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Marks a collected entry verified and recognizes its amount on the
    /// owning application's running total.
    fn mark_verified(
        &self,
        entry_id: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Flags a collected entry as failing verification without touching its
    /// amount or status.
    fn flag_unverified(
        &self,
        entry_id: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Resets a failed entry to `pending` and increments its retry counter,
    /// returning the new count.
    fn reset_for_retry(&self, entry_id: &str, now: DateTime<Utc>) -> Result<u32, StoreError>;

    /// Records that an entry has exhausted its retries so it is alerted
    /// exactly once.
    fn note_exhausted(&self, entry_id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Creates pending entries for any purchase that has none, returning the
    /// entries created. Keeps the ledger reconciled when a purchase lands
    /// after its application already completed.
    fn create_missing_entries(
        &self,
        fee: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<RevenueCollectionEntry>, StoreError>;

    fn entries_for(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<RevenueCollectionEntry>, StoreError>;

    fn stats(&self) -> Result<RevenueStats, StoreError>;

    /// Daily aggregates for the trailing `days`, oldest first. Days with no
    /// activity appear as zero points so gaps do not skew the series.
    fn daily_series(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<DailyRevenuePoint>, StoreError>;
}
