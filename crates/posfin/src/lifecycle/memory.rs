//! In-memory datastore adapter.
//!
//! Backs the service in demo deployments and gives tests a store with real
//! unit-of-work semantics: a unit of work stages changes against a copy of
//! the state and publishes them atomically on commit, so a rollback (or a
//! drop) leaves nothing behind.

use std::collections::BTreeMap;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use super::domain::{
    ApplicationId, ApplicationSnapshot, ApplicationStatus, BankId, OfferRecord, OfferStatus,
    PurchaseRecord,
};
use super::store::{LifecycleStore, StatusBreakdownRow, StatusUpdate, StoreError, UnitOfWork};
use crate::audit::{AlertError, AlertSink, StatusAuditLogEntry, SystemAlert};
use crate::revenue::domain::{
    CollectionStatus, DailyRevenuePoint, Money, RevenueCollectionEntry, RevenueStats, PURCHASE_FEE,
};
use crate::revenue::repository::RevenueStore;

#[derive(Debug, Clone)]
struct ApplicationRow {
    id: ApplicationId,
    status: ApplicationStatus,
    submitted_at: DateTime<Utc>,
    auction_end_time: Option<DateTime<Utc>>,
    offer_selection_end_time: Option<DateTime<Utc>>,
    offers_count: u32,
    purchases_count: u32,
    revenue_collected: Money,
    was_corrected: bool,
    correction_reason: Option<String>,
}

impl ApplicationRow {
    fn snapshot(&self) -> ApplicationSnapshot {
        ApplicationSnapshot {
            id: self.id.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
            auction_end_time: self.auction_end_time,
            offer_selection_end_time: self.offer_selection_end_time,
            offers_count: self.offers_count,
            purchases_count: self.purchases_count,
            revenue_collected: self.revenue_collected,
            was_corrected: self.was_corrected,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct MarketState {
    applications: BTreeMap<ApplicationId, ApplicationRow>,
    offers: Vec<OfferRecord>,
    purchases: Vec<PurchaseRecord>,
    ledger: BTreeMap<String, RevenueCollectionEntry>,
    audit: Vec<StatusAuditLogEntry>,
    alerts: Vec<SystemAlert>,
    entry_sequence: u64,
}

impl MarketState {
    fn has_entry_for(&self, application_id: &ApplicationId, bank_id: &BankId) -> bool {
        self.ledger
            .values()
            .any(|entry| entry.application_id == *application_id && entry.bank_id == *bank_id)
    }

    fn next_entry_id(&mut self) -> String {
        self.entry_sequence += 1;
        format!("rce-{:06}", self.entry_sequence)
    }
}

/// Seed describing an application created by the external submission API.
#[derive(Debug, Clone)]
pub struct ApplicationSeed {
    pub id: ApplicationId,
    pub submitted_at: DateTime<Utc>,
    pub auction_end_time: Option<DateTime<Utc>>,
    pub status: ApplicationStatus,
}

impl ApplicationSeed {
    /// An application entering the open-bidding phase at `submitted_at` with
    /// the given auction window.
    pub fn open(id: &str, submitted_at: DateTime<Utc>, auction_window: Duration) -> Self {
        Self {
            id: ApplicationId(id.to_string()),
            submitted_at,
            auction_end_time: Some(submitted_at + auction_window),
            status: ApplicationStatus::LiveAuction,
        }
    }
}

/// Shared in-memory marketplace store implementing the lifecycle, revenue,
/// and alert interfaces against one mutex-guarded state.
#[derive(Default, Clone)]
pub struct InMemoryMarketStore {
    state: Arc<Mutex<MarketState>>,
}

impl InMemoryMarketStore {
    fn state(&self) -> Result<MutexGuard<'_, MarketState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("market state mutex poisoned".to_string()))
    }

    /// Seeds an application row, simulating the external submission API.
    pub fn seed_application(&self, seed: ApplicationSeed) {
        let mut state = self.state.lock().expect("market state mutex poisoned");
        state.applications.insert(
            seed.id.clone(),
            ApplicationRow {
                id: seed.id,
                status: seed.status,
                submitted_at: seed.submitted_at,
                auction_end_time: seed.auction_end_time,
                offer_selection_end_time: None,
                offers_count: 0,
                purchases_count: 0,
                revenue_collected: Money::ZERO,
                was_corrected: false,
                correction_reason: None,
            },
        );
    }

    /// Records an offer, simulating the external offer API (which also
    /// maintains the monotonic counter).
    pub fn record_offer(&self, offer: OfferRecord) {
        let mut state = self.state.lock().expect("market state mutex poisoned");
        if let Some(row) = state.applications.get_mut(&offer.application_id) {
            row.offers_count += 1;
        }
        state.offers.push(offer);
    }

    /// Records a bank purchase, simulating the external purchase API.
    pub fn record_purchase(&self, purchase: PurchaseRecord) {
        let mut state = self.state.lock().expect("market state mutex poisoned");
        if let Some(row) = state.applications.get_mut(&purchase.application_id) {
            row.purchases_count += 1;
        }
        state.purchases.push(purchase);
    }

    /// Records the external payment processor collecting a fee: the entry
    /// moves to `collected` carrying the amount actually received.
    pub fn record_collection(
        &self,
        entry_id: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let entry = state.ledger.get_mut(entry_id).ok_or(StoreError::NotFound)?;
        if entry.status != CollectionStatus::Pending {
            return Err(StoreError::Conflict);
        }
        entry.status = CollectionStatus::Collected;
        entry.amount = amount;
        entry.collected_at = Some(now);
        entry.updated_at = now;
        Ok(())
    }

    pub fn application(&self, id: &ApplicationId) -> Option<ApplicationSnapshot> {
        let state = self.state.lock().expect("market state mutex poisoned");
        state.applications.get(id).map(ApplicationRow::snapshot)
    }

    pub fn audit_log(&self) -> Vec<StatusAuditLogEntry> {
        self.state.lock().expect("market state mutex poisoned").audit.clone()
    }

    pub fn alerts(&self) -> Vec<SystemAlert> {
        self.state.lock().expect("market state mutex poisoned").alerts.clone()
    }

    pub fn offers_for(&self, id: &ApplicationId) -> Vec<OfferRecord> {
        let state = self.state.lock().expect("market state mutex poisoned");
        state
            .offers
            .iter()
            .filter(|offer| offer.application_id == *id)
            .cloned()
            .collect()
    }

    pub fn ledger_entries(&self) -> Vec<RevenueCollectionEntry> {
        let state = self.state.lock().expect("market state mutex poisoned");
        state.ledger.values().cloned().collect()
    }
}

struct MemoryUnitOfWork<'a> {
    guard: MutexGuard<'a, MarketState>,
    staged: MarketState,
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn fetch_application(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationSnapshot>, StoreError> {
        Ok(self.staged.applications.get(id).map(ApplicationRow::snapshot))
    }

    fn update_status(
        &mut self,
        id: &ApplicationId,
        expected: ApplicationStatus,
        update: StatusUpdate,
    ) -> Result<(), StoreError> {
        let row = self
            .staged
            .applications
            .get_mut(id)
            .ok_or(StoreError::NotFound)?;
        if row.status != expected {
            return Err(StoreError::Conflict);
        }
        row.status = update.status;
        row.auction_end_time = update.auction_end_time;
        row.offer_selection_end_time = update.offer_selection_end_time;
        row.was_corrected = update.was_corrected;
        row.correction_reason = update.correction_reason;
        if update.clear_counters {
            row.offers_count = 0;
            row.purchases_count = 0;
        }
        Ok(())
    }

    fn append_audit(&mut self, entry: StatusAuditLogEntry) -> Result<(), StoreError> {
        self.staged.audit.push(entry);
        Ok(())
    }

    fn unbilled_purchases(
        &mut self,
        id: &ApplicationId,
    ) -> Result<Vec<PurchaseRecord>, StoreError> {
        let unbilled = self
            .staged
            .purchases
            .iter()
            .filter(|purchase| {
                purchase.application_id == *id
                    && !self.staged.has_entry_for(&purchase.application_id, &purchase.bank_id)
            })
            .cloned()
            .collect();
        Ok(unbilled)
    }

    fn insert_ledger_entry(
        &mut self,
        application_id: &ApplicationId,
        bank_id: &BankId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<RevenueCollectionEntry, StoreError> {
        let id = self.staged.next_entry_id();
        let entry = RevenueCollectionEntry {
            id: id.clone(),
            application_id: application_id.clone(),
            bank_id: bank_id.clone(),
            amount,
            status: CollectionStatus::Pending,
            retry_count: 0,
            verified: None,
            verification_notes: None,
            collected_at: None,
            created_at: now,
            updated_at: now,
        };
        self.staged.ledger.insert(id, entry.clone());
        Ok(entry)
    }

    fn mark_open_offers_lost(&mut self, id: &ApplicationId) -> Result<u32, StoreError> {
        let mut closed = 0;
        for offer in self
            .staged
            .offers
            .iter_mut()
            .filter(|offer| offer.application_id == *id && offer.status == OfferStatus::Submitted)
        {
            offer.status = OfferStatus::DealLost;
            closed += 1;
        }
        Ok(closed)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let staged = mem::take(&mut self.staged);
        *self.guard = staged;
        Ok(())
    }

    fn rollback(self: Box<Self>) {}
}

impl LifecycleStore for InMemoryMarketStore {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, StoreError> {
        let guard = self.state()?;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.state().map(|_| ())
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationSnapshot>, StoreError> {
        Ok(self.state()?.applications.get(id).map(ApplicationRow::snapshot))
    }

    fn due_for_transition(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApplicationSnapshot>, StoreError> {
        let state = self.state()?;
        let due = state
            .applications
            .values()
            .filter(|row| match row.status {
                ApplicationStatus::LiveAuction => {
                    row.offers_count > 0
                        || row.purchases_count > 0
                        || row.auction_end_time.is_some_and(|end| end <= now)
                }
                // Drift candidates: ignored rows whose counters imply completion.
                ApplicationStatus::Ignored => row.offers_count > 0 || row.purchases_count > 0,
                ApplicationStatus::Completed => false,
            })
            .take(limit)
            .map(ApplicationRow::snapshot)
            .collect();
        Ok(due)
    }

    fn approaching_deadline(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<ApplicationSnapshot>, StoreError> {
        let state = self.state()?;
        let cutoff = now + horizon;
        let urgent = state
            .applications
            .values()
            .filter(|row| {
                row.status == ApplicationStatus::LiveAuction
                    && row.offers_count == 0
                    && row.purchases_count == 0
                    && row
                        .auction_end_time
                        .is_some_and(|end| end > now && end <= cutoff)
            })
            .map(ApplicationRow::snapshot)
            .collect();
        Ok(urgent)
    }

    fn elapsed_selection_windows(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApplicationId>, StoreError> {
        let state = self.state()?;
        let elapsed = state
            .applications
            .values()
            .filter(|row| {
                row.status == ApplicationStatus::Completed
                    && row
                        .offer_selection_end_time
                        .is_some_and(|end| end <= now)
                    && state.offers.iter().any(|offer| {
                        offer.application_id == row.id && offer.status == OfferStatus::Submitted
                    })
            })
            .map(|row| row.id.clone())
            .collect();
        Ok(elapsed)
    }

    fn all_ids(&self) -> Result<Vec<ApplicationId>, StoreError> {
        Ok(self.state()?.applications.keys().cloned().collect())
    }

    fn status_breakdown(&self, now: DateTime<Utc>) -> Result<Vec<StatusBreakdownRow>, StoreError> {
        let state = self.state()?;
        let mut grouped: BTreeMap<&'static str, (ApplicationStatus, u64, f64)> = BTreeMap::new();
        for row in state.applications.values() {
            let age_hours = (now - row.submitted_at).num_seconds() as f64 / 3600.0;
            let slot = grouped
                .entry(row.status.label())
                .or_insert((row.status, 0, 0.0));
            slot.1 += 1;
            slot.2 += age_hours;
        }
        Ok(grouped
            .into_values()
            .map(|(status, count, total_age)| StatusBreakdownRow {
                status,
                count,
                average_age_hours: total_age / count as f64,
            })
            .collect())
    }
}

impl RevenueStore for InMemoryMarketStore {
    fn pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RevenueCollectionEntry>, StoreError> {
        let state = self.state()?;
        Ok(state
            .ledger
            .values()
            .filter(|entry| entry.pending_since(cutoff))
            .cloned()
            .collect())
    }

    fn collected_unverified(&self) -> Result<Vec<RevenueCollectionEntry>, StoreError> {
        let state = self.state()?;
        Ok(state
            .ledger
            .values()
            .filter(|entry| entry.status == CollectionStatus::Collected && entry.verified.is_none())
            .cloned()
            .collect())
    }

    fn failed_entries(&self) -> Result<Vec<RevenueCollectionEntry>, StoreError> {
        let state = self.state()?;
        Ok(state
            .ledger
            .values()
            .filter(|entry| entry.status == CollectionStatus::Failed)
            .cloned()
            .collect())
    }

    fn mark_failed(
        &self,
        entry_id: &str,
        expected: CollectionStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let entry = state.ledger.get_mut(entry_id).ok_or(StoreError::NotFound)?;
        if entry.status != expected {
            return Err(StoreError::Conflict);
        }
        entry.status = CollectionStatus::Failed;
        entry.verification_notes = Some(reason.to_string());
        entry.updated_at = now;
        Ok(())
    }

    fn mark_verified(
        &self,
        entry_id: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let entry = state.ledger.get_mut(entry_id).ok_or(StoreError::NotFound)?;
        if entry.status != CollectionStatus::Collected {
            return Err(StoreError::Conflict);
        }
        entry.status = CollectionStatus::Verified;
        entry.verified = Some(true);
        entry.verification_notes = Some(note.to_string());
        entry.updated_at = now;
        let application_id = entry.application_id.clone();
        let amount = entry.amount;
        if let Some(row) = state.applications.get_mut(&application_id) {
            row.revenue_collected = row.revenue_collected.saturating_add(amount);
        }
        Ok(())
    }

    fn flag_unverified(
        &self,
        entry_id: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let entry = state.ledger.get_mut(entry_id).ok_or(StoreError::NotFound)?;
        if entry.status != CollectionStatus::Collected {
            return Err(StoreError::Conflict);
        }
        entry.verified = Some(false);
        entry.verification_notes = Some(note.to_string());
        entry.updated_at = now;
        Ok(())
    }

    fn reset_for_retry(&self, entry_id: &str, now: DateTime<Utc>) -> Result<u32, StoreError> {
        let mut state = self.state()?;
        let entry = state.ledger.get_mut(entry_id).ok_or(StoreError::NotFound)?;
        if entry.status != CollectionStatus::Failed {
            return Err(StoreError::Conflict);
        }
        entry.status = CollectionStatus::Pending;
        entry.retry_count += 1;
        entry.verified = None;
        entry.verification_notes = None;
        entry.updated_at = now;
        Ok(entry.retry_count)
    }

    fn note_exhausted(&self, entry_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let entry = state.ledger.get_mut(entry_id).ok_or(StoreError::NotFound)?;
        entry.verification_notes = Some("collection retries exhausted".to_string());
        entry.updated_at = now;
        Ok(())
    }

    fn create_missing_entries(
        &self,
        fee: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<RevenueCollectionEntry>, StoreError> {
        let mut state = self.state()?;
        let unbilled: Vec<PurchaseRecord> = state
            .purchases
            .iter()
            .filter(|purchase| !state.has_entry_for(&purchase.application_id, &purchase.bank_id))
            .cloned()
            .collect();
        let mut created = Vec::with_capacity(unbilled.len());
        for purchase in unbilled {
            let id = state.next_entry_id();
            let entry = RevenueCollectionEntry {
                id: id.clone(),
                application_id: purchase.application_id,
                bank_id: purchase.bank_id,
                amount: fee,
                status: CollectionStatus::Pending,
                retry_count: 0,
                verified: None,
                verification_notes: None,
                collected_at: None,
                created_at: now,
                updated_at: now,
            };
            state.ledger.insert(id, entry.clone());
            created.push(entry);
        }
        Ok(created)
    }

    fn entries_for(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<RevenueCollectionEntry>, StoreError> {
        let state = self.state()?;
        Ok(state
            .ledger
            .values()
            .filter(|entry| entry.application_id == *id)
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<RevenueStats, StoreError> {
        let state = self.state()?;
        let mut stats = RevenueStats::default();
        for entry in state.ledger.values() {
            stats.total_entries += 1;
            stats.expected_total = stats.expected_total.saturating_add(PURCHASE_FEE);
            match entry.status {
                CollectionStatus::Pending => stats.pending += 1,
                CollectionStatus::Collected => stats.collected += 1,
                CollectionStatus::Failed => stats.failed += 1,
                CollectionStatus::Verified => {
                    stats.verified += 1;
                    stats.recognized_total = stats.recognized_total.saturating_add(entry.amount);
                }
            }
        }
        if stats.total_entries > 0 {
            stats.collection_rate =
                (stats.collected + stats.verified) as f64 / stats.total_entries as f64;
        }
        Ok(stats)
    }

    fn daily_series(
        &self,
        now: DateTime<Utc>,
        days: i64,
    ) -> Result<Vec<DailyRevenuePoint>, StoreError> {
        let state = self.state()?;
        let mut series = Vec::with_capacity(days.max(0) as usize);
        for offset in (0..days).rev() {
            let day = (now - Duration::days(offset)).date_naive();
            let mut revenue = Money::ZERO;
            let mut collections = 0;
            for entry in state.ledger.values() {
                let collected_today = matches!(
                    entry.status,
                    CollectionStatus::Collected | CollectionStatus::Verified
                ) && entry
                    .collected_at
                    .is_some_and(|at| at.date_naive() == day);
                if collected_today {
                    revenue = revenue.saturating_add(entry.amount);
                    collections += 1;
                }
            }
            series.push(DailyRevenuePoint {
                day,
                revenue,
                collections,
            });
        }
        Ok(series)
    }
}

impl AlertSink for InMemoryMarketStore {
    fn publish(&self, alert: SystemAlert) -> Result<(), AlertError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AlertError::Transport("market state mutex poisoned".to_string()))?;
        state.alerts.push(alert);
        Ok(())
    }
}
