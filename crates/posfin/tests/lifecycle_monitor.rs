//! End-to-end specifications for the deadline-driven transition monitor.
//!
//! Scenarios drive the public engine handle against the in-memory store with
//! a manual clock, asserting the status transitions, audit trail, ledger
//! entries, and alerts that one monitor cycle must produce.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use posfin::audit::AlertType;
use posfin::clock::{Clock, ManualClock};
use posfin::config::{EngineConfig, LedgerConfig};
use posfin::engine::EngineHandle;
use posfin::lifecycle::{
    decide, ApplicationId, ApplicationSeed, ApplicationStatus, BankId, ExecutionOutcome,
    InMemoryMarketStore, LifecycleStore, OfferRecord, OfferStatus, PurchaseRecord,
    TransitionActor, TransitionExecutor,
};
use posfin::revenue::{CollectionStatus, Money, PURCHASE_FEE};

type Harness = (
    EngineHandle<InMemoryMarketStore, InMemoryMarketStore>,
    Arc<InMemoryMarketStore>,
    Arc<ManualClock>,
);

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid start time")
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::starting_at(start_time()));
    let store = Arc::new(InMemoryMarketStore::default());
    let engine = EngineHandle::new(
        Arc::clone(&store),
        Arc::clone(&store),
        clock.clone() as Arc<dyn Clock>,
        EngineConfig::default(),
        LedgerConfig::default(),
    );
    (engine, store, clock)
}

fn id(value: &str) -> ApplicationId {
    ApplicationId(value.to_string())
}

fn offer(application: &str, bank: &str, at: DateTime<Utc>) -> OfferRecord {
    OfferRecord {
        id: format!("offer-{application}-{bank}"),
        application_id: id(application),
        bank_id: BankId(bank.to_string()),
        amount: Money(1_000_000),
        status: OfferStatus::Submitted,
        submitted_at: at,
    }
}

#[tokio::test]
async fn unanswered_auction_expires_to_ignored_after_one_cycle() {
    let (engine, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));

    clock.advance(Duration::hours(48));
    let summary = engine.monitor.run_cycle().await;

    assert_eq!(summary.transitioned, 1);
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Ignored);
    assert_eq!(app.auction_end_time, None);

    let audit = store.audit_log();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].from_status, ApplicationStatus::LiveAuction);
    assert_eq!(audit[0].to_status, ApplicationStatus::Ignored);
    assert_eq!(audit[0].actor, TransitionActor::Monitor);
    assert!(audit[0].reason.contains("no offers"));
}

#[tokio::test]
async fn offer_presence_wins_over_elapsed_deadline() {
    let (engine, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));
    store.record_offer(offer("app-1", "bank-alpha", clock.now()));

    // Deadline and offer observed in the same cycle: the offer outranks the
    // timeout, so the application completes instead of expiring.
    clock.advance(Duration::hours(48));
    let summary = engine.monitor.run_cycle().await;

    assert_eq!(summary.transitioned, 1);
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Completed);
    // The business now chooses among the received offers.
    assert_eq!(
        app.offer_selection_end_time,
        Some(clock.now() + Duration::hours(24)),
    );
    assert_eq!(app.auction_end_time, None);
}

#[tokio::test]
async fn offer_before_deadline_completes_at_next_cycle() {
    let (engine, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));

    clock.advance(Duration::hours(2));
    store.record_offer(offer("app-1", "bank-alpha", clock.now()));
    let summary = engine.monitor.run_cycle().await;

    assert_eq!(summary.transitioned, 1);
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Completed);
}

#[tokio::test]
async fn purchase_completes_and_creates_pending_fee_entry() {
    let (engine, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));

    clock.advance(Duration::hours(1));
    store.record_purchase(PurchaseRecord {
        application_id: id("app-1"),
        bank_id: BankId("bank-beta".to_string()),
        purchased_at: clock.now(),
    });
    let summary = engine.monitor.run_cycle().await;

    assert_eq!(summary.transitioned, 1);
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Completed);
    // A purchase ends the lifecycle outright; no selection window is armed.
    assert_eq!(app.offer_selection_end_time, None);

    let entries = store.ledger_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].application_id, id("app-1"));
    assert_eq!(entries[0].bank_id, BankId("bank-beta".to_string()));
    assert_eq!(entries[0].amount, PURCHASE_FEE);
    assert_eq!(entries[0].status, CollectionStatus::Pending);
}

#[tokio::test]
async fn second_cycle_is_a_no_op_for_settled_applications() {
    let (engine, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));
    clock.advance(Duration::hours(48));

    engine.monitor.run_cycle().await;
    let second = engine.monitor.run_cycle().await;

    assert_eq!(second.transitioned, 0);
    assert_eq!(store.audit_log().len(), 1);
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Ignored);
}

#[tokio::test]
async fn operator_reactivation_rearms_the_auction_window() {
    let (engine, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));
    clock.advance(Duration::hours(48));
    engine.monitor.run_cycle().await;

    // Residue from before the revival must not leak into the new auction.
    store.record_offer(offer("app-1", "bank-alpha", clock.now()));

    clock.advance(Duration::hours(6));
    let revived = engine.reactivate(&id("app-1")).await.expect("reactivation succeeds");

    assert_eq!(revived.status, ApplicationStatus::LiveAuction);
    assert_eq!(revived.auction_end_time, Some(clock.now() + Duration::hours(48)));
    assert_eq!(revived.offers_count, 0);
    assert_eq!(revived.purchases_count, 0);

    let offers = store.offers_for(&id("app-1"));
    assert!(offers.iter().all(|offer| offer.status == OfferStatus::DealLost));

    let audit = store.audit_log();
    let last = audit.last().expect("audit entry appended");
    assert_eq!(last.actor, TransitionActor::Operator);
    assert_eq!(last.to_status, ApplicationStatus::LiveAuction);
}

#[tokio::test]
async fn racing_transition_attempts_resolve_to_exactly_one_winner() {
    let (engine, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));
    clock.advance(Duration::hours(48));

    // First writer reads a stale snapshot...
    let snapshot = store
        .fetch(&id("app-1"))
        .expect("fetch succeeds")
        .expect("application present");
    let stale_transition = decide(&snapshot, clock.now()).expect("transition due");

    // ...then a concurrent writer applies the same transition first.
    let validated = engine.validated_status(&id("app-1")).await.expect("validation succeeds");
    assert!(validated.was_corrected);

    let executor = TransitionExecutor::new(Arc::clone(&store), EngineConfig::default());
    let outcome = executor
        .execute(&id("app-1"), &stale_transition, TransitionActor::Monitor, clock.now())
        .await
        .expect("execution runs");

    assert!(matches!(outcome, ExecutionOutcome::SkippedConflict { .. }));
    // Exactly one audit-logged state change, never a partially-applied one.
    assert_eq!(store.audit_log().len(), 1);
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Ignored);
}

#[tokio::test]
async fn urgency_alerts_are_deduplicated_within_the_cooldown() {
    let (engine, store, clock) = harness();
    // Auction closes in one hour, inside the two-hour urgency horizon.
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(1)));

    engine.monitor.run_cycle().await;
    clock.advance(Duration::minutes(10));
    engine.monitor.run_cycle().await;

    let deadline_alerts = store
        .alerts()
        .into_iter()
        .filter(|alert| alert.alert_type == AlertType::DeadlineApproaching)
        .count();
    assert_eq!(deadline_alerts, 1);

    // Past the cooldown the still-unmet deadline alerts again.
    clock.advance(Duration::minutes(35));
    engine.monitor.run_cycle().await;
    let deadline_alerts = store
        .alerts()
        .into_iter()
        .filter(|alert| alert.alert_type == AlertType::DeadlineApproaching)
        .count();
    assert_eq!(deadline_alerts, 2);
}

#[tokio::test]
async fn contradictory_snapshot_is_skipped_and_surfaced() {
    let (engine, store, clock) = harness();
    // Terminal status with a still-armed future deadline plus recorded
    // offers: a contradictory row the scan picks up as a drift candidate.
    store.seed_application(ApplicationSeed {
        id: id("app-1"),
        submitted_at: clock.now(),
        auction_end_time: Some(clock.now() + Duration::hours(10)),
        status: ApplicationStatus::Ignored,
    });
    store.record_offer(offer("app-1", "bank-alpha", clock.now()));

    let summary = engine.monitor.run_cycle().await;

    assert_eq!(summary.integrity_issues, 1);
    assert_eq!(summary.transitioned, 0);
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Ignored);
    assert!(store
        .alerts()
        .iter()
        .any(|alert| alert.alert_type == AlertType::DataIntegrity));
}

#[tokio::test]
async fn sweep_expires_selection_windows_and_closes_offers() {
    let (engine, store, clock) = harness();
    store.seed_application(ApplicationSeed::open("app-1", clock.now(), Duration::hours(48)));
    store.record_offer(offer("app-1", "bank-alpha", clock.now()));
    store.record_offer(offer("app-1", "bank-beta", clock.now()));

    engine.monitor.run_cycle().await;
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Completed);
    assert!(app.offer_selection_end_time.is_some());

    // The business never chose; once the selection window elapses the open
    // offers are closed out as lost.
    clock.advance(Duration::hours(25));
    let sweep = engine.monitor.run_sweep().await;

    assert_eq!(sweep.selection_windows_expired, 1);
    assert_eq!(sweep.offers_closed, 2);
    assert!(store
        .offers_for(&id("app-1"))
        .iter()
        .all(|offer| offer.status == OfferStatus::DealLost));
}

#[tokio::test]
async fn sweep_reconciliation_repairs_legacy_drift() {
    let (engine, store, clock) = harness();
    // A legacy deal_expired row parses to ignored, but its recorded offers
    // imply it should have completed.
    store.seed_application(ApplicationSeed {
        id: id("app-1"),
        submitted_at: clock.now() - Duration::hours(80),
        auction_end_time: None,
        status: ApplicationStatus::from_stored("deal_expired").expect("legacy value maps"),
    });
    store.record_offer(offer("app-1", "bank-alpha", clock.now()));

    let sweep = engine.monitor.run_sweep().await;

    assert_eq!(sweep.reconciliation.corrected, 1);
    let app = store.application(&id("app-1")).expect("application present");
    assert_eq!(app.status, ApplicationStatus::Completed);
    assert!(app.was_corrected);
}
