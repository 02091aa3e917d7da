use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Args;
use posfin::clock::{Clock, ManualClock};
use posfin::config::{EngineConfig, LedgerConfig};
use posfin::engine::EngineHandle;
use posfin::error::AppError;
use posfin::lifecycle::{
    ApplicationId, ApplicationSeed, BankId, InMemoryMarketStore, OfferRecord, OfferStatus,
    PurchaseRecord,
};
use posfin::revenue::{Money, PURCHASE_FEE};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Include the full audit trail in the output
    #[arg(long)]
    pub(crate) show_audit: bool,
}

/// Walks a seeded in-memory marketplace through the lifecycle with a manual
/// clock: an ignored auction, an offer-driven completion, a purchase with
/// fee collection, and an operator reactivation.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let start = Utc::now();
    let manual_clock = Arc::new(ManualClock::starting_at(start));
    let clock: Arc<dyn Clock> = manual_clock.clone();
    let store = Arc::new(InMemoryMarketStore::default());
    let engine_config = EngineConfig::default();
    let engine = EngineHandle::new(
        Arc::clone(&store),
        Arc::clone(&store),
        clock,
        engine_config.clone(),
        LedgerConfig::default(),
    );

    let applications = ["app-quiet", "app-bid", "app-sold"];
    for id in applications {
        store.seed_application(ApplicationSeed::open(id, start, engine_config.auction_window()));
    }
    println!("Seeded {} applications with a 48h auction window", applications.len());

    manual_clock.advance(Duration::hours(1));
    let now = manual_clock.now();
    store.record_offer(OfferRecord {
        id: "offer-0001".to_string(),
        application_id: ApplicationId("app-bid".to_string()),
        bank_id: BankId("bank-alpha".to_string()),
        amount: Money(1_250_000),
        status: OfferStatus::Submitted,
        submitted_at: now,
    });
    store.record_purchase(PurchaseRecord {
        application_id: ApplicationId("app-sold".to_string()),
        bank_id: BankId("bank-beta".to_string()),
        purchased_at: now,
    });

    let cycle = engine.monitor.run_cycle().await;
    println!(
        "\nT+1h monitor cycle: {} examined, {} transitioned",
        cycle.examined, cycle.transitioned,
    );
    print_statuses(&store, &applications);

    let entry = store
        .ledger_entries()
        .into_iter()
        .next()
        .expect("purchase created a ledger entry");
    println!(
        "\nLedger entry {} for {} created at {} ({})",
        entry.id,
        entry.application_id.0,
        entry.amount,
        entry.status.label(),
    );
    store
        .record_collection(&entry.id, PURCHASE_FEE, manual_clock.now())
        .map_err(|err| AppError::Engine(err.into()))?;
    let ledger_cycle = engine.ledger.run_cycle().await;
    println!("Ledger cycle: {} entries verified", ledger_cycle.verified);

    manual_clock.set(start + Duration::hours(49));
    let cycle = engine.monitor.run_cycle().await;
    println!(
        "\nT+49h monitor cycle: {} examined, {} transitioned",
        cycle.examined, cycle.transitioned,
    );
    print_statuses(&store, &applications);

    let revived = engine
        .reactivate(&ApplicationId("app-quiet".to_string()))
        .await?;
    println!(
        "\nOperator reactivated app-quiet: status {} until {}",
        revived.status.label(),
        revived
            .auction_end_time
            .map(|end| end.to_rfc3339())
            .unwrap_or_else(|| "-".to_string()),
    );

    let stats = engine.monitoring_stats()?;
    println!("\nStatus breakdown:");
    for row in stats.statuses {
        println!(
            "  {:<14} {:>3}  (avg age {:.1}h)",
            row.status.label(),
            row.count,
            row.average_age_hours,
        );
    }

    let revenue = engine.revenue_stats()?;
    println!(
        "\nRevenue: {} entries, {} verified, recognized {}",
        revenue.total_entries, revenue.verified, revenue.recognized_total,
    );

    if args.show_audit {
        println!("\nAudit trail:");
        for entry in store.audit_log() {
            println!(
                "  {} {} -> {} by {}: {}",
                entry.application_id.0,
                entry.from_status.label(),
                entry.to_status.label(),
                entry.actor.label(),
                entry.reason,
            );
        }
    }

    Ok(())
}

fn print_statuses(store: &InMemoryMarketStore, applications: &[&str]) {
    for id in applications {
        if let Some(snapshot) = store.application(&ApplicationId((*id).to_string())) {
            println!("  {id}: {}", snapshot.status.label());
        }
    }
}
