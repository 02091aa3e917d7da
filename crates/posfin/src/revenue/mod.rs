//! Revenue collection ledger: fee obligations, verification, bounded
//! retries, and the daily anomaly scan.

pub mod anomaly;
pub mod domain;
pub mod ledger;
pub mod repository;

pub use anomaly::{AnomalyDirection, AnomalyMetric, RevenueAnomaly};
pub use domain::{
    CollectionStatus, DailyRevenuePoint, Money, RevenueCollectionEntry, RevenueStats, PURCHASE_FEE,
};
pub use ledger::{LedgerCycleSummary, RevenueLedger};
pub use repository::RevenueStore;
