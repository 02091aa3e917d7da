use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::domain::{ApplicationId, BankId};

/// Fixed-point currency amount in minor units (halalas/cents).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub const fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", magnitude / 100, magnitude % 100)
    }
}

/// Fee owed by a bank for each purchase of an application. A constant known
/// to the ledger, never inferred from collected amounts.
pub const PURCHASE_FEE: Money = Money(50_000);

/// Lifecycle of one fee obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Pending,
    Collected,
    Failed,
    Verified,
}

impl CollectionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CollectionStatus::Pending => "pending",
            CollectionStatus::Collected => "collected",
            CollectionStatus::Failed => "failed",
            CollectionStatus::Verified => "verified",
        }
    }
}

/// One fee obligation created by a bank's purchase action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueCollectionEntry {
    pub id: String,
    pub application_id: ApplicationId,
    pub bank_id: BankId,
    pub amount: Money,
    pub status: CollectionStatus,
    pub retry_count: u32,
    pub verified: Option<bool>,
    pub verification_notes: Option<String>,
    /// When the external processor actually collected the fee; anchors the
    /// daily revenue series.
    pub collected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RevenueCollectionEntry {
    pub fn pending_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == CollectionStatus::Pending && self.updated_at <= cutoff
    }
}

/// One day of aggregate ledger activity, used for trends and anomaly scans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRevenuePoint {
    pub day: NaiveDate,
    pub revenue: Money,
    pub collections: u32,
}

/// Aggregate ledger counters exposed to the operator dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RevenueStats {
    pub total_entries: u64,
    pub pending: u64,
    pub collected: u64,
    pub failed: u64,
    pub verified: u64,
    pub recognized_total: Money,
    pub expected_total: Money,
    pub collection_rate: f64,
}
