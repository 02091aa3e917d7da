use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::revenue::domain::Money;

/// Identifier wrapper for financing applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier wrapper for participating banks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BankId(pub String);

/// Canonical status vocabulary for an application.
///
/// Legacy persisted values from the earlier five/six-state model are accepted
/// by [`ApplicationStatus::from_stored`] and folded into this vocabulary at
/// the boundary; decision logic only ever sees these three states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    LiveAuction,
    Completed,
    Ignored,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::LiveAuction => "live_auction",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Ignored => "ignored",
        }
    }

    /// Automatic rules never move an application out of `completed`; only an
    /// operator reactivation can.
    pub const fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Completed | ApplicationStatus::Ignored)
    }

    /// Parses a persisted status value, mapping legacy vocabulary onto the
    /// canonical one. Returns `None` for values no mapping covers.
    pub fn from_stored(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live_auction" | "submitted" | "pending_offers" | "offer_received" => {
                Some(ApplicationStatus::LiveAuction)
            }
            "completed" | "purchased" => Some(ApplicationStatus::Completed),
            "ignored" | "abandoned" | "deal_expired" => Some(ApplicationStatus::Ignored),
            _ => None,
        }
    }
}

/// Read model handed to the state machine: one application's status,
/// deadlines, and counters as currently persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSnapshot {
    pub id: ApplicationId,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub auction_end_time: Option<DateTime<Utc>>,
    pub offer_selection_end_time: Option<DateTime<Utc>>,
    pub offers_count: u32,
    pub purchases_count: u32,
    pub revenue_collected: Money,
    pub was_corrected: bool,
}

impl ApplicationSnapshot {
    pub fn auction_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.auction_end_time.is_some_and(|end| end <= now)
    }

    pub fn selection_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.offer_selection_end_time.is_some_and(|end| end <= now)
    }
}

/// Lifecycle of a bank's proposal. Offers are never deleted, only
/// status-transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Submitted,
    DealWon,
    DealLost,
}

/// A bank's proposal against an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub id: String,
    pub application_id: ApplicationId,
    pub bank_id: BankId,
    pub amount: Money,
    pub status: OfferStatus,
    pub submitted_at: DateTime<Utc>,
}

/// A bank's purchase of an application, recorded by the external purchase
/// API. Read here only to bill the per-purchase fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub application_id: ApplicationId,
    pub bank_id: BankId,
    pub purchased_at: DateTime<Utc>,
}

/// Who drove a status change; recorded verbatim in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionActor {
    Monitor,
    Reconciler,
    Operator,
}

impl TransitionActor {
    pub const fn label(self) -> &'static str {
        match self {
            TransitionActor::Monitor => "transition_monitor",
            TransitionActor::Reconciler => "status_reconciler",
            TransitionActor::Operator => "operator",
        }
    }
}

/// Why a transition became legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    PurchaseRecorded,
    OfferReceived,
    AuctionExpiredWithOffers,
    AuctionExpiredUnanswered,
    OperatorReactivation,
}

impl TransitionTrigger {
    pub const fn describe(self) -> &'static str {
        match self {
            TransitionTrigger::PurchaseRecorded => "purchase recorded by a bank",
            TransitionTrigger::OfferReceived => "offer received before auction close",
            TransitionTrigger::AuctionExpiredWithOffers => {
                "auction window elapsed with offers on the table"
            }
            TransitionTrigger::AuctionExpiredUnanswered => {
                "auction window elapsed with no offers"
            }
            TransitionTrigger::OperatorReactivation => "reactivated by operator",
        }
    }
}

/// A legal, due status change as decided by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub trigger: TransitionTrigger,
}

impl Transition {
    /// Operator-only reactivation back into the open phase. Never returned
    /// by the automatic decision rule.
    pub const fn reactivation(from: ApplicationStatus) -> Self {
        Self {
            from,
            to: ApplicationStatus::LiveAuction,
            trigger: TransitionTrigger::OperatorReactivation,
        }
    }
}

/// Contradictory snapshot observed by the state machine. Logged and skipped,
/// never a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataIntegrityIssue {
    pub application_id: ApplicationId,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_vocabulary_maps_onto_canonical_states() {
        for legacy in ["submitted", "pending_offers", "offer_received", "live_auction"] {
            assert_eq!(
                ApplicationStatus::from_stored(legacy),
                Some(ApplicationStatus::LiveAuction),
                "{legacy} should map to live_auction",
            );
        }
        for legacy in ["purchased", "completed"] {
            assert_eq!(
                ApplicationStatus::from_stored(legacy),
                Some(ApplicationStatus::Completed),
            );
        }
        for legacy in ["abandoned", "deal_expired", "ignored"] {
            assert_eq!(
                ApplicationStatus::from_stored(legacy),
                Some(ApplicationStatus::Ignored),
            );
        }
    }

    #[test]
    fn unknown_status_values_are_rejected() {
        assert_eq!(ApplicationStatus::from_stored("under_review"), None);
        assert_eq!(ApplicationStatus::from_stored(""), None);
    }

    #[test]
    fn terminal_states_exclude_live_auction() {
        assert!(!ApplicationStatus::LiveAuction.is_terminal());
        assert!(ApplicationStatus::Completed.is_terminal());
        assert!(ApplicationStatus::Ignored.is_terminal());
    }
}
