//! Pure decision logic for the application lifecycle.
//!
//! `decide` is the single source of truth for which transition (if any) is
//! legal and due for a snapshot at a given instant. Both the deadline monitor
//! and the status reconciler consult it, so scheduled transitions and drift
//! corrections can never disagree on the rules.

use chrono::{DateTime, Utc};

use super::domain::{
    ApplicationSnapshot, ApplicationStatus, DataIntegrityIssue, Transition, TransitionTrigger,
};

/// Decides the transition (if any) due for `snapshot` at `now`.
///
/// Pure: no I/O, no side effects, deterministic given its inputs. Offer or
/// purchase presence always outranks an elapsed deadline: an application
/// with any offer can only complete, never expire to `ignored`.
pub fn decide(snapshot: &ApplicationSnapshot, now: DateTime<Utc>) -> Option<Transition> {
    match snapshot.status {
        // Terminal under automatic rules; only operator action re-opens it.
        ApplicationStatus::Completed => None,
        // An ignored application with recorded offers or purchases is drift:
        // the counters imply it should have completed. Recompute from first
        // principles so the reconciler can repair it.
        ApplicationStatus::Ignored => {
            if snapshot.purchases_count > 0 {
                Some(Transition {
                    from: ApplicationStatus::Ignored,
                    to: ApplicationStatus::Completed,
                    trigger: TransitionTrigger::PurchaseRecorded,
                })
            } else if snapshot.offers_count > 0 {
                Some(Transition {
                    from: ApplicationStatus::Ignored,
                    to: ApplicationStatus::Completed,
                    trigger: TransitionTrigger::OfferReceived,
                })
            } else {
                None
            }
        }
        ApplicationStatus::LiveAuction => {
            if snapshot.purchases_count > 0 {
                return Some(Transition {
                    from: ApplicationStatus::LiveAuction,
                    to: ApplicationStatus::Completed,
                    trigger: TransitionTrigger::PurchaseRecorded,
                });
            }
            if snapshot.offers_count > 0 {
                let trigger = if snapshot.auction_elapsed(now) {
                    TransitionTrigger::AuctionExpiredWithOffers
                } else {
                    TransitionTrigger::OfferReceived
                };
                return Some(Transition {
                    from: ApplicationStatus::LiveAuction,
                    to: ApplicationStatus::Completed,
                    trigger,
                });
            }
            if snapshot.auction_elapsed(now) {
                return Some(Transition {
                    from: ApplicationStatus::LiveAuction,
                    to: ApplicationStatus::Ignored,
                    trigger: TransitionTrigger::AuctionExpiredUnanswered,
                });
            }
            None
        }
    }
}

/// Reports a contradictory snapshot, if any. Callers log the observation and
/// continue; a bad row must never crash a monitor cycle.
pub fn integrity_check(
    snapshot: &ApplicationSnapshot,
    now: DateTime<Utc>,
) -> Option<DataIntegrityIssue> {
    if snapshot.auction_end_time.is_some() && snapshot.offer_selection_end_time.is_some() {
        return Some(DataIntegrityIssue {
            application_id: snapshot.id.clone(),
            detail: "auction and offer-selection deadlines are armed simultaneously".to_string(),
        });
    }
    if snapshot.status == ApplicationStatus::LiveAuction
        && snapshot.offer_selection_end_time.is_some()
    {
        return Some(DataIntegrityIssue {
            application_id: snapshot.id.clone(),
            detail: "offer-selection deadline armed while the auction is still open".to_string(),
        });
    }
    if snapshot.status.is_terminal()
        && snapshot
            .auction_end_time
            .is_some_and(|end| end > now)
    {
        return Some(DataIntegrityIssue {
            application_id: snapshot.id.clone(),
            detail: format!(
                "auction deadline still armed after terminal status {}",
                snapshot.status.label(),
            ),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::domain::ApplicationId;
    use crate::revenue::domain::Money;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).single().expect("valid timestamp")
    }

    fn snapshot(status: ApplicationStatus) -> ApplicationSnapshot {
        ApplicationSnapshot {
            id: ApplicationId("app-000001".to_string()),
            status,
            submitted_at: at(0),
            auction_end_time: Some(at(0) + Duration::hours(48)),
            offer_selection_end_time: None,
            offers_count: 0,
            purchases_count: 0,
            revenue_collected: Money::ZERO,
            was_corrected: false,
        }
    }

    #[test]
    fn open_auction_with_no_activity_waits() {
        let app = snapshot(ApplicationStatus::LiveAuction);
        assert_eq!(decide(&app, at(1)), None);
    }

    #[test]
    fn elapsed_auction_without_offers_expires_to_ignored() {
        let mut app = snapshot(ApplicationStatus::LiveAuction);
        app.auction_end_time = Some(at(1));
        let transition = decide(&app, at(2)).expect("transition due");
        assert_eq!(transition.to, ApplicationStatus::Ignored);
        assert_eq!(transition.trigger, TransitionTrigger::AuctionExpiredUnanswered);
    }

    #[test]
    fn purchase_completes_regardless_of_deadline() {
        let mut app = snapshot(ApplicationStatus::LiveAuction);
        app.purchases_count = 1;
        let transition = decide(&app, at(1)).expect("transition due");
        assert_eq!(transition.to, ApplicationStatus::Completed);
        assert_eq!(transition.trigger, TransitionTrigger::PurchaseRecorded);
    }

    #[test]
    fn offer_presence_wins_over_elapsed_deadline() {
        let mut app = snapshot(ApplicationStatus::LiveAuction);
        app.auction_end_time = Some(at(1));
        app.offers_count = 2;
        let transition = decide(&app, at(2)).expect("transition due");
        assert_eq!(transition.to, ApplicationStatus::Completed);
        assert_eq!(transition.trigger, TransitionTrigger::AuctionExpiredWithOffers);
    }

    #[test]
    fn offer_before_deadline_completes_immediately() {
        let mut app = snapshot(ApplicationStatus::LiveAuction);
        app.offers_count = 1;
        let transition = decide(&app, at(1)).expect("transition due");
        assert_eq!(transition.trigger, TransitionTrigger::OfferReceived);
    }

    #[test]
    fn completed_is_terminal_for_automatic_rules() {
        let mut app = snapshot(ApplicationStatus::Completed);
        app.auction_end_time = Some(at(1));
        app.offers_count = 3;
        app.purchases_count = 1;
        assert_eq!(decide(&app, at(2)), None);
    }

    #[test]
    fn ignored_with_recorded_offers_is_drift_toward_completed() {
        let mut app = snapshot(ApplicationStatus::Ignored);
        app.auction_end_time = None;
        app.offers_count = 1;
        let transition = decide(&app, at(2)).expect("drift correction due");
        assert_eq!(transition.from, ApplicationStatus::Ignored);
        assert_eq!(transition.to, ApplicationStatus::Completed);
    }

    #[test]
    fn ignored_without_activity_stays_put() {
        let mut app = snapshot(ApplicationStatus::Ignored);
        app.auction_end_time = None;
        assert_eq!(decide(&app, at(2)), None);
    }

    #[test]
    fn decision_is_deterministic() {
        let mut app = snapshot(ApplicationStatus::LiveAuction);
        app.auction_end_time = Some(at(1));
        app.offers_count = 1;
        assert_eq!(decide(&app, at(2)), decide(&app, at(2)));
    }

    #[test]
    fn dual_armed_deadlines_are_an_integrity_issue() {
        let mut app = snapshot(ApplicationStatus::LiveAuction);
        app.offer_selection_end_time = Some(at(3));
        let issue = integrity_check(&app, at(1)).expect("issue reported");
        assert!(issue.detail.contains("simultaneously"));
    }

    #[test]
    fn terminal_status_with_future_deadline_is_flagged_not_fatal() {
        let mut app = snapshot(ApplicationStatus::Ignored);
        app.auction_end_time = Some(at(10));
        let issue = integrity_check(&app, at(1)).expect("issue reported");
        assert!(issue.detail.contains("terminal"));
        // The decision rule still returns the terminal no-op.
        assert_eq!(decide(&app, at(1)), None);
    }

    #[test]
    fn clean_snapshot_raises_no_issue() {
        let app = snapshot(ApplicationStatus::LiveAuction);
        assert_eq!(integrity_check(&app, at(1)), None);
    }
}
