//! Append-only audit records and operator-facing alerts.
//!
//! Every status transition lands here as a [`StatusAuditLogEntry`]; operator
//! signals land as [`SystemAlert`]s through the [`AlertSink`] trait. Both
//! tables are append-only from the engine's perspective and are never
//! truncated by it.

pub mod forwarder;

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::domain::{ApplicationId, ApplicationStatus, TransitionActor};

/// Immutable fact recording one status change and why it happened. The sole
/// source of truth for "why did this change."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusAuditLogEntry {
    pub application_id: ApplicationId,
    pub from_status: ApplicationStatus,
    pub to_status: ApplicationStatus,
    pub actor: TransitionActor,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub const fn label(self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    DeadlineApproaching,
    CollectionTimeout,
    CollectionVerification,
    RetryExhausted,
    RevenueAnomaly,
    HealthCheckFailed,
    DataIntegrity,
}

impl AlertType {
    pub const fn label(self) -> &'static str {
        match self {
            AlertType::DeadlineApproaching => "deadline_approaching",
            AlertType::CollectionTimeout => "collection_timeout",
            AlertType::CollectionVerification => "collection_verification",
            AlertType::RetryExhausted => "retry_exhausted",
            AlertType::RevenueAnomaly => "revenue_anomaly",
            AlertType::HealthCheckFailed => "health_check_failed",
            AlertType::DataIntegrity => "data_integrity",
        }
    }
}

/// Operator-facing signal. Write-only from this engine's perspective; an
/// external dashboard reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAlert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub related_entity: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outbound alert hook. Implementations persist alerts, fan them out to a
/// webhook channel, or capture them for tests.
pub trait AlertSink: Send + Sync {
    fn publish(&self, alert: SystemAlert) -> Result<(), AlertError>;
}

/// Alert dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert transport unavailable: {0}")]
    Transport(String),
}

/// De-duplicates alerts by entity + type within a cooldown window so a
/// deadline that stays unmet for an hour raises one alert, not sixty.
#[derive(Debug, Default)]
pub struct AlertDeduper {
    last_raised: BTreeMap<(String, AlertType), DateTime<Utc>>,
}

impl AlertDeduper {
    /// Returns true (and records the occurrence) when no alert for this
    /// entity + type was raised within `cooldown` of `now`.
    pub fn should_publish(
        &mut self,
        entity: &str,
        alert_type: AlertType,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> bool {
        let key = (entity.to_string(), alert_type);
        if let Some(previous) = self.last_raised.get(&key) {
            if now - *previous < cooldown {
                return false;
            }
        }
        self.last_raised.insert(key, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, minute, 0).single().expect("valid timestamp")
    }

    #[test]
    fn duplicate_alert_suppressed_within_cooldown() {
        let mut deduper = AlertDeduper::default();
        let cooldown = Duration::minutes(30);
        assert!(deduper.should_publish("app-1", AlertType::DeadlineApproaching, at(0), cooldown));
        assert!(!deduper.should_publish("app-1", AlertType::DeadlineApproaching, at(10), cooldown));
        assert!(deduper.should_publish("app-1", AlertType::DeadlineApproaching, at(31), cooldown));
    }

    #[test]
    fn dedup_keys_are_per_entity_and_type() {
        let mut deduper = AlertDeduper::default();
        let cooldown = Duration::minutes(30);
        assert!(deduper.should_publish("app-1", AlertType::DeadlineApproaching, at(0), cooldown));
        assert!(deduper.should_publish("app-2", AlertType::DeadlineApproaching, at(1), cooldown));
        assert!(deduper.should_publish("app-1", AlertType::DataIntegrity, at(1), cooldown));
    }
}
