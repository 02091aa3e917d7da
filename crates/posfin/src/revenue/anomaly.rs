//! Statistical outlier scan over the daily ledger series.

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::DailyRevenuePoint;

/// Minimum trailing days before the scan has enough signal to judge.
const MIN_SAMPLE_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyMetric {
    Revenue,
    Collections,
}

impl AnomalyMetric {
    pub const fn label(self) -> &'static str {
        match self {
            AnomalyMetric::Revenue => "revenue",
            AnomalyMetric::Collections => "collections",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyDirection {
    High,
    Low,
}

/// One day whose aggregate deviates more than the threshold from the
/// trailing mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueAnomaly {
    pub day: NaiveDate,
    pub metric: AnomalyMetric,
    pub observed: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub direction: AnomalyDirection,
}

/// Flags days whose revenue or collection count deviates more than
/// `threshold` standard deviations from the trailing mean. Pure; the caller
/// decides what to do with the findings.
pub fn detect(series: &[DailyRevenuePoint], threshold: f64) -> Vec<RevenueAnomaly> {
    if series.len() < MIN_SAMPLE_DAYS {
        return Vec::new();
    }

    let mut anomalies = Vec::new();
    scan_metric(
        series,
        AnomalyMetric::Revenue,
        |point| point.revenue.minor_units() as f64,
        threshold,
        &mut anomalies,
    );
    scan_metric(
        series,
        AnomalyMetric::Collections,
        |point| f64::from(point.collections),
        threshold,
        &mut anomalies,
    );
    anomalies.sort_by_key(|anomaly| anomaly.day);
    anomalies
}

fn scan_metric(
    series: &[DailyRevenuePoint],
    metric: AnomalyMetric,
    value: impl Fn(&DailyRevenuePoint) -> f64,
    threshold: f64,
    anomalies: &mut Vec<RevenueAnomaly>,
) {
    let values: Vec<f64> = series.iter().map(&value).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    let std_dev = variance.sqrt();
    // A perfectly flat series has no outliers by definition.
    if std_dev == 0.0 {
        return;
    }

    for (point, observed) in series.iter().zip(values) {
        let z = (observed - mean) / std_dev;
        if z.abs() > threshold {
            anomalies.push(RevenueAnomaly {
                day: point.day,
                metric,
                observed,
                mean,
                std_dev,
                direction: if z > 0.0 {
                    AnomalyDirection::High
                } else {
                    AnomalyDirection::Low
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revenue::domain::Money;
    use chrono::NaiveDate;

    fn series(revenues: &[i64]) -> Vec<DailyRevenuePoint> {
        let start = NaiveDate::from_ymd_opt(2026, 2, 1).expect("valid date");
        revenues
            .iter()
            .enumerate()
            .map(|(offset, revenue)| DailyRevenuePoint {
                day: start + chrono::Duration::days(offset as i64),
                revenue: Money(*revenue),
                collections: if *revenue > 0 { 1 } else { 0 },
            })
            .collect()
    }

    #[test]
    fn short_series_yields_nothing() {
        let points = series(&[100, 100, 100]);
        assert!(detect(&points, 2.0).is_empty());
    }

    #[test]
    fn flat_series_has_no_outliers() {
        let points = series(&[100; 30]);
        assert!(detect(&points, 2.0).is_empty());
    }

    #[test]
    fn spike_day_is_flagged_high() {
        let mut revenues = vec![50_000i64; 29];
        revenues.push(500_000);
        let points = series(&revenues);
        let anomalies = detect(&points, 2.0);
        let revenue_anomalies: Vec<&RevenueAnomaly> = anomalies
            .iter()
            .filter(|anomaly| anomaly.metric == AnomalyMetric::Revenue)
            .collect();
        assert_eq!(revenue_anomalies.len(), 1);
        assert_eq!(revenue_anomalies[0].direction, AnomalyDirection::High);
        assert_eq!(revenue_anomalies[0].observed, 500_000.0);
    }

    #[test]
    fn collapsed_day_is_flagged_low() {
        let mut revenues = vec![100_000i64; 29];
        revenues.push(0);
        let points = series(&revenues);
        let anomalies = detect(&points, 2.0);
        assert!(anomalies
            .iter()
            .any(|anomaly| anomaly.direction == AnomalyDirection::Low));
    }
}
