//! Windowed rollups over the click event log
//!
//! A rollup fetches the subject set's events for an inclusive time window
//! and reduces them into daily buckets and facet breakdowns. Aggregation
//! itself is pure: the same stored events and the same window always
//! produce the same result, and breakdowns use ordered maps so repeated
//! rollups serialize identically.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::analytics::models::ClickEvent;
use crate::storage::{Storage, StorageResult};

#[derive(Debug, Error)]
#[error("invalid window: from {from} is after to {to}")]
pub struct InvalidWindow {
    pub from: i64,
    pub to: i64,
}

/// Inclusive time window in Unix seconds. Both bounds are required;
/// there is no "all time" shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    from: i64,
    to: i64,
}

impl Window {
    pub fn new(from: i64, to: i64) -> Result<Self, InvalidWindow> {
        if from > to {
            return Err(InvalidWindow { from, to });
        }
        Ok(Self { from, to })
    }

    /// Window ending now and reaching back the given number of days.
    pub fn last_days(days: i64) -> Self {
        let to = chrono::Utc::now().timestamp();
        Self {
            from: to - days * 86_400,
            to,
        }
    }

    pub fn from(&self) -> i64 {
        self.from
    }

    pub fn to(&self) -> i64 {
        self.to
    }
}

/// One calendar-day bucket of a sparse daily series
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// Summary view computed per query; holds no identity of its own.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RollupResult {
    pub total_clicks: u64,
    pub unique_visitors: i64,
    /// Ascending by date; days without events are absent, not zero
    pub clicks_by_day: Vec<DayCount>,
    pub device_breakdown: BTreeMap<String, u64>,
    pub country_breakdown: BTreeMap<String, u64>,
}

/// Read-side aggregation over the event store. Never mutates it.
pub struct Aggregator {
    storage: Arc<dyn Storage>,
}

impl Aggregator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Windowed rollup over the union of the given subjects' events.
    ///
    /// `link_ids = None` spans every subject in the system. Events are
    /// merged across subjects before bucketing so day/device/country keys
    /// combine instead of colliding. An empty subject set or an empty
    /// window is a zero-valued result, not an error.
    pub async fn rollup(
        &self,
        link_ids: Option<&[i64]>,
        window: Window,
    ) -> StorageResult<RollupResult> {
        let events = self
            .storage
            .events_in_window(link_ids, window.from(), window.to())
            .await?;
        let unique_visitors = self.storage.sum_unique_visitors(link_ids).await?;

        Ok(build_rollup(&events, unique_visitors))
    }
}

/// Reduce an already-filtered event set into a rollup view. Pure.
pub fn build_rollup(events: &[ClickEvent], unique_visitors: i64) -> RollupResult {
    let mut device_breakdown: BTreeMap<String, u64> = BTreeMap::new();
    let mut country_breakdown: BTreeMap<String, u64> = BTreeMap::new();

    for event in events {
        *device_breakdown
            .entry(event.device.to_string())
            .or_insert(0) += 1;
        *country_breakdown
            .entry(event.location.country.clone())
            .or_insert(0) += 1;
    }

    RollupResult {
        total_clicks: events.len() as u64,
        unique_visitors,
        clicks_by_day: bucket_by_day(events.iter().map(|event| event.timestamp)),
        device_breakdown,
        country_breakdown,
    }
}

/// Bucket timestamps by UTC calendar day. Ascending, sparse.
pub fn bucket_by_day(timestamps: impl IntoIterator<Item = i64>) -> Vec<DayCount> {
    let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    for timestamp in timestamps {
        if let Some(dt) = DateTime::from_timestamp(timestamp, 0) {
            *days.entry(dt.date_naive()).or_insert(0) += 1;
        }
    }

    days.into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::{Device, GeoLocation};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ts(date: NaiveDate, hour: u32) -> i64 {
        date.and_hms_opt(hour, 0, 0).unwrap().and_utc().timestamp()
    }

    fn event(timestamp: i64, device: Device, country: &str) -> ClickEvent {
        ClickEvent {
            timestamp,
            device,
            os: "unknown".to_string(),
            browser: "unknown".to_string(),
            location: GeoLocation {
                country: country.to_string(),
                city: "Unknown".to_string(),
            },
            referrer: None,
            source_ip: None,
        }
    }

    #[test]
    fn test_daily_buckets_merge_and_sort() {
        let d1 = day(2025, 3, 1);
        let d2 = day(2025, 3, 2);
        let events = vec![
            event(ts(d1, 9), Device::Mobile, "US"),
            event(ts(d1, 17), Device::Desktop, "FR"),
            event(ts(d2, 8), Device::Mobile, "US"),
        ];

        let rollup = build_rollup(&events, 0);
        assert_eq!(rollup.total_clicks, 3);
        assert_eq!(
            rollup.clicks_by_day,
            vec![
                DayCount { date: d1, count: 2 },
                DayCount { date: d2, count: 1 },
            ]
        );
        assert_eq!(rollup.device_breakdown["mobile"], 2);
        assert_eq!(rollup.device_breakdown["desktop"], 1);
        assert_eq!(rollup.country_breakdown["US"], 2);
        assert_eq!(rollup.country_breakdown["FR"], 1);
    }

    #[test]
    fn test_empty_event_set_yields_zero_result() {
        let rollup = build_rollup(&[], 0);
        assert_eq!(rollup.total_clicks, 0);
        assert_eq!(rollup.unique_visitors, 0);
        assert!(rollup.clicks_by_day.is_empty());
        assert!(rollup.device_breakdown.is_empty());
        assert!(rollup.country_breakdown.is_empty());
    }

    #[test]
    fn test_days_without_events_are_not_synthesized() {
        let d1 = day(2025, 3, 1);
        let d3 = day(2025, 3, 3);
        let events = vec![
            event(ts(d1, 12), Device::Desktop, "US"),
            event(ts(d3, 12), Device::Desktop, "US"),
        ];

        let buckets = bucket_by_day(events.iter().map(|e| e.timestamp));
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].date, d1);
        assert_eq!(buckets[1].date, d3);
    }

    #[test]
    fn test_unknown_facets_are_counted_not_dropped() {
        let events = vec![event(ts(day(2025, 3, 1), 12), Device::Unknown, "Unknown")];

        let rollup = build_rollup(&events, 0);
        assert_eq!(rollup.device_breakdown["unknown"], 1);
        assert_eq!(rollup.country_breakdown["Unknown"], 1);
    }

    #[test]
    fn test_rollup_serialization_is_deterministic() {
        let d1 = day(2025, 3, 1);
        let events = vec![
            event(ts(d1, 1), Device::Mobile, "US"),
            event(ts(d1, 2), Device::Desktop, "FR"),
            event(ts(d1, 3), Device::Tablet, "DE"),
        ];

        let first = serde_json::to_string(&build_rollup(&events, 2)).unwrap();
        let second = serde_json::to_string(&build_rollup(&events, 2)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(Window::new(100, 99).is_err());
        assert!(Window::new(100, 100).is_ok());
    }
}
