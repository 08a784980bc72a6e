//! Data models for click analytics

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Device class derived from the user-agent string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Mobile => "mobile",
            Device::Tablet => "tablet",
            Device::Desktop => "desktop",
            Device::Unknown => "unknown",
        }
    }

    /// Inverse of [`Device::as_str`], used when hydrating stored rows.
    pub fn from_label(label: &str) -> Self {
        match label {
            "mobile" => Device::Mobile,
            "tablet" => Device::Tablet,
            "desktop" => Device::Desktop,
            _ => Device::Unknown,
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic location derived from the client address.
///
/// Both fields fall back to "Unknown" when the lookup fails; the event is
/// recorded either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub city: String,
}

impl GeoLocation {
    pub fn unknown() -> Self {
        Self {
            country: "Unknown".to_string(),
            city: "Unknown".to_string(),
        }
    }
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A single recorded click. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Unix timestamp of the click
    pub timestamp: i64,
    pub device: Device,
    pub os: String,
    pub browser: String,
    pub location: GeoLocation,
    /// Referring page, when the client sent one
    pub referrer: Option<String>,
    /// Raw client address, retained for audit and export only
    pub source_ip: Option<IpAddr>,
}

/// Per-link analytics: running counters plus the append-only event log in
/// arrival order. `total_clicks` always equals `events.len()`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsRecord {
    pub link_id: i64,
    pub total_clicks: i64,
    pub unique_visitors: i64,
    pub events: Vec<ClickEvent>,
}

/// Acknowledgement of a successful record() call
#[derive(Debug, Clone, Copy)]
pub struct RecordAck {
    /// Counter value after this click was applied
    pub total_clicks: i64,
    /// Whether the visitor fingerprint was seen for the first time
    pub new_visitor: bool,
}
