//! User-agent enrichment and visitor identity
//!
//! Parsing is a pure signature scan over the raw user-agent string. It
//! never fails: unrecognized clients degrade to desktop with "unknown"
//! labels so ingestion stays available for malformed input.

use sha2::{Digest, Sha256};
use std::net::IpAddr;

use crate::analytics::models::Device;

/// Facets extracted from a user-agent string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device: Device,
    pub os: String,
    pub browser: String,
}

/// Classify a user-agent string into device/OS/browser facets.
///
/// An empty string (client sent no user-agent) yields `Device::Unknown`;
/// a present but unrecognized string yields `Device::Desktop`, matching
/// how desktop browsers omit a device token entirely.
pub fn parse_user_agent(user_agent: &str) -> DeviceInfo {
    let ua = user_agent.trim();
    if ua.is_empty() {
        return DeviceInfo {
            device: Device::Unknown,
            os: "unknown".to_string(),
            browser: "unknown".to_string(),
        };
    }

    let ua = ua.to_lowercase();

    // Android tablets carry "android" without the "mobile" token
    let device = if ua.contains("ipad")
        || ua.contains("tablet")
        || (ua.contains("android") && !ua.contains("mobi"))
    {
        Device::Tablet
    } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
        Device::Mobile
    } else {
        Device::Desktop
    };

    // Order matters: Edge and Opera embed "chrome", Chrome embeds "safari"
    let browser = if ua.contains("edg") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("chrome") || ua.contains("crios") {
        "Chrome"
    } else if ua.contains("firefox") || ua.contains("fxios") {
        "Firefox"
    } else if ua.contains("safari") {
        "Safari"
    } else {
        "unknown"
    };

    // iOS devices claim "like Mac OS X", Android claims "linux"
    let os = if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
        "iOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os") || ua.contains("macos") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "unknown"
    };

    DeviceInfo {
        device,
        os: os.to_string(),
        browser: browser.to_string(),
    }
}

/// Stable visitor identity: one visitor is one (address, user-agent) pair
/// per UTC day. The store counts a fingerprint at most once per subject.
pub fn visitor_fingerprint(ip: IpAddr, user_agent: &str, timestamp: i64) -> String {
    let day = chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_default();
    let digest = Sha256::digest(format!("{ip}|{user_agent}|{day}"));
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1";
    const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 16_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1";
    const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Mobile Safari/537.36";
    const WINDOWS_CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";
    const LINUX_FIREFOX_UA: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/114.0";
    const EDGE_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36 Edg/114.0.1823.43";

    #[test]
    fn test_iphone_is_mobile_safari_ios() {
        let info = parse_user_agent(IPHONE_UA);
        assert_eq!(info.device, Device::Mobile);
        assert_eq!(info.os, "iOS");
        assert_eq!(info.browser, "Safari");
    }

    #[test]
    fn test_ipad_is_tablet() {
        let info = parse_user_agent(IPAD_UA);
        assert_eq!(info.device, Device::Tablet);
        assert_eq!(info.os, "iOS");
    }

    #[test]
    fn test_android_phone_is_mobile_chrome() {
        let info = parse_user_agent(ANDROID_UA);
        assert_eq!(info.device, Device::Mobile);
        assert_eq!(info.os, "Android");
        assert_eq!(info.browser, "Chrome");
    }

    #[test]
    fn test_windows_chrome_is_desktop() {
        let info = parse_user_agent(WINDOWS_CHROME_UA);
        assert_eq!(info.device, Device::Desktop);
        assert_eq!(info.os, "Windows");
        assert_eq!(info.browser, "Chrome");
    }

    #[test]
    fn test_linux_firefox() {
        let info = parse_user_agent(LINUX_FIREFOX_UA);
        assert_eq!(info.device, Device::Desktop);
        assert_eq!(info.os, "Linux");
        assert_eq!(info.browser, "Firefox");
    }

    #[test]
    fn test_edge_wins_over_chrome() {
        let info = parse_user_agent(EDGE_UA);
        assert_eq!(info.browser, "Edge");
    }

    #[test]
    fn test_empty_user_agent_degrades_to_unknown() {
        let info = parse_user_agent("");
        assert_eq!(info.device, Device::Unknown);
        assert_eq!(info.os, "unknown");
        assert_eq!(info.browser, "unknown");
    }

    #[test]
    fn test_unrecognized_user_agent_degrades_to_desktop() {
        let info = parse_user_agent("definitely-not-a-browser/1.0");
        assert_eq!(info.device, Device::Desktop);
        assert_eq!(info.os, "unknown");
        assert_eq!(info.browser, "unknown");
    }

    #[test]
    fn test_fingerprint_is_stable_within_a_day() {
        let ip: IpAddr = "203.0.113.1".parse().unwrap();
        // Two clicks an hour apart on the same UTC day
        let a = visitor_fingerprint(ip, IPHONE_UA, 1_700_000_000);
        let b = visitor_fingerprint(ip, IPHONE_UA, 1_700_003_600);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_changes_across_days() {
        let ip: IpAddr = "203.0.113.1".parse().unwrap();
        let a = visitor_fingerprint(ip, IPHONE_UA, 1_700_000_000);
        let b = visitor_fingerprint(ip, IPHONE_UA, 1_700_000_000 + 86_400);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_distinguishes_addresses() {
        let a: IpAddr = "203.0.113.1".parse().unwrap();
        let b: IpAddr = "203.0.113.2".parse().unwrap();
        assert_ne!(
            visitor_fingerprint(a, IPHONE_UA, 1_700_000_000),
            visitor_fingerprint(b, IPHONE_UA, 1_700_000_000)
        );
    }
}
