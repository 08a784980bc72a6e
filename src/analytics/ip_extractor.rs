//! Client address extraction from HTTP headers with trust validation
//!
//! Forwarding headers are only honored according to the configured trust
//! mode; otherwise the socket remote address wins. Addresses can be
//! truncated to a network prefix before storage.

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Extract the client address for an inbound request.
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => {
            extract_from_x_forwarded_for(headers, config).unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<IpAddr>().ok())
}

/// Parse X-Forwarded-For, skipping the configured number of trusted
/// proxies from the right.
fn extract_from_x_forwarded_for(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let ips: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if ips.is_empty() {
        return None;
    }

    if let Some(num_trusted) = config.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        // Chain shorter than the trusted count: fall back to the leftmost
        return ips.first().copied();
    }

    // No trust configuration: the rightmost entry is the only hop we can
    // attribute to a proxy we received the connection from
    ips.last().copied()
}

/// Truncate an address to a network prefix: /24 for IPv4, /48 for IPv6.
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            IpAddr::V4(std::net::Ipv4Addr::new(octets[0], octets[1], octets[2], 0))
        }
        IpAddr::V6(addr) => {
            let segments = addr.segments();
            IpAddr::V6(std::net::Ipv6Addr::new(
                segments[0],
                segments[1],
                segments[2],
                0,
                0,
                0,
                0,
                0,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn create_config(mode: TrustedProxyMode) -> AnalyticsConfig {
        AnalyticsConfig {
            geo_base_url: "http://provider.test".to_string(),
            geo_timeout_ms: 100,
            ip_anonymization: false,
            trusted_proxy_mode: mode,
            num_trusted_proxies: None,
        }
    }

    #[test]
    fn test_none_mode_uses_socket_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let socket_addr: IpAddr = "192.168.1.1".parse().unwrap();

        let result = extract_client_ip(&headers, socket_addr, &create_config(TrustedProxyMode::None));
        assert_eq!(result, socket_addr);
    }

    #[test]
    fn test_cloudflare_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let socket_addr: IpAddr = "192.168.1.1".parse().unwrap();

        let result =
            extract_client_ip(&headers, socket_addr, &create_config(TrustedProxyMode::Cloudflare));
        assert_eq!(result, "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_cloudflare_mode_falls_back_to_socket() {
        let headers = HeaderMap::new();
        let socket_addr: IpAddr = "192.168.1.1".parse().unwrap();

        let result =
            extract_client_ip(&headers, socket_addr, &create_config(TrustedProxyMode::Cloudflare));
        assert_eq!(result, socket_addr);
    }

    #[test]
    fn test_x_forwarded_for_rightmost_without_trust_config() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let socket_addr: IpAddr = "192.168.1.1".parse().unwrap();

        let result =
            extract_client_ip(&headers, socket_addr, &create_config(TrustedProxyMode::Standard));
        assert_eq!(result, "198.51.100.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_x_forwarded_for_skips_trusted_proxies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1, 198.51.100.2"),
        );
        let socket_addr: IpAddr = "192.168.1.1".parse().unwrap();
        let mut config = create_config(TrustedProxyMode::Standard);
        config.num_trusted_proxies = Some(2);

        let result = extract_client_ip(&headers, socket_addr, &config);
        assert_eq!(result, "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_anonymize_ipv4() {
        let ip: IpAddr = "192.168.1.100".parse().unwrap();
        assert_eq!(anonymize_ip(ip), "192.168.1.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_anonymize_ipv6() {
        let ip: IpAddr = "2001:db8::1234:5678".parse().unwrap();
        assert_eq!(anonymize_ip(ip), "2001:db8::".parse::<IpAddr>().unwrap());
    }
}
