//! IP geolocation via an external HTTP provider
//!
//! A lookup is a single bounded attempt against an ipapi-style endpoint
//! (`GET {base}/{ip}/json/`). Any transport error, non-success status,
//! decode failure, or timeout degrades to [`GeoLocation::unknown`]; the
//! click is recorded either way, and nothing is held while waiting.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::analytics::models::GeoLocation;

#[derive(Clone)]
pub struct GeoService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    country_name: Option<String>,
    city: Option<String>,
}

impl GeoService {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed to build geolocation HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve `ip` to a country and city. Never fails; one attempt, no
    /// retry.
    pub async fn lookup(&self, ip: IpAddr) -> GeoLocation {
        match self.try_lookup(ip).await {
            Ok(location) => location,
            Err(err) => {
                debug!(%ip, error = %err, "geolocation lookup degraded to Unknown");
                GeoLocation::unknown()
            }
        }
    }

    async fn try_lookup(&self, ip: IpAddr) -> Result<GeoLocation> {
        let url = format!("{}/{}/json/", self.base_url, ip);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: GeoResponse = response.json().await?;

        Ok(GeoLocation {
            country: body.country_name.unwrap_or_else(|| "Unknown".to_string()),
            city: body.city.unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}
