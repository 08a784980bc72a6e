//! Raw event export
//!
//! Flattens stored click events into one row per event, rendered either
//! as CSV (header line plus quoted rows) or as structured JSON records.

use serde::Serialize;

use crate::analytics::models::ClickEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Absent or unrecognized tokens fall back to structured JSON output.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some(t) if t.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

pub const CSV_COLUMNS: [&str; 6] = ["date", "device", "browser", "country", "city", "referrer"];

/// One flattened row per recorded click
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExportRow {
    pub date: String,
    pub device: String,
    pub browser: String,
    pub country: String,
    pub city: String,
    pub referrer: String,
}

pub fn rows_from_events(events: &[ClickEvent]) -> Vec<ExportRow> {
    events
        .iter()
        .map(|event| ExportRow {
            date: chrono::DateTime::from_timestamp(event.timestamp, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
            device: event.device.to_string(),
            browser: event.browser.clone(),
            country: event.location.country.clone(),
            city: event.location.city.clone(),
            referrer: event.referrer.clone().unwrap_or_default(),
        })
        .collect()
}

/// Render rows as CSV. Every field is quoted; embedded quotes are doubled
/// per RFC 4180.
pub fn to_csv(rows: &[ExportRow]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_COLUMNS.join(","));
    out.push('\n');

    for row in rows {
        let fields = [
            &row.date,
            &row.device,
            &row.browser,
            &row.country,
            &row.city,
            &row.referrer,
        ];
        let line = fields
            .iter()
            .map(|field| quote_field(field))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }

    out
}

fn quote_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::{Device, GeoLocation};

    fn event(device: Device, country: &str) -> ClickEvent {
        ClickEvent {
            timestamp: 1_700_000_000,
            device,
            os: "unknown".to_string(),
            browser: "Chrome".to_string(),
            location: GeoLocation {
                country: country.to_string(),
                city: "Unknown".to_string(),
            },
            referrer: Some("https://example.com".to_string()),
            source_ip: None,
        }
    }

    #[test]
    fn test_csv_has_header_plus_one_line_per_event() {
        let events = vec![event(Device::Mobile, "US"), event(Device::Desktop, "FR")];
        let csv = to_csv(&rows_from_events(&events));

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "date,device,browser,country,city,referrer");
        assert!(lines[1].contains("\"mobile\""));
        assert!(lines[1].contains("\"US\""));
        assert!(lines[2].contains("\"desktop\""));
        assert!(lines[2].contains("\"FR\""));
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        let mut e = event(Device::Desktop, "US");
        e.referrer = Some(r#"https://example.com/?q="rust""#.to_string());
        let csv = to_csv(&rows_from_events(&[e]));

        assert!(csv.contains(r#""https://example.com/?q=""rust""""#));
    }

    #[test]
    fn test_embedded_commas_stay_inside_the_field() {
        let mut e = event(Device::Desktop, "Korea, Republic of");
        e.referrer = None;
        let rows = rows_from_events(&[e]);
        let csv = to_csv(&rows);

        let data_line = csv.lines().nth(1).unwrap();
        assert!(data_line.contains("\"Korea, Republic of\""));
        // A quote-aware reader still sees exactly six fields
        assert_eq!(data_line.matches("\",\"").count(), 5);
    }

    #[test]
    fn test_missing_referrer_exports_as_empty_field() {
        let mut e = event(Device::Mobile, "US");
        e.referrer = None;
        let rows = rows_from_events(&[e]);
        assert_eq!(rows[0].referrer, "");
    }

    #[test]
    fn test_format_token_fallback() {
        assert_eq!(ExportFormat::from_token(Some("csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_token(Some("CSV")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_token(Some("json")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_token(Some("xml")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_token(None), ExportFormat::Json);
    }
}
