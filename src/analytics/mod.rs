//! Click-analytics ingestion and aggregation engine
//!
//! A click arrives as raw request metadata (user-agent, client address,
//! referrer). Enrichment turns it into a structured [`models::ClickEvent`],
//! the storage layer appends it to the subject's event log while bumping
//! counters atomically, and the read paths ([`aggregator::Aggregator`],
//! [`export`]) compute windowed views on demand without mutating anything.

pub mod aggregator;
pub mod enricher;
pub mod export;
pub mod geo;
pub mod ip_extractor;
pub mod models;

pub use aggregator::{Aggregator, DayCount, RollupResult, Window};
pub use enricher::{parse_user_agent, visitor_fingerprint};
pub use export::ExportFormat;
pub use geo::GeoService;
pub use ip_extractor::extract_client_ip;
pub use models::{AnalyticsRecord, ClickEvent, Device, GeoLocation, RecordAck};
