use crate::analytics::models::{AnalyticsRecord, ClickEvent, Device, GeoLocation, RecordAck};
use crate::models::{Link, User};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("analytics record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            other => StorageError::Unavailable(other),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    // Link registry

    async fn create_link(&self, user_id: &str, title: &str, url: &str) -> StorageResult<Link>;

    async fn get_link(&self, link_id: i64) -> StorageResult<Option<Link>>;

    async fn links_for_user(&self, user_id: &str) -> StorageResult<Vec<Link>>;

    /// Delete a link and cascade to its analytics record, event log, and
    /// visitor keys. Returns false when the link does not exist.
    async fn delete_link(&self, link_id: i64) -> StorageResult<bool>;

    // User registry

    /// Register or refresh a user identity; `created_at` is stamped on
    /// first insert and never changes afterwards.
    async fn upsert_user(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> StorageResult<User>;

    /// Creation timestamps of users registered within the inclusive
    /// [from, to] window, ascending. Feeds the signup-growth rollup.
    async fn user_signup_timestamps(&self, from: i64, to: i64) -> StorageResult<Vec<i64>>;

    // Event store

    /// Append one click to the subject's event log and bump its counters.
    ///
    /// The append, the visitor-key registration, and the counter
    /// increments run in a single transaction with conflict-target
    /// upserts, so concurrent calls for the same subject cannot lose
    /// updates. The record row is created on the subject's first click.
    async fn record_click(
        &self,
        link_id: i64,
        event: &ClickEvent,
        visitor_fingerprint: &str,
    ) -> StorageResult<RecordAck>;

    /// A subject's counters plus its full event log in arrival order.
    /// `NotFound` until the first click is recorded.
    async fn get_record(&self, link_id: i64) -> StorageResult<AnalyticsRecord>;

    /// Events with `timestamp` in the inclusive [from, to] window, in
    /// arrival order. `link_ids = None` spans every subject; an empty
    /// slice matches nothing.
    async fn events_in_window(
        &self,
        link_ids: Option<&[i64]>,
        from: i64,
        to: i64,
    ) -> StorageResult<Vec<ClickEvent>>;

    /// Sum of the stored unique-visitor counters over the subject set
    /// (`None` = all subjects).
    async fn sum_unique_visitors(&self, link_ids: Option<&[i64]>) -> StorageResult<i64>;
}

/// Row shape shared by the SQL backends when hydrating events
#[derive(sqlx::FromRow)]
pub(crate) struct ClickEventRow {
    pub timestamp: i64,
    pub device: String,
    pub os: String,
    pub browser: String,
    pub country: String,
    pub city: String,
    pub referrer: Option<String>,
    pub source_ip: Option<String>,
}

impl From<ClickEventRow> for ClickEvent {
    fn from(row: ClickEventRow) -> Self {
        ClickEvent {
            timestamp: row.timestamp,
            device: Device::from_label(&row.device),
            os: row.os,
            browser: row.browser,
            location: GeoLocation {
                country: row.country,
                city: row.city,
            },
            referrer: row.referrer,
            source_ip: row.source_ip.and_then(|s| s.parse().ok()),
        }
    }
}
