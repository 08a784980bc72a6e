//! Read-through cache over a storage backend
//!
//! Caches the link-registry lookups that sit on the hot read paths
//! (dashboard subject resolution, ownership checks). Click and visitor
//! counters are never cached or buffered: they stay authoritative in the
//! underlying store, and every event-store call passes straight through.
//! Cached link rows may report a `clicks` display counter up to one TTL
//! stale.

use crate::analytics::models::{AnalyticsRecord, ClickEvent, RecordAck};
use crate::models::{Link, User};
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

pub struct CachedStorage {
    inner: Arc<dyn Storage>,
    link_cache: Cache<i64, Option<Link>>,
    user_links_cache: Cache<String, Arc<Vec<Link>>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn Storage>, max_entries: u64, ttl_secs: u64) -> Self {
        let link_cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        let user_links_cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            link_cache,
            user_links_cache,
        }
    }
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_link(&self, user_id: &str, title: &str, url: &str) -> StorageResult<Link> {
        let link = self.inner.create_link(user_id, title, url).await?;

        self.link_cache.insert(link.id, Some(link.clone())).await;
        self.user_links_cache.invalidate(user_id).await;

        Ok(link)
    }

    async fn get_link(&self, link_id: i64) -> StorageResult<Option<Link>> {
        if let Some(cached) = self.link_cache.get(&link_id).await {
            return Ok(cached);
        }

        let result = self.inner.get_link(link_id).await?;
        self.link_cache.insert(link_id, result.clone()).await;

        Ok(result)
    }

    async fn links_for_user(&self, user_id: &str) -> StorageResult<Vec<Link>> {
        if let Some(cached) = self.user_links_cache.get(user_id).await {
            return Ok(cached.as_ref().clone());
        }

        let links = self.inner.links_for_user(user_id).await?;
        self.user_links_cache
            .insert(user_id.to_string(), Arc::new(links.clone()))
            .await;

        Ok(links)
    }

    async fn delete_link(&self, link_id: i64) -> StorageResult<bool> {
        // Resolve the owner first so their cached link list can be dropped
        let owner = self.inner.get_link(link_id).await?.map(|link| link.user_id);

        let deleted = self.inner.delete_link(link_id).await?;
        if deleted {
            self.link_cache.invalidate(&link_id).await;
            if let Some(owner) = owner {
                self.user_links_cache.invalidate(&owner).await;
            }
        }

        Ok(deleted)
    }

    async fn upsert_user(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> StorageResult<User> {
        self.inner.upsert_user(user_id, email, name).await
    }

    async fn user_signup_timestamps(&self, from: i64, to: i64) -> StorageResult<Vec<i64>> {
        self.inner.user_signup_timestamps(from, to).await
    }

    async fn record_click(
        &self,
        link_id: i64,
        event: &ClickEvent,
        visitor_fingerprint: &str,
    ) -> StorageResult<RecordAck> {
        self.inner
            .record_click(link_id, event, visitor_fingerprint)
            .await
    }

    async fn get_record(&self, link_id: i64) -> StorageResult<AnalyticsRecord> {
        self.inner.get_record(link_id).await
    }

    async fn events_in_window(
        &self,
        link_ids: Option<&[i64]>,
        from: i64,
        to: i64,
    ) -> StorageResult<Vec<ClickEvent>> {
        self.inner.events_in_window(link_ids, from, to).await
    }

    async fn sum_unique_visitors(&self, link_ids: Option<&[i64]>) -> StorageResult<i64> {
        self.inner.sum_unique_visitors(link_ids).await
    }
}
