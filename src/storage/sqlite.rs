use crate::analytics::models::{AnalyticsRecord, ClickEvent, RecordAck};
use crate::models::{Link, User};
use crate::storage::trait_def::ClickEventRow;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn unix_now() -> StorageResult<i64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| StorageError::Other(e.into()))?
        .as_secs() as i64)
}

const SELECT_LINK: &str =
    "SELECT id, user_id, title, url, is_active, clicks, created_at FROM links";

const SELECT_EVENT: &str =
    "SELECT timestamp, device, os, browser, country, city, referrer, source_ip FROM click_events";

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                clicks INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_user_id ON links(user_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                email TEXT,
                name TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        // Counters live next to the log they summarize; the log itself is
        // a separate append-only table keyed by subject and time
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics_records (
                link_id INTEGER PRIMARY KEY,
                total_clicks INTEGER NOT NULL DEFAULT 0,
                unique_visitors INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                device TEXT NOT NULL,
                os TEXT NOT NULL,
                browser TEXT NOT NULL,
                country TEXT NOT NULL,
                city TEXT NOT NULL,
                referrer TEXT,
                source_ip TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_click_events_link_time ON click_events(link_id, timestamp)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_click_events_time ON click_events(timestamp)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visitor_keys (
                link_id INTEGER NOT NULL,
                fingerprint TEXT NOT NULL,
                PRIMARY KEY (link_id, fingerprint)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_link(&self, user_id: &str, title: &str, url: &str) -> StorageResult<Link> {
        let created_at = unix_now()?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO links (user_id, title, url, is_active, clicks, created_at)
            VALUES (?, ?, ?, 1, 0, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(url)
        .bind(created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        let link = sqlx::query_as::<_, Link>(&format!("{SELECT_LINK} WHERE id = ?"))
            .bind(id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(link)
    }

    async fn get_link(&self, link_id: i64) -> StorageResult<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!("{SELECT_LINK} WHERE id = ?"))
            .bind(link_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(link)
    }

    async fn links_for_user(&self, user_id: &str) -> StorageResult<Vec<Link>> {
        let links =
            sqlx::query_as::<_, Link>(&format!("{SELECT_LINK} WHERE user_id = ? ORDER BY id"))
                .bind(user_id)
                .fetch_all(self.pool.as_ref())
                .await?;

        Ok(links)
    }

    async fn delete_link(&self, link_id: i64) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM click_events WHERE link_id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM visitor_keys WHERE link_id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM analytics_records WHERE link_id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM links WHERE id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_user(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> StorageResult<User> {
        let now = unix_now()?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                email = COALESCE(excluded.email, users.email),
                name = COALESCE(excluded.name, users.name),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, email, name, created_at FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn user_signup_timestamps(&self, from: i64, to: i64) -> StorageResult<Vec<i64>> {
        let timestamps: Vec<i64> = sqlx::query_scalar(
            "SELECT created_at FROM users WHERE created_at >= ? AND created_at <= ? ORDER BY created_at",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(timestamps)
    }

    async fn record_click(
        &self,
        link_id: i64,
        event: &ClickEvent,
        visitor_fingerprint: &str,
    ) -> StorageResult<RecordAck> {
        let now = unix_now()?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO click_events (link_id, timestamp, device, os, browser, country, city, referrer, source_ip)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(link_id)
        .bind(event.timestamp)
        .bind(event.device.as_str())
        .bind(&event.os)
        .bind(&event.browser)
        .bind(&event.location.country)
        .bind(&event.location.city)
        .bind(&event.referrer)
        .bind(event.source_ip.map(|ip| ip.to_string()))
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO visitor_keys (link_id, fingerprint)
            VALUES (?, ?)
            ON CONFLICT (link_id, fingerprint) DO NOTHING
            "#,
        )
        .bind(link_id)
        .bind(visitor_fingerprint)
        .execute(&mut *tx)
        .await?;
        let new_visitor = inserted.rows_affected() > 0;

        // Conflict-target upsert: create-if-absent and increment are one
        // statement, so there is no read-increment-write race to lose
        let total_clicks: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO analytics_records (link_id, total_clicks, unique_visitors, created_at, updated_at)
            VALUES (?, 1, ?, ?, ?)
            ON CONFLICT (link_id) DO UPDATE SET
                total_clicks = analytics_records.total_clicks + 1,
                unique_visitors = analytics_records.unique_visitors + excluded.unique_visitors,
                updated_at = excluded.updated_at
            RETURNING total_clicks
            "#,
        )
        .bind(link_id)
        .bind(if new_visitor { 1_i64 } else { 0 })
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE links SET clicks = clicks + 1 WHERE id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(RecordAck {
            total_clicks,
            new_visitor,
        })
    }

    async fn get_record(&self, link_id: i64) -> StorageResult<AnalyticsRecord> {
        let counters: Option<(i64, i64)> = sqlx::query_as(
            "SELECT total_clicks, unique_visitors FROM analytics_records WHERE link_id = ?",
        )
        .bind(link_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        let Some((total_clicks, unique_visitors)) = counters else {
            return Err(StorageError::NotFound);
        };

        let rows: Vec<ClickEventRow> =
            sqlx::query_as(&format!("{SELECT_EVENT} WHERE link_id = ? ORDER BY id"))
                .bind(link_id)
                .fetch_all(self.pool.as_ref())
                .await?;

        Ok(AnalyticsRecord {
            link_id,
            total_clicks,
            unique_visitors,
            events: rows.into_iter().map(ClickEvent::from).collect(),
        })
    }

    async fn events_in_window(
        &self,
        link_ids: Option<&[i64]>,
        from: i64,
        to: i64,
    ) -> StorageResult<Vec<ClickEvent>> {
        let rows: Vec<ClickEventRow> = match link_ids {
            None => {
                sqlx::query_as(&format!(
                    "{SELECT_EVENT} WHERE timestamp >= ? AND timestamp <= ? ORDER BY id"
                ))
                .bind(from)
                .bind(to)
                .fetch_all(self.pool.as_ref())
                .await?
            }
            Some(ids) if ids.is_empty() => Vec::new(),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "{SELECT_EVENT} WHERE link_id IN ({placeholders}) AND timestamp >= ? AND timestamp <= ? ORDER BY id"
                );
                let mut query = sqlx::query_as(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                query
                    .bind(from)
                    .bind(to)
                    .fetch_all(self.pool.as_ref())
                    .await?
            }
        };

        Ok(rows.into_iter().map(ClickEvent::from).collect())
    }

    async fn sum_unique_visitors(&self, link_ids: Option<&[i64]>) -> StorageResult<i64> {
        let sum: Option<i64> = match link_ids {
            None => {
                sqlx::query_scalar("SELECT SUM(unique_visitors) FROM analytics_records")
                    .fetch_one(self.pool.as_ref())
                    .await?
            }
            Some(ids) if ids.is_empty() => None,
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT SUM(unique_visitors) FROM analytics_records WHERE link_id IN ({placeholders})"
                );
                let mut query = sqlx::query_scalar(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                query.fetch_one(self.pool.as_ref()).await?
            }
        };

        Ok(sum.unwrap_or(0))
    }
}
