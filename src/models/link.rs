use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A published outbound link. Each link is the subject of one analytics
/// record; the `clicks` column is a denormalized display counter, the
/// authoritative count lives with the event log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub url: String,
    pub is_active: bool,
    pub clicks: i64,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub title: String,
    pub url: String,
}
