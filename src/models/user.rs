use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Registered user identity. Identities are resolved by the fronting auth
/// layer; this registry only records them so signup growth can be rolled
/// up from `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
}
