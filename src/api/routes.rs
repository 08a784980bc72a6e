use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::handlers::{
    create_link, delete_link, export_analytics, get_dashboard, get_global_analytics,
    get_link_analytics, health_check, list_links, track_click, upsert_current_user, AppState,
};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/track/{link_id}", post(track_click))
        .route("/dashboard", get(get_dashboard))
        .route("/analytics/links/{link_id}", get(get_link_analytics))
        .route("/analytics/global", get(get_global_analytics))
        .route("/analytics/export", get(export_analytics))
        .route("/links", post(create_link).get(list_links))
        .route("/links/{link_id}", delete(delete_link))
        .route("/users/me", put(upsert_current_user))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
