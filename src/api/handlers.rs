use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::analytics::aggregator::{bucket_by_day, Aggregator, DayCount, RollupResult, Window};
use crate::analytics::enricher::{parse_user_agent, visitor_fingerprint};
use crate::analytics::export::{rows_from_events, to_csv, ExportFormat, ExportRow};
use crate::analytics::geo::GeoService;
use crate::analytics::ip_extractor::{anonymize_ip, extract_client_ip};
use crate::analytics::models::ClickEvent;
use crate::config::AnalyticsConfig;
use crate::models::{CreateLinkRequest, Link, UpsertUserRequest, User};
use crate::storage::{Storage, StorageError};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub aggregator: Aggregator,
    pub geo: Arc<GeoService>,
    pub analytics: AnalyticsConfig,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn success() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "success".to_string(),
    })
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound => api_error(StatusCode::NOT_FOUND, "not found"),
        other => {
            tracing::error!(error = %other, "storage operation failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
        }
    }
}

/// Caller identity, resolved by the fronting auth layer and forwarded in
/// the x-user-id header.
fn caller_identity(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "caller identity missing"))
}

/// Record one click against a link.
///
/// Enrichment (user-agent parse, geolocation) completes or degrades
/// before the store is touched; a geolocation outage therefore delays
/// only this one click and never blocks the store. A store failure is
/// surfaced as an error: the click is lost and the caller is told so.
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<i64>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let referrer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let mut client_ip = extract_client_ip(&headers, addr.ip(), &state.analytics);
    if state.analytics.ip_anonymization {
        client_ip = anonymize_ip(client_ip);
    }

    let device_info = parse_user_agent(user_agent);
    let location = state.geo.lookup(client_ip).await;

    let event = ClickEvent {
        timestamp: chrono::Utc::now().timestamp(),
        device: device_info.device,
        os: device_info.os,
        browser: device_info.browser,
        location,
        referrer,
        source_ip: Some(client_ip),
    };
    let fingerprint = visitor_fingerprint(client_ip, user_agent, event.timestamp);

    state
        .storage
        .record_click(link_id, &event, &fingerprint)
        .await
        .map_err(|err| {
            tracing::error!(link_id, error = %err, "failed to record click");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to record click")
        })?;

    Ok(success())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub total_clicks: u64,
    pub unique_visitors: i64,
    pub clicks_by_day: Vec<DayCount>,
    pub device_breakdown: BTreeMap<String, u64>,
    pub location_breakdown: BTreeMap<String, u64>,
}

impl From<RollupResult> for DashboardResponse {
    fn from(rollup: RollupResult) -> Self {
        Self {
            total_clicks: rollup.total_clicks,
            unique_visitors: rollup.unique_visitors,
            clicks_by_day: rollup.clicks_by_day,
            device_breakdown: rollup.device_breakdown,
            location_breakdown: rollup.country_breakdown,
        }
    }
}

/// 30-day rollup across all of the caller's links.
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, ApiError> {
    let user_id = caller_identity(&headers)?;

    let links = state
        .storage
        .links_for_user(&user_id)
        .await
        .map_err(storage_error)?;
    let link_ids: Vec<i64> = links.iter().map(|link| link.id).collect();

    let rollup = state
        .aggregator
        .rollup(Some(&link_ids), Window::last_days(30))
        .await
        .map_err(storage_error)?;

    Ok(Json(rollup.into()))
}

/// 30-day rollup for a single link owned by the caller.
pub async fn get_link_analytics(
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<RollupResult>, ApiError> {
    let user_id = caller_identity(&headers)?;

    let link = state
        .storage
        .get_link(link_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "link not found"))?;

    if link.user_id != user_id {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "link is not owned by the caller",
        ));
    }

    let rollup = state
        .aggregator
        .rollup(Some(&[link_id]), Window::last_days(30))
        .await
        .map_err(storage_error)?;

    Ok(Json(rollup))
}

#[derive(Debug, Deserialize)]
pub struct GlobalQueryParams {
    pub timeframe: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAnalyticsResponse {
    pub analytics: RollupResult,
    pub user_growth: Vec<DayCount>,
}

/// System-wide rollup plus per-day signup growth. Admin gating happens
/// upstream.
pub async fn get_global_analytics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GlobalQueryParams>,
) -> Result<Json<GlobalAnalyticsResponse>, ApiError> {
    let days = match params.timeframe.as_deref() {
        Some("7d") => 7,
        Some("90d") => 90,
        _ => 30,
    };
    let window = Window::last_days(days);

    let analytics = state
        .aggregator
        .rollup(None, window)
        .await
        .map_err(storage_error)?;

    // Signup growth rolls up user creation, not click events; the two
    // series only meet here in the response
    let signups = state
        .storage
        .user_signup_timestamps(window.from(), window.to())
        .await
        .map_err(storage_error)?;
    let user_growth = bucket_by_day(signups);

    Ok(Json(GlobalAnalyticsResponse {
        analytics,
        user_growth,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQueryParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub format: Option<String>,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub status: String,
    pub data: Vec<ExportRow>,
}

fn parse_export_date(value: Option<&str>, param: &str) -> Result<NaiveDate, ApiError> {
    let raw = value.ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, format!("{param} is required"))
    })?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("{param} must be a YYYY-MM-DD date"),
        )
    })
}

/// Export every click in the inclusive date range as CSV or JSON rows.
/// Both bounds are required and validated before the store is queried.
pub async fn export_analytics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportQueryParams>,
) -> Result<Response, ApiError> {
    let start_date = parse_export_date(params.start_date.as_deref(), "startDate")?;
    let end_date = parse_export_date(params.end_date.as_deref(), "endDate")?;

    let from = start_date.and_time(NaiveTime::MIN).and_utc().timestamp();
    let to = end_date
        .succ_opt()
        .map(|next| next.and_time(NaiveTime::MIN).and_utc().timestamp() - 1)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "endDate is out of range"))?;

    let window = Window::new(from, to)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "startDate is after endDate"))?;

    let events = state
        .storage
        .events_in_window(None, window.from(), window.to())
        .await
        .map_err(storage_error)?;
    let rows = rows_from_events(&events);

    match ExportFormat::from_token(params.format.as_deref()) {
        ExportFormat::Csv => {
            let filename = format!("analytics-{start_date}-{end_date}.csv");
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename={filename}"),
                    ),
                ],
                to_csv(&rows),
            )
                .into_response())
        }
        ExportFormat::Json => Ok(Json(ExportResponse {
            status: "success".to_string(),
            data: rows,
        })
        .into_response()),
    }
}

pub async fn create_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<Link>), ApiError> {
    let user_id = caller_identity(&headers)?;

    let title = payload.title.trim();
    let url = payload.url.trim();
    if title.is_empty() || url.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "title and url are required",
        ));
    }

    let link = state
        .storage
        .create_link(&user_id, title, url)
        .await
        .map_err(storage_error)?;

    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn list_links(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Link>>, ApiError> {
    let user_id = caller_identity(&headers)?;

    let links = state
        .storage
        .links_for_user(&user_id)
        .await
        .map_err(storage_error)?;

    Ok(Json(links))
}

pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(link_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    let user_id = caller_identity(&headers)?;

    let link = state
        .storage
        .get_link(link_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "link not found"))?;

    if link.user_id != user_id {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "link is not owned by the caller",
        ));
    }

    if state
        .storage
        .delete_link(link_id)
        .await
        .map_err(storage_error)?
    {
        Ok(success())
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "link not found"))
    }
}

/// Register or refresh the calling user in the registry.
pub async fn upsert_current_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpsertUserRequest>,
) -> Result<Json<User>, ApiError> {
    let user_id = caller_identity(&headers)?;

    let user = state
        .storage
        .upsert_user(&user_id, payload.email.as_deref(), payload.name.as_deref())
        .await
        .map_err(storage_error)?;

    Ok(Json(user))
}

pub async fn health_check() -> Json<StatusResponse> {
    success()
}
