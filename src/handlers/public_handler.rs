use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::incident_repository::IncidentRepository;
use crate::db::maintenance_repository::MaintenanceRepository;
use crate::db::monitor_repository::MonitorRepository;
use crate::db::rollup_repository::RollupRepository;
use crate::models::monitor::Monitor;
use crate::services::{analytics_service, rollup_service, snapshot_service};
use crate::utils::error::ApiError;
use crate::utils::timeutil::{self, Range, DAY};
use crate::AppState;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

#[derive(Deserialize)]
pub struct IncidentListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<i64>,
    #[serde(default)]
    pub resolved_only: bool,
}

#[derive(Deserialize)]
pub struct DayContextQuery {
    pub day_start_at: i64,
}

/// `GET /public/status`: the snapshot-backed status page payload.
pub async fn get_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let now = timeutil::now_unix();
    let served = snapshot_service::serve(&state.db, &state.config, now).await?;

    let cache_control =
        snapshot_service::cache_control(served.age, state.config.snapshot_max_age_sec);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CACHE_CONTROL, cache_control),
        ],
        served.body_json,
    ))
}

/// `GET /public/monitors/:id/latency?range=24h`: raw points for charting.
pub async fn get_monitor_latency(
    State(state): State<AppState>,
    Path(monitor_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = parse_range(query.range.as_deref(), Range::Day, &[Range::Day])?;
    let monitor = public_monitor(&state, monitor_id).await?;

    let now = timeutil::now_unix();
    let analytics = analytics_service::monitor_analytics(&state.db, &monitor, range, now).await?;

    Ok(Json(serde_json::json!({
        "monitor": { "id": monitor.id, "name": monitor.name },
        "range": analytics.range,
        "range_start_at": analytics.range_start_at,
        "range_end_at": analytics.range_end_at,
        "avg_latency_ms": analytics.avg_latency_ms,
        "p95_latency_ms": analytics.p95_latency_ms,
        "points": analytics.points,
    })))
}

/// `GET /public/monitors/:id/uptime?range=24h|7d|30d`.
pub async fn get_monitor_uptime(
    State(state): State<AppState>,
    Path(monitor_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = parse_range(
        query.range.as_deref(),
        Range::Day,
        &[Range::Day, Range::Week, Range::Month],
    )?;
    let monitor = public_monitor(&state, monitor_id).await?;

    let now = timeutil::now_unix();
    let analytics = analytics_service::monitor_analytics(&state.db, &monitor, range, now).await?;

    Ok(Json(serde_json::json!({
        "monitor": { "id": monitor.id, "name": monitor.name },
        "range": analytics.range,
        "range_start_at": analytics.range_start_at,
        "range_end_at": analytics.range_end_at,
        "total_sec": analytics.total_sec,
        "downtime_sec": analytics.downtime_sec,
        "unknown_sec": analytics.unknown_sec,
        "uptime_sec": analytics.uptime_sec,
        "uptime_pct": analytics.uptime_pct,
    })))
}

/// `GET /public/analytics/uptime?range=30d|90d`.
pub async fn get_analytics_uptime(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = parse_range(
        query.range.as_deref(),
        Range::Month,
        &[Range::Month, Range::Quarter],
    )?;

    let now = timeutil::now_unix();
    let overview = analytics_service::uptime_overview(&state.db, range, now).await?;
    Ok(Json(overview))
}

/// `GET /public/incidents?limit=&cursor=&resolved_only=`.
pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 50);
    let incidents = IncidentRepository::new(&state.db)
        .get_page(limit, query.cursor, query.resolved_only)
        .await?;

    let next_cursor = incidents
        .iter()
        .filter(|d| d.incident.resolved_at.is_some())
        .map(|d| d.incident.id)
        .min();

    Ok(Json(serde_json::json!({
        "incidents": incidents,
        "next_cursor": next_cursor,
    })))
}

/// `GET /public/maintenance-windows`: active and upcoming windows.
pub async fn list_maintenance_windows(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let now = timeutil::now_unix();
    let repo = MaintenanceRepository::new(&state.db);
    let active = repo.get_active(now, 10).await?;
    let upcoming = repo.get_upcoming(now, 10).await?;

    Ok(Json(serde_json::json!({
        "active": active,
        "upcoming": upcoming,
    })))
}

/// `GET /public/monitors/:id/day-context?day_start_at=`: one UTC day in
/// rollup form, computed live when no row exists yet.
pub async fn get_day_context(
    State(state): State<AppState>,
    Path(monitor_id): Path<i64>,
    Query(query): Query<DayContextQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.day_start_at % DAY != 0 {
        return Err(ApiError::invalid("day_start_at must be a UTC day boundary"));
    }
    let monitor = public_monitor(&state, monitor_id).await?;

    if let Some(rollup) = RollupRepository::new(&state.db)
        .get_day(monitor.id, query.day_start_at)
        .await?
    {
        return Ok(Json(serde_json::json!({ "day": rollup, "live": false })));
    }

    let now = timeutil::now_unix();
    let day_start = query.day_start_at;
    let day_end = (day_start + DAY).min(timeutil::floor_to_minute(now));
    let range_start = day_start.max(monitor.created_at);
    if range_start >= day_end {
        return Err(ApiError::not_found("no data for that day"));
    }

    let outages = crate::db::outage_repository::OutageRepository::new(&state.db)
        .get_overlapping(monitor.id, range_start, day_end)
        .await?;
    let checks = crate::db::check_repository::CheckRepository::new(&state.db)
        .get_range(monitor.id, range_start - 2 * monitor.interval_sec, day_end)
        .await?;

    let rollup =
        rollup_service::compute_rollup(&monitor, day_start, range_start, day_end, &outages, &checks)
            .ok_or_else(|| ApiError::not_found("no data for that day"))?;

    Ok(Json(serde_json::json!({ "day": rollup, "live": true })))
}

fn parse_range(
    raw: Option<&str>,
    default: Range,
    allowed: &[Range],
) -> Result<Range, ApiError> {
    let range = match raw {
        None => default,
        Some(raw) => Range::parse(raw)
            .ok_or_else(|| ApiError::invalid(format!("unsupported range '{raw}'")))?,
    };
    if allowed.contains(&range) {
        Ok(range)
    } else {
        Err(ApiError::invalid(format!(
            "range '{}' is not supported here",
            range.as_str()
        )))
    }
}

async fn public_monitor(state: &AppState, monitor_id: i64) -> Result<Monitor, ApiError> {
    let monitor = MonitorRepository::new(&state.db)
        .get_by_id(monitor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("monitor not found"))?;
    if !monitor.is_active {
        return Err(ApiError::not_found("monitor not found"));
    }
    Ok(monitor)
}
