use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::monitor_repository::MonitorRepository;
use crate::db::outage_repository::OutageRepository;
use crate::services::analytics_service;
use crate::utils::admin_auth::AdminAuth;
use crate::utils::error::ApiError;
use crate::utils::timeutil::{self, Range};
use crate::AppState;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

#[derive(Deserialize)]
pub struct OutageListQuery {
    pub range: Option<String>,
    pub cursor: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /admin/analytics/overview?range=24h|7d`.
pub async fn overview(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = parse_range(query.range.as_deref(), Range::Day, &[Range::Day, Range::Week])?;
    let report = analytics_service::overview(&state.db, range, timeutil::now_unix()).await?;
    Ok(Json(report))
}

/// `GET /admin/analytics/monitors/:id?range=24h|7d|30d|90d`.
pub async fn monitor_analytics(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(monitor_id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = parse_range(
        query.range.as_deref(),
        Range::Day,
        &[Range::Day, Range::Week, Range::Month, Range::Quarter],
    )?;

    let monitor = MonitorRepository::new(&state.db)
        .get_by_id(monitor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("monitor not found"))?;

    let analytics =
        analytics_service::monitor_analytics(&state.db, &monitor, range, timeutil::now_unix())
            .await?;
    Ok(Json(analytics))
}

/// `GET /admin/analytics/monitors/:id/outages?range=&cursor=&limit=`.
pub async fn monitor_outages(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(monitor_id): Path<i64>,
    Query(query): Query<OutageListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = parse_range(
        query.range.as_deref(),
        Range::Week,
        &[Range::Day, Range::Week, Range::Month, Range::Quarter],
    )?;
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    MonitorRepository::new(&state.db)
        .get_by_id(monitor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("monitor not found"))?;

    let (range_start, range_end) = analytics_service::range_bounds(range, timeutil::now_unix());
    let outages = OutageRepository::new(&state.db)
        .get_page(monitor_id, range_start, range_end, query.cursor, limit)
        .await?;

    let next_cursor = if outages.len() as i64 == limit {
        outages.last().map(|o| o.id)
    } else {
        None
    };

    Ok(Json(serde_json::json!({
        "range": range.as_str(),
        "range_start_at": range_start,
        "range_end_at": range_end,
        "outages": outages,
        "next_cursor": next_cursor,
    })))
}

fn parse_range(raw: Option<&str>, default: Range, allowed: &[Range]) -> Result<Range, ApiError> {
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
