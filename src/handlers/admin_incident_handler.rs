use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::incident_repository::IncidentRepository;
use crate::models::incident::{CreateIncident, CreateIncidentUpdate, IncidentImpact, IncidentStatus};
use crate::utils::admin_auth::AdminAuth;
use crate::utils::error::ApiError;
use crate::utils::timeutil;
use crate::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<i64>,
    #[serde(default)]
    pub resolved_only: bool,
}

pub async fn list_incidents(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let incidents = IncidentRepository::new(&state.db)
        .get_page(limit, query.cursor, query.resolved_only)
        .await?;
    Ok(Json(serde_json::json!({ "incidents": incidents })))
}

pub async fn create_incident(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(payload): Json<CreateIncident>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::invalid("title must not be empty"));
    }
    let status = IncidentStatus::parse(&payload.status)
        .ok_or_else(|| ApiError::invalid(format!("unknown status '{}'", payload.status)))?;
    if status == IncidentStatus::Resolved {
        return Err(ApiError::invalid("new incidents cannot start resolved"));
    }
    let impact = IncidentImpact::parse(&payload.impact)
        .ok_or_else(|| ApiError::invalid(format!("unknown impact '{}'", payload.impact)))?;
    if payload.monitor_ids.is_empty() {
        return Err(ApiError::invalid("at least one monitor link is required"));
    }

    let now = timeutil::now_unix();
    let started_at = payload.started_at.unwrap_or(now);

    let repo = IncidentRepository::new(&state.db);
    let id = repo
        .create(
            &payload.title,
            status,
            impact,
            payload.message.as_deref(),
            started_at,
            &payload.monitor_ids,
        )
        .await?;

    let detail = repo
        .get_detail(id)
        .await?
        .ok_or(ApiError::Internal)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn add_update(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(incident_id): Path<i64>,
    Json(payload): Json<CreateIncidentUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::invalid("message must not be empty"));
    }
    let status = payload
        .status
        .as_deref()
        .map(|s| {
            IncidentStatus::parse(s)
                .ok_or_else(|| ApiError::invalid(format!("unknown status '{s}'")))
        })
        .transpose()?;

    let repo = IncidentRepository::new(&state.db);
    let incident = repo
        .get_by_id(incident_id)
        .await?
        .ok_or_else(|| ApiError::not_found("incident not found"))?;
    if incident.resolved_at.is_some() {
        return Err(ApiError::Conflict("incident is already resolved".to_string()));
    }

    repo.add_update(incident_id, status, &payload.message, timeutil::now_unix())
        .await?;

    let detail = repo.get_detail(incident_id).await?.ok_or(ApiError::Internal)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Resolving twice returns the original `resolved_at` without creating
/// another update.
pub async fn resolve_incident(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(incident_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = IncidentRepository::new(&state.db);
    let (resolved_at, already_resolved) = repo
        .resolve(incident_id, timeutil::now_unix())
        .await?
        .ok_or_else(|| ApiError::not_found("incident not found"))?;

    Ok(Json(serde_json::json!({
        "resolved_at": resolved_at,
        "already_resolved": already_resolved,
    })))
}

pub async fn delete_incident(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(incident_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = IncidentRepository::new(&state.db).delete(incident_id).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("incident not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
