use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::db::maintenance_repository::MaintenanceRepository;
use crate::models::maintenance::{CreateMaintenanceWindow, UpdateMaintenanceWindow};
use crate::utils::admin_auth::AdminAuth;
use crate::utils::error::ApiError;
use crate::utils::timeutil;
use crate::AppState;

pub async fn list_windows(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let windows = MaintenanceRepository::new(&state.db).get_all().await?;
    Ok(Json(serde_json::json!({ "maintenance_windows": windows })))
}

pub async fn create_window(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(payload): Json<CreateMaintenanceWindow>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::invalid("title must not be empty"));
    }
    if payload.starts_at >= payload.ends_at {
        return Err(ApiError::invalid("starts_at must be before ends_at"));
    }
    if payload.monitor_ids.is_empty() {
        return Err(ApiError::invalid("at least one monitor link is required"));
    }

    let repo = MaintenanceRepository::new(&state.db);
    let id = repo
        .create(
            &payload.title,
            payload.message.as_deref(),
            payload.starts_at,
            payload.ends_at,
            &payload.monitor_ids,
            timeutil::now_unix(),
        )
        .await?;

    let window = repo.get_by_id(id).await?.ok_or(ApiError::Internal)?;
    Ok((StatusCode::CREATED, Json(window)))
}

pub async fn update_window(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(window_id): Path<i64>,
    Json(payload): Json<UpdateMaintenanceWindow>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = MaintenanceRepository::new(&state.db);
    let mut window = repo
        .get_by_id(window_id)
        .await?
        .ok_or_else(|| ApiError::not_found("maintenance window not found"))?;

    if let Some(title) = payload.title {
        window.title = title;
    }
    if payload.message.is_some() {
        window.message = payload.message;
    }
    if let Some(starts_at) = payload.starts_at {
        window.starts_at = starts_at;
    }
    if let Some(ends_at) = payload.ends_at {
        window.ends_at = ends_at;
    }
    if let Some(monitor_ids) = payload.monitor_ids {
        window.monitor_ids = monitor_ids;
    }

    if window.title.trim().is_empty() {
        return Err(ApiError::invalid("title must not be empty"));
    }
    if window.starts_at >= window.ends_at {
        return Err(ApiError::invalid("starts_at must be before ends_at"));
    }
    if window.monitor_ids.is_empty() {
        return Err(ApiError::invalid("at least one monitor link is required"));
    }

    repo.update(&window).await?;
    Ok(Json(window))
}

pub async fn delete_window(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(window_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = MaintenanceRepository::new(&state.db).delete(window_id).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("maintenance window not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
