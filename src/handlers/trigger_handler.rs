use axum::{extract::State, response::IntoResponse, Json};

use crate::services::rollup_service::RollupService;
use crate::services::scheduler::Scheduler;
use crate::utils::admin_auth::AdminAuth;
use crate::utils::error::ApiError;
use crate::utils::timeutil;
use crate::AppState;

/// `POST /triggers/tick`: one scheduler pass. The lease row makes missed
/// and overlapping invocations safe.
pub async fn run_tick(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = Scheduler::new(state.db.clone(), state.config.clone());
    let summary = scheduler.run_tick(timeutil::now_unix()).await?;
    Ok(Json(summary))
}

/// `POST /triggers/daily-rollup`: roll up the previous UTC day.
pub async fn run_daily_rollup(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let service = RollupService::new(state.db.clone(), state.config.clone());
    let summary = service.run_daily_rollup(timeutil::now_unix()).await?;
    Ok(Json(summary))
}
