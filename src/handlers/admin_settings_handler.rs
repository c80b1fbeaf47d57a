use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::db::settings_repository::SettingsRepository;
use crate::utils::admin_auth::AdminAuth;
use crate::utils::error::ApiError;
use crate::AppState;

/// Keys the public builder reads into the snapshot's `page` block.
const KNOWN_KEYS: [&str; 2] = ["page_title", "page_description"];

#[derive(Deserialize)]
pub struct PatchSettings {
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

pub async fn get_settings(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let settings = SettingsRepository::new(&state.db).get_all().await?;
    Ok(Json(serde_json::json!({ "settings": settings })))
}

pub async fn patch_settings(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(payload): Json<PatchSettings>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.values.is_empty() {
        return Err(ApiError::invalid("no settings provided"));
    }
    for key in payload.values.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            return Err(ApiError::invalid(format!("unknown setting '{key}'")));
        }
    }

    let repo = SettingsRepository::new(&state.db);
    for (key, value) in &payload.values {
        repo.set(key, value).await?;
    }

    let settings = repo.get_all().await?;
    Ok(Json(serde_json::json!({ "settings": settings })))
}
