use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::db::channel_repository::ChannelRepository;
use crate::models::channel::{CreateChannel, UpdateChannel, WebhookConfig};
use crate::services::notifier::Notifier;
use crate::utils::admin_auth::AdminAuth;
use crate::utils::error::ApiError;
use crate::utils::timeutil;
use crate::AppState;

const WEBHOOK_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

pub async fn list_channels(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let channels = ChannelRepository::new(&state.db).get_all().await?;
    Ok(Json(serde_json::json!({ "channels": channels })))
}

pub async fn create_channel(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(payload): Json<CreateChannel>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::invalid("name must not be empty"));
    }
    if payload.kind != "webhook" {
        return Err(ApiError::invalid(format!("unknown channel type '{}'", payload.kind)));
    }
    let config = parse_config(payload.config)?;

    let repo = ChannelRepository::new(&state.db);
    let id = repo
        .create(&payload.name, &payload.kind, &config, timeutil::now_unix())
        .await?;
    let channel = repo.get_by_id(id).await?.ok_or(ApiError::Internal)?;

    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn update_channel(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(channel_id): Path<i64>,
    Json(payload): Json<UpdateChannel>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = ChannelRepository::new(&state.db);
    let mut channel = repo
        .get_by_id(channel_id)
        .await?
        .ok_or_else(|| ApiError::not_found("channel not found"))?;

    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(ApiError::invalid("name must not be empty"));
        }
        channel.name = name;
    }
    if let Some(config) = payload.config {
        channel.config = parse_config(config)?;
    }
    if let Some(is_active) = payload.is_active {
        channel.is_active = is_active;
    }

    repo.update(&channel).await?;
    Ok(Json(channel))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(channel_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = ChannelRepository::new(&state.db).delete(channel_id).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("channel not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Push a synthetic event through the normal delivery path. The event key
/// embeds the current second so repeated tests are never deduplicated away.
pub async fn test_channel(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(channel_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = ChannelRepository::new(&state.db);
    let channel = repo
        .get_by_id(channel_id)
        .await?
        .ok_or_else(|| ApiError::not_found("channel not found"))?;

    let now = timeutil::now_unix();
    let event_key = format!("channel:{}:test:{}", channel.id, now);
    let payload = serde_json::json!({
        "event": "monitor.test",
        "event_id": event_key,
        "timestamp": now,
        "monitor": serde_json::Value::Null,
        "state": serde_json::Value::Null,
    });

    let notifier = Notifier::new(state.db.clone());
    notifier
        .dispatch_event(std::slice::from_ref(&channel), &event_key, &payload, now)
        .await;

    let deliveries = repo.get_deliveries_for_event(&event_key).await?;
    Ok(Json(serde_json::json!({ "delivery": deliveries.first() })))
}

fn parse_config(raw: serde_json::Value) -> Result<WebhookConfig, ApiError> {
    let config: WebhookConfig = serde_json::from_value(raw)
        .map_err(|e| ApiError::invalid(format!("invalid webhook config: {e}")))?;

    let url: reqwest::Url = config
        .url
        .parse()
        .map_err(|_| ApiError::invalid("invalid webhook url"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ApiError::invalid("webhook url must be http or https"));
    }
    if !WEBHOOK_METHODS.contains(&config.method.as_str()) {
        return Err(ApiError::invalid(format!("unsupported webhook method '{}'", config.method)));
    }
    if config.timeout_ms <= 0 {
        return Err(ApiError::invalid("timeout_ms must be positive"));
    }
    if config.payload_type != "json" {
        return Err(ApiError::invalid("payload_type must be 'json'"));
    }
    if let Some(signing) = &config.signing {
        if signing.enabled && signing.secret_ref.trim().is_empty() {
            return Err(ApiError::invalid("signing.secret_ref must be set when signing is enabled"));
        }
    }

    Ok(config)
}
