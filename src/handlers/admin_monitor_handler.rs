use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::db::monitor_repository::MonitorRepository;
use crate::models::monitor::{CreateMonitor, Monitor, MonitorKind, MonitorStatus, UpdateMonitor};
use crate::services::probe_service;
use crate::utils::admin_auth::AdminAuth;
use crate::utils::error::ApiError;
use crate::utils::timeutil;
use crate::AppState;

const HTTP_METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

pub async fn list_monitors(
    State(state): State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let repo = MonitorRepository::new(&state.db);
    let monitors = repo.get_all().await?;
    let states = repo.get_states().await?;

    let monitors: Vec<serde_json::Value> = monitors
        .into_iter()
        .map(|monitor| {
            let state = states.iter().find(|s| s.monitor_id == monitor.id);
            serde_json::json!({ "monitor": monitor, "state": state })
        })
        .collect();

    Ok(Json(serde_json::json!({ "monitors": monitors })))
}

pub async fn create_monitor(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Json(payload): Json<CreateMonitor>,
) -> Result<impl IntoResponse, ApiError> {
    let now = timeutil::now_unix();
    let monitor = assemble(payload, now)?;
    validate(&monitor)?;

    let id = MonitorRepository::new(&state.db).create(&monitor).await?;
    let created = Monitor { id, ..monitor };

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_monitor(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(monitor_id): Path<i64>,
    Json(payload): Json<UpdateMonitor>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = MonitorRepository::new(&state.db);
    let mut monitor = repo
        .get_by_id(monitor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("monitor not found"))?;

    apply_update(&mut monitor, payload);
    monitor.updated_at = timeutil::now_unix();
    validate(&monitor)?;

    repo.update(&monitor).await?;
    Ok(Json(monitor))
}

pub async fn delete_monitor(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(monitor_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = MonitorRepository::new(&state.db)
        .delete_cascading(monitor_id)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("monitor not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Pausing only removes the monitor from scheduler selection; an ongoing
/// outage stays open.
pub async fn pause_monitor(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(monitor_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = MonitorRepository::new(&state.db);
    repo.get_by_id(monitor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("monitor not found"))?;

    repo.set_state_status(monitor_id, MonitorStatus::Paused, timeutil::now_unix())
        .await?;
    Ok(Json(serde_json::json!({ "status": "paused" })))
}

pub async fn resume_monitor(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(monitor_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = MonitorRepository::new(&state.db);
    repo.get_by_id(monitor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("monitor not found"))?;

    // Back to unknown until the next tick produces a fresh observation.
    repo.set_state_status(monitor_id, MonitorStatus::Unknown, timeutil::now_unix())
        .await?;
    Ok(Json(serde_json::json!({ "status": "unknown" })))
}

/// Run the probe once, right now, without persisting anything.
pub async fn test_monitor(
    State(state): State<AppState>,
    _auth: AdminAuth,
    Path(monitor_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let monitor = MonitorRepository::new(&state.db)
        .get_by_id(monitor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("monitor not found"))?;

    let outcome = probe_service::run_probe(&monitor).await;
    Ok(Json(outcome))
}

fn assemble(payload: CreateMonitor, now: i64) -> Result<Monitor, ApiError> {
    let kind = MonitorKind::parse(&payload.kind)
        .ok_or_else(|| ApiError::invalid(format!("unknown monitor type '{}'", payload.kind)))?;

    Ok(Monitor {
        id: 0,
        name: payload.name,
        kind,
        target: payload.target,
        interval_sec: payload.interval_sec,
        timeout_ms: payload.timeout_ms,
        is_active: true,
        http_method: payload.http_method,
        http_headers: payload.http_headers,
        http_body: payload.http_body,
        expected_status: payload.expected_status,
        response_keyword: payload.response_keyword,
        response_forbidden_keyword: payload.response_forbidden_keyword,
        created_at: now,
        updated_at: now,
    })
}

fn apply_update(monitor: &mut Monitor, payload: UpdateMonitor) {
    if let Some(name) = payload.name {
        monitor.name = name;
    }
    if let Some(target) = payload.target {
        monitor.target = target;
    }
    if let Some(interval_sec) = payload.interval_sec {
        monitor.interval_sec = interval_sec;
    }
    if let Some(timeout_ms) = payload.timeout_ms {
        monitor.timeout_ms = timeout_ms;
    }
    if let Some(is_active) = payload.is_active {
        monitor.is_active = is_active;
    }
    if payload.http_method.is_some() {
        monitor.http_method = payload.http_method;
    }
    if payload.http_headers.is_some() {
        monitor.http_headers = payload.http_headers;
    }
    if payload.http_body.is_some() {
        monitor.http_body = payload.http_body;
    }
    if payload.expected_status.is_some() {
        monitor.expected_status = payload.expected_status;
    }
    if payload.response_keyword.is_some() {
        monitor.response_keyword = payload.response_keyword;
    }
    if payload.response_forbidden_keyword.is_some() {
        monitor.response_forbidden_keyword = payload.response_forbidden_keyword;
    }
}

/// The write-side invariants: closed sets, minimum cadence, target
/// allow-lists, and HTTP-only fields absent for TCP monitors.
pub fn validate(monitor: &Monitor) -> Result<(), ApiError> {
    if monitor.name.trim().is_empty() {
        return Err(ApiError::invalid("name must not be empty"));
    }
    if monitor.interval_sec < 60 {
        return Err(ApiError::invalid("interval_sec must be at least 60"));
    }
    if monitor.timeout_ms < 1000 {
        return Err(ApiError::invalid("timeout_ms must be at least 1000"));
    }

    match monitor.kind {
        MonitorKind::Http => {
            probe_service::validate_http_target(&monitor.target).map_err(ApiError::invalid)?;

            if let Some(method) = &monitor.http_method {
                if !HTTP_METHODS.contains(&method.as_str()) {
                    return Err(ApiError::invalid(format!("unsupported method '{method}'")));
                }
            }
            if let Some(expected) = &monitor.expected_status {
                if expected.is_empty() {
                    return Err(ApiError::invalid("expected_status must not be empty"));
                }
                if expected.iter().any(|s| !(100..=599).contains(s)) {
                    return Err(ApiError::invalid("expected_status entries must be in [100, 599]"));
                }
            }
            if let Some(headers) = &monitor.http_headers {
                match headers {
                    serde_json::Value::Object(map) => {
                        if map.values().any(|v| !v.is_string()) {
                            return Err(ApiError::invalid("header values must be strings"));
                        }
                    }
                    _ => return Err(ApiError::invalid("http_headers must be an object")),
                }
            }
        }
        MonitorKind::Tcp => {
            probe_service::validate_tcp_target(&monitor.target).map_err(ApiError::invalid)?;

            if monitor.http_method.is_some()
                || monitor.http_headers.is_some()
                || monitor.http_body.is_some()
                || monitor.expected_status.is_some()
                || monitor.response_keyword.is_some()
                || monitor.response_forbidden_keyword.is_some()
            {
                return Err(ApiError::invalid("http fields are not valid for tcp monitors"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_monitor() -> Monitor {
        Monitor {
            id: 0,
            name: "api".to_string(),
            kind: MonitorKind::Http,
            target: "https://example.com/health".to_string(),
            interval_sec: 60,
            timeout_ms: 5000,
            is_active: true,
            http_method: Some("GET".to_string()),
            http_headers: None,
            http_body: None,
            expected_status: Some(vec![200]),
            response_keyword: None,
            response_forbidden_keyword: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_validate_accepts_sane_monitor() {
        assert!(validate(&http_monitor()).is_ok());
    }

    #[test]
    fn test_validate_rejects_short_interval_and_timeout() {
        let mut m = http_monitor();
        m.interval_sec = 30;
        assert!(validate(&m).is_err());

        let mut m = http_monitor();
        m.timeout_ms = 500;
        assert!(validate(&m).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_expected_status() {
        let mut m = http_monitor();
        m.expected_status = Some(vec![200, 700]);
        assert!(validate(&m).is_err());

        let mut m = http_monitor();
        m.expected_status = Some(vec![]);
        assert!(validate(&m).is_err());
    }

    #[test]
    fn test_validate_rejects_http_fields_on_tcp() {
        let mut m = http_monitor();
        m.kind = MonitorKind::Tcp;
        m.target = "db.example.com:5432".to_string();
        assert!(validate(&m).is_err());

        m.http_method = None;
        m.expected_status = None;
        assert!(validate(&m).is_ok());
    }

    #[test]
    fn test_validate_rejects_blocked_target() {
        let mut m = http_monitor();
        m.target = "http://192.168.0.1/".to_string();
        assert!(validate(&m).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_method() {
        let mut m = http_monitor();
        m.http_method = Some("FETCH".to_string());
        assert!(validate(&m).is_err());
    }
}
