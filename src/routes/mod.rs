use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{
    admin_analytics_handler, admin_channel_handler, admin_incident_handler,
    admin_maintenance_handler, admin_monitor_handler, admin_settings_handler, public_handler,
    trigger_handler,
};
use crate::AppState;

/// The unauthenticated status-page API. Browsers on any origin may poll it.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(public_handler::get_status))
        .route("/monitors/:id/latency", get(public_handler::get_monitor_latency))
        .route("/monitors/:id/uptime", get(public_handler::get_monitor_uptime))
        .route("/monitors/:id/day-context", get(public_handler::get_day_context))
        .route("/analytics/uptime", get(public_handler::get_analytics_uptime))
        .route("/incidents", get(public_handler::list_incidents))
        .route("/maintenance-windows", get(public_handler::list_maintenance_windows))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/monitors",
            get(admin_monitor_handler::list_monitors).post(admin_monitor_handler::create_monitor),
        )
        .route(
            "/monitors/:id",
            patch(admin_monitor_handler::update_monitor).delete(admin_monitor_handler::delete_monitor),
        )
        .route("/monitors/:id/pause", post(admin_monitor_handler::pause_monitor))
        .route("/monitors/:id/resume", post(admin_monitor_handler::resume_monitor))
        .route("/monitors/:id/test", post(admin_monitor_handler::test_monitor))
        .route(
            "/notification-channels",
            get(admin_channel_handler::list_channels).post(admin_channel_handler::create_channel),
        )
        .route(
            "/notification-channels/:id",
            patch(admin_channel_handler::update_channel).delete(admin_channel_handler::delete_channel),
        )
        .route("/notification-channels/:id/test", post(admin_channel_handler::test_channel))
        .route(
            "/incidents",
            get(admin_incident_handler::list_incidents).post(admin_incident_handler::create_incident),
        )
        .route("/incidents/:id", axum::routing::delete(admin_incident_handler::delete_incident))
        .route("/incidents/:id/updates", post(admin_incident_handler::add_update))
        .route("/incidents/:id/resolve", patch(admin_incident_handler::resolve_incident))
        .route(
            "/maintenance-windows",
            get(admin_maintenance_handler::list_windows).post(admin_maintenance_handler::create_window),
        )
        .route(
            "/maintenance-windows/:id",
            patch(admin_maintenance_handler::update_window)
                .delete(admin_maintenance_handler::delete_window),
        )
        .route("/analytics/overview", get(admin_analytics_handler::overview))
        .route("/analytics/monitors/:id", get(admin_analytics_handler::monitor_analytics))
        .route(
            "/analytics/monitors/:id/outages",
            get(admin_analytics_handler::monitor_outages),
        )
        .route(
            "/settings",
            get(admin_settings_handler::get_settings).patch(admin_settings_handler::patch_settings),
        )
}

/// Endpoints an external cron hits; bodies are empty and overlap is handled
/// by lease rows.
pub fn trigger_routes() -> Router<AppState> {
    Router::new()
        .route("/tick", post(trigger_handler::run_tick))
        .route("/daily-rollup", post(trigger_handler::run_daily_rollup))
}
