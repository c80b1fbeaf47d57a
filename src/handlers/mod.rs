pub mod admin_analytics_handler;
pub mod admin_channel_handler;
pub mod admin_incident_handler;
pub mod admin_maintenance_handler;
pub mod admin_monitor_handler;
pub mod admin_settings_handler;
pub mod public_handler;
pub mod trigger_handler;
