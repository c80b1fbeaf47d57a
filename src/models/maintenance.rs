use serde::{Deserialize, Serialize};

/// Operator-declared interval during which alerts for the linked monitors
/// are suppressed and the status page annotates "maintenance".
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceWindow {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub created_at: i64,
    pub monitor_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMaintenanceWindow {
    pub title: String,
    pub message: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub monitor_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMaintenanceWindow {
    pub title: Option<String>,
    pub message: Option<String>,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub monitor_ids: Option<Vec<i64>>,
}
