use serde::{Deserialize, Serialize};

/// Probe flavor of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Http,
    Tcp,
}

impl MonitorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Http => "http",
            MonitorKind::Tcp => "tcp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(MonitorKind::Http),
            "tcp" => Some(MonitorKind::Tcp),
            _ => None,
        }
    }
}

/// Stored monitor status. Unrecognized strings coerce to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Maintenance,
    Paused,
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Maintenance => "maintenance",
            MonitorStatus::Paused => "paused",
            MonitorStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "up" => MonitorStatus::Up,
            "down" => MonitorStatus::Down,
            "maintenance" => MonitorStatus::Maintenance,
            "paused" => MonitorStatus::Paused,
            _ => MonitorStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    pub kind: MonitorKind,
    pub target: String,
    pub interval_sec: i64,
    pub timeout_ms: i64,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_headers: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_forbidden_keyword: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One row per monitor once it has been checked; mutated only by the
/// scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorState {
    pub monitor_id: i64,
    pub status: MonitorStatus,
    pub last_checked_at: Option<i64>,
    pub last_changed_at: Option<i64>,
    pub last_latency_ms: Option<i64>,
    pub last_error: Option<String>,
    pub consecutive_failures: i64,
    pub consecutive_successes: i64,
}

impl MonitorState {
    pub fn initial(monitor_id: i64) -> Self {
        Self {
            monitor_id,
            status: MonitorStatus::Unknown,
            last_checked_at: None,
            last_changed_at: None,
            last_latency_ms: None,
            last_error: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMonitor {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub target: String,
    #[serde(default = "default_interval")]
    pub interval_sec: i64,
    #[serde(default = "default_timeout")]
    pub timeout_ms: i64,
    pub http_method: Option<String>,
    pub http_headers: Option<serde_json::Value>,
    pub http_body: Option<String>,
    pub expected_status: Option<Vec<u16>>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
}

fn default_kind() -> String {
    "http".to_string()
}
fn default_interval() -> i64 {
    60
}
fn default_timeout() -> i64 {
    5000
}

#[derive(Debug, Deserialize)]
pub struct UpdateMonitor {
    pub name: Option<String>,
    pub target: Option<String>,
    pub interval_sec: Option<i64>,
    pub timeout_ms: Option<i64>,
    pub is_active: Option<bool>,
    pub http_method: Option<String>,
    pub http_headers: Option<serde_json::Value>,
    pub http_body: Option<String>,
    pub expected_status: Option<Vec<u16>>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
}
