use serde::{Deserialize, Serialize};

/// Status recorded on a check row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    Maintenance,
    Unknown,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
            CheckStatus::Maintenance => "maintenance",
            CheckStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "up" => CheckStatus::Up,
            "down" => CheckStatus::Down,
            "maintenance" => CheckStatus::Maintenance,
            _ => CheckStatus::Unknown,
        }
    }
}

/// Append-only record of one executed probe.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub id: i64,
    pub monitor_id: i64,
    pub checked_at: i64,
    pub status: CheckStatus,
    pub latency_ms: Option<i64>,
    pub http_status: Option<i64>,
    pub error: Option<String>,
    pub attempt: i64,
}

/// What a single probe run produced. Probe failures are data, not errors:
/// network trouble becomes `status=down` with a classified reason, and
/// `unknown` is reserved for configuration problems found at probe time.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub latency_ms: Option<i64>,
    pub http_status: Option<i64>,
    pub error: Option<String>,
    pub attempts: i64,
}

impl CheckOutcome {
    pub fn up(latency_ms: i64, http_status: Option<i64>) -> Self {
        Self {
            status: CheckStatus::Up,
            latency_ms: Some(latency_ms),
            http_status,
            error: None,
            attempts: 1,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Down,
            latency_ms: None,
            http_status: None,
            error: Some(error.into()),
            attempts: 1,
        }
    }

    pub fn unknown(error: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Unknown,
            latency_ms: None,
            http_status: None,
            error: Some(error.into()),
            attempts: 1,
        }
    }
}
