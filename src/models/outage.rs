use serde::Serialize;

/// What the persistence batch should do to the monitor's outage record
/// after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutageAction {
    Open,
    Close,
    Update,
    None,
}

/// A contiguous down interval. `ended_at` is NULL while ongoing; at most one
/// ongoing outage exists per monitor (enforced by a partial unique index).
#[derive(Debug, Clone, Serialize)]
pub struct Outage {
    pub id: i64,
    pub monitor_id: i64,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Outage {
    pub fn duration_until(&self, now: i64) -> i64 {
        (self.ended_at.unwrap_or(now) - self.started_at).max(0)
    }
}
