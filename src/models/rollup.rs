use serde::Serialize;

/// Daily summary of one monitor, unique per `(monitor_id, day_start_at)`.
///
/// `latency_histogram` holds one counter per bucket of the frozen boundary
/// set plus a final overflow counter; histograms merge across days by
/// element-wise sum.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorDailyRollup {
    pub monitor_id: i64,
    pub day_start_at: i64,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
    pub checks_total: i64,
    pub checks_up: i64,
    pub checks_down: i64,
    pub checks_unknown: i64,
    pub checks_maintenance: i64,
    pub avg_latency_ms: Option<i64>,
    pub p50_latency_ms: Option<i64>,
    pub p95_latency_ms: Option<i64>,
    pub latency_histogram: Vec<i64>,
}

impl MonitorDailyRollup {
    /// Uptime over the portion of the day the monitor was observable.
    pub fn uptime_pct(&self) -> f64 {
        let known = self.total_sec - self.unknown_sec;
        if known <= 0 {
            return 100.0;
        }
        self.uptime_sec as f64 * 100.0 / known as f64
    }
}
