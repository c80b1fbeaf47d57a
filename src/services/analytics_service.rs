//! Overview and per-monitor analytics.
//!
//! The 24h window is computed live from check and outage rows with the same
//! interval algebra the rollup uses; longer windows read daily rollups only,
//! treating missing day rows as fully unknown so charts stay continuous.

use crate::db::check_repository::CheckRepository;
use crate::db::monitor_repository::MonitorRepository;
use crate::db::outage_repository::OutageRepository;
use crate::db::rollup_repository::RollupRepository;
use crate::models::check::CheckResult;
use crate::models::monitor::Monitor;
use crate::models::outage::Outage;
use crate::models::rollup::MonitorDailyRollup;
use crate::services::rollup_service::{compute_rollup, histogram_percentile, merge_histograms};
use crate::utils::interval::{self, Interval};
use crate::utils::timeutil::{floor_to_minute, utc_day_start, Range, DAY};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct OverviewReport {
    pub range: &'static str,
    pub range_start_at: i64,
    pub range_end_at: i64,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub uptime_sec: i64,
    pub uptime_pct: f64,
    pub monitors: OverviewMonitors,
    pub alerts: OverviewAlerts,
    pub outages: OverviewOutages,
}

#[derive(Debug, Serialize)]
pub struct OverviewMonitors {
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct OverviewAlerts {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct OverviewOutages {
    pub longest_sec: i64,
    pub mttr_sec: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LatencyPoint {
    pub checked_at: i64,
    pub status: &'static str,
    pub latency_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DaySummary {
    pub day_start_at: i64,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
    pub uptime_pct: f64,
    pub checks_total: i64,
    pub avg_latency_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MonitorAnalytics {
    pub monitor_id: i64,
    pub range: &'static str,
    pub range_start_at: i64,
    pub range_end_at: i64,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
    pub uptime_pct: f64,
    pub avg_latency_ms: Option<i64>,
    pub p50_latency_ms: Option<i64>,
    pub p95_latency_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<LatencyPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<DaySummary>>,
}

#[derive(Debug, Serialize)]
pub struct UptimeOverview {
    pub range: &'static str,
    pub range_start_at: i64,
    pub range_end_at: i64,
    pub overall: UptimeTotals,
    pub monitors: Vec<MonitorUptime>,
}

#[derive(Debug, Default, Serialize)]
pub struct UptimeTotals {
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
    pub uptime_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct MonitorUptime {
    pub monitor_id: i64,
    pub name: String,
    #[serde(flatten)]
    pub totals: UptimeTotals,
}

/// The `[range_start, range_end)` window for a range anchored at `now`:
/// live ranges end at the current minute, day-aligned ranges at UTC
/// midnight.
pub fn range_bounds(range: Range, now: i64) -> (i64, i64) {
    let range_end = if range.is_live() {
        floor_to_minute(now)
    } else {
        utc_day_start(now)
    };
    (range_end - range.seconds(), range_end)
}

pub async fn overview(
    pool: &SqlitePool,
    range: Range,
    now: i64,
) -> Result<OverviewReport, sqlx::Error> {
    let (range_start, range_end) = range_bounds(range, now);

    let monitors = MonitorRepository::new(pool).get_all_active().await?;
    let outages = OutageRepository::new(pool)
        .get_overlapping_all(range_start, range_end)
        .await?;

    let mut by_monitor: HashMap<i64, Vec<&Outage>> = HashMap::new();
    for outage in &outages {
        by_monitor.entry(outage.monitor_id).or_default().push(outage);
    }

    let mut total_sec = 0;
    let mut downtime_sec = 0;
    for monitor in &monitors {
        let start = range_start.max(monitor.created_at);
        if start >= range_end {
            continue;
        }
        total_sec += range_end - start;

        let range_iv = Interval::new(start, range_end);
        let clipped: Vec<Interval> = by_monitor
            .get(&monitor.id)
            .map(|outages| {
                outages
                    .iter()
                    .filter_map(|o| {
                        interval::clip(
                            Interval::new(o.started_at, o.ended_at.unwrap_or(range_end)),
                            range_iv,
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        downtime_sec += interval::sum(&interval::merge(clipped));
    }

    let uptime_sec = total_sec - downtime_sec;
    let uptime_pct = if total_sec > 0 {
        uptime_sec as f64 * 100.0 / total_sec as f64
    } else {
        100.0
    };

    let alert_count = outages
        .iter()
        .filter(|o| o.started_at >= range_start && o.started_at < range_end)
        .count();

    let longest_sec = outages
        .iter()
        .map(|o| o.duration_until(range_end))
        .max()
        .unwrap_or(0);

    let resolved: Vec<i64> = outages
        .iter()
        .filter_map(|o| o.ended_at.map(|ended| (ended, ended - o.started_at)))
        .filter(|(ended, _)| *ended >= range_start && *ended < range_end)
        .map(|(_, duration)| duration)
        .collect();
    let mttr_sec = if resolved.is_empty() {
        None
    } else {
        Some(resolved.iter().sum::<i64>() / resolved.len() as i64)
    };

    Ok(OverviewReport {
        range: range.as_str(),
        range_start_at: range_start,
        range_end_at: range_end,
        total_sec,
        downtime_sec,
        uptime_sec,
        uptime_pct,
        monitors: OverviewMonitors {
            total: monitors.len(),
        },
        alerts: OverviewAlerts { count: alert_count },
        outages: OverviewOutages {
            longest_sec,
            mttr_sec,
        },
    })
}

pub async fn monitor_analytics(
    pool: &SqlitePool,
    monitor: &Monitor,
    range: Range,
    now: i64,
) -> Result<MonitorAnalytics, sqlx::Error> {
    match range {
        Range::Day => monitor_analytics_live(pool, monitor, now).await,
        _ => monitor_analytics_rollup(pool, monitor, range, now).await,
    }
}

/// Live 24h analytics straight from check and outage rows.
async fn monitor_analytics_live(
    pool: &SqlitePool,
    monitor: &Monitor,
    now: i64,
) -> Result<MonitorAnalytics, sqlx::Error> {
    let (range_start, range_end) = range_bounds(Range::Day, now);
    let start = range_start.max(monitor.created_at);

    let outages = OutageRepository::new(pool)
        .get_overlapping(monitor.id, start, range_end)
        .await?;
    let checks = CheckRepository::new(pool)
        .get_range(monitor.id, start - 2 * monitor.interval_sec, range_end)
        .await?;

    let reduced = compute_rollup(monitor, start, start, range_end, &outages, &checks);

    let points = checks
        .iter()
        .filter(|c| c.checked_at >= start)
        .map(point_from_check)
        .collect();

    let mut analytics = MonitorAnalytics {
        monitor_id: monitor.id,
        range: Range::Day.as_str(),
        range_start_at: start,
        range_end_at: range_end,
        total_sec: 0,
        downtime_sec: 0,
        unknown_sec: 0,
        uptime_sec: 0,
        uptime_pct: 100.0,
        avg_latency_ms: None,
        p50_latency_ms: None,
        p95_latency_ms: None,
        points: Some(points),
        days: None,
    };

    if let Some(r) = reduced {
        analytics.total_sec = r.total_sec;
        analytics.downtime_sec = r.downtime_sec;
        analytics.unknown_sec = r.unknown_sec;
        analytics.uptime_sec = r.uptime_sec;
        analytics.uptime_pct = r.uptime_pct();
        analytics.avg_latency_ms = r.avg_latency_ms;
        analytics.p50_latency_ms = r.p50_latency_ms;
        analytics.p95_latency_ms = r.p95_latency_ms;
    }

    Ok(analytics)
}

/// Multi-day analytics from rollup rows, with missing days synthesized as
/// fully unknown.
async fn monitor_analytics_rollup(
    pool: &SqlitePool,
    monitor: &Monitor,
    range: Range,
    now: i64,
) -> Result<MonitorAnalytics, sqlx::Error> {
    let (range_start, range_end) = range_bounds(range, now);

    let rollups = RollupRepository::new(pool)
        .get_range(monitor.id, range_start, range_end)
        .await?;
    let by_day: HashMap<i64, &MonitorDailyRollup> =
        rollups.iter().map(|r| (r.day_start_at, r)).collect();

    let mut days = Vec::new();
    let mut totals = UptimeTotals::default();
    let mut histogram: Vec<i64> = Vec::new();
    let mut weighted_latency = 0i64;
    let mut latency_weight = 0i64;

    let mut day_start = range_start;
    while day_start < range_end {
        let day_end = day_start + DAY;
        if day_end > monitor.created_at {
            let summary = match by_day.get(&day_start) {
                Some(rollup) => {
                    totals.downtime_sec += rollup.downtime_sec;
                    totals.unknown_sec += rollup.unknown_sec;
                    totals.uptime_sec += rollup.uptime_sec;
                    totals.total_sec += rollup.total_sec;
                    merge_histograms(&mut histogram, &rollup.latency_histogram);
                    if let Some(avg) = rollup.avg_latency_ms {
                        weighted_latency += avg * rollup.checks_up;
                        latency_weight += rollup.checks_up;
                    }
                    day_summary(rollup)
                }
                None => {
                    let total = day_end - day_start.max(monitor.created_at);
                    totals.unknown_sec += total;
                    totals.total_sec += total;
                    DaySummary {
                        day_start_at: day_start,
                        total_sec: total,
                        downtime_sec: 0,
                        unknown_sec: total,
                        uptime_sec: 0,
                        uptime_pct: 100.0,
                        checks_total: 0,
                        avg_latency_ms: None,
                    }
                }
            };
            days.push(summary);
        }
        day_start = day_end;
    }

    totals.uptime_pct = uptime_pct(&totals);

    let avg_latency_ms = if latency_weight > 0 {
        Some(weighted_latency / latency_weight)
    } else {
        None
    };

    Ok(MonitorAnalytics {
        monitor_id: monitor.id,
        range: range.as_str(),
        range_start_at: range_start,
        range_end_at: range_end,
        total_sec: totals.total_sec,
        downtime_sec: totals.downtime_sec,
        unknown_sec: totals.unknown_sec,
        uptime_sec: totals.uptime_sec,
        uptime_pct: totals.uptime_pct,
        avg_latency_ms,
        p50_latency_ms: histogram_percentile(&histogram, 0.50),
        p95_latency_ms: histogram_percentile(&histogram, 0.95),
        points: None,
        days: Some(days),
    })
}

/// Overall and per-monitor uptime from rollups, for the long-range public
/// analytics endpoint.
pub async fn uptime_overview(
    pool: &SqlitePool,
    range: Range,
    now: i64,
) -> Result<UptimeOverview, sqlx::Error> {
    let (range_start, range_end) = range_bounds(range, now);

    let monitors = MonitorRepository::new(pool).get_all_active().await?;
    let rollups = RollupRepository::new(pool)
        .get_range_all(range_start, range_end)
        .await?;

    let mut by_monitor: HashMap<i64, HashMap<i64, &MonitorDailyRollup>> = HashMap::new();
    for rollup in &rollups {
        by_monitor
            .entry(rollup.monitor_id)
            .or_default()
            .insert(rollup.day_start_at, rollup);
    }

    let mut overall = UptimeTotals::default();
    let mut per_monitor = Vec::with_capacity(monitors.len());

    for monitor in &monitors {
        let rows = by_monitor.remove(&monitor.id).unwrap_or_default();
        let mut totals = UptimeTotals::default();

        let mut day_start = range_start;
        while day_start < range_end {
            let day_end = day_start + DAY;
            if day_end > monitor.created_at {
                match rows.get(&day_start) {
                    Some(rollup) => {
                        totals.total_sec += rollup.total_sec;
                        totals.downtime_sec += rollup.downtime_sec;
                        totals.unknown_sec += rollup.unknown_sec;
                        totals.uptime_sec += rollup.uptime_sec;
                    }
                    None => {
                        let total = day_end - day_start.max(monitor.created_at);
                        totals.total_sec += total;
                        totals.unknown_sec += total;
                    }
                }
            }
            day_start = day_end;
        }

        totals.uptime_pct = uptime_pct(&totals);
        overall.total_sec += totals.total_sec;
        overall.downtime_sec += totals.downtime_sec;
        overall.unknown_sec += totals.unknown_sec;
        overall.uptime_sec += totals.uptime_sec;

        per_monitor.push(MonitorUptime {
            monitor_id: monitor.id,
            name: monitor.name.clone(),
            totals,
        });
    }
    overall.uptime_pct = uptime_pct(&overall);

    Ok(UptimeOverview {
        range: range.as_str(),
        range_start_at: range_start,
        range_end_at: range_end,
        overall,
        monitors: per_monitor,
    })
}

fn uptime_pct(totals: &UptimeTotals) -> f64 {
    let known = totals.total_sec - totals.unknown_sec;
    if known <= 0 {
        100.0
    } else {
        totals.uptime_sec as f64 * 100.0 / known as f64
    }
}

fn day_summary(rollup: &MonitorDailyRollup) -> DaySummary {
    DaySummary {
        day_start_at: rollup.day_start_at,
        total_sec: rollup.total_sec,
        downtime_sec: rollup.downtime_sec,
        unknown_sec: rollup.unknown_sec,
        uptime_sec: rollup.uptime_sec,
        uptime_pct: rollup.uptime_pct(),
        checks_total: rollup.checks_total,
        avg_latency_ms: rollup.avg_latency_ms,
    }
}

fn point_from_check(check: &CheckResult) -> LatencyPoint {
    LatencyPoint {
        checked_at: check.checked_at,
        status: check.status.as_str(),
        latency_ms: check.latency_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::monitor::MonitorKind;

    fn monitor(id: i64, created_at: i64) -> Monitor {
        Monitor {
            id,
            name: format!("m{id}"),
            kind: MonitorKind::Http,
            target: "https://example.com".to_string(),
            interval_sec: 60,
            timeout_ms: 5000,
            is_active: true,
            http_method: None,
            http_headers: None,
            http_body: None,
            expected_status: None,
            response_keyword: None,
            response_forbidden_keyword: None,
            created_at,
            updated_at: created_at,
        }
    }

    async fn seed_monitor(pool: &SqlitePool, created_at: i64) -> i64 {
        MonitorRepository::new(pool)
            .create(&monitor(0, created_at))
            .await
            .unwrap()
    }

    #[test]
    fn test_range_bounds_alignment() {
        let now = 10 * DAY + 3723; // mid-day, off-minute
        let (start, end) = range_bounds(Range::Day, now);
        assert_eq!(end, 10 * DAY + 3720);
        assert_eq!(end - start, DAY);

        let (start, end) = range_bounds(Range::Week, now);
        assert_eq!(end, 10 * DAY);
        assert_eq!(start, 3 * DAY);
    }

    #[tokio::test]
    async fn test_overview_counts_downtime_and_alerts() {
        let pool = test_pool().await;
        let now = 30 * DAY;
        let id = seed_monitor(&pool, 0).await;

        // One resolved outage inside the 24h window.
        sqlx::query("INSERT INTO outages (monitor_id, started_at, ended_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(now - 7200)
            .bind(now - 3600)
            .execute(&pool)
            .await
            .unwrap();

        let report = overview(&pool, Range::Day, now).await.unwrap();
        assert_eq!(report.total_sec, DAY);
        assert_eq!(report.downtime_sec, 3600);
        assert_eq!(report.alerts.count, 1);
        assert_eq!(report.outages.longest_sec, 3600);
        assert_eq!(report.outages.mttr_sec, Some(3600));
        assert!((report.uptime_pct - (DAY - 3600) as f64 * 100.0 / DAY as f64).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rollup_analytics_fills_missing_days_as_unknown() {
        let pool = test_pool().await;
        let now = 10 * DAY + 100;
        let id = seed_monitor(&pool, 0).await;
        let m = Monitor { id, ..monitor(id, 0) };

        // Only one rollup row exists in the 7d window.
        let row = crate::models::rollup::MonitorDailyRollup {
            monitor_id: id,
            day_start_at: 5 * DAY,
            total_sec: DAY,
            downtime_sec: 0,
            unknown_sec: 0,
            uptime_sec: DAY,
            checks_total: 1440,
            checks_up: 1440,
            checks_down: 0,
            checks_unknown: 0,
            checks_maintenance: 0,
            avg_latency_ms: Some(20),
            p50_latency_ms: Some(20),
            p95_latency_ms: Some(30),
            latency_histogram: crate::services::rollup_service::histogram(&[20; 10]),
        };
        RollupRepository::new(&pool).upsert_batch(&[row]).await.unwrap();

        let analytics = monitor_analytics(&pool, &m, Range::Week, now).await.unwrap();
        let days = analytics.days.unwrap();
        assert_eq!(days.len(), 7);
        assert_eq!(analytics.total_sec, 7 * DAY);
        assert_eq!(analytics.unknown_sec, 6 * DAY);
        assert_eq!(analytics.uptime_sec, DAY);
        assert_eq!(analytics.avg_latency_ms, Some(20));
        // All known time was up.
        assert!((analytics.uptime_pct - 100.0).abs() < 1e-9);

        let filled = days.iter().filter(|d| d.checks_total == 0).count();
        assert_eq!(filled, 6);
    }

    #[tokio::test]
    async fn test_live_24h_analytics_points() {
        let pool = test_pool().await;
        let now = 2 * DAY;
        let id = seed_monitor(&pool, 0).await;
        let m = Monitor { id, ..monitor(id, 0) };

        for i in 0..4i64 {
            sqlx::query(
                "INSERT INTO check_results (monitor_id, checked_at, status, latency_ms) VALUES (?, ?, 'up', ?)",
            )
            .bind(id)
            .bind(now - 3600 + i * 60)
            .bind((i + 1) * 10)
            .execute(&pool)
            .await
            .unwrap();
        }

        let analytics = monitor_analytics(&pool, &m, Range::Day, now).await.unwrap();
        let points = analytics.points.unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(analytics.avg_latency_ms, Some(25));
        assert_eq!(analytics.p95_latency_ms, Some(40));
    }
}
