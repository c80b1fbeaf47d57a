//! Daily rollup: reduce a UTC day of checks and outages into one summary
//! row per monitor.

use crate::config::AppConfig;
use crate::db::check_repository::CheckRepository;
use crate::db::lock_repository::LockRepository;
use crate::db::monitor_repository::MonitorRepository;
use crate::db::outage_repository::OutageRepository;
use crate::db::rollup_repository::RollupRepository;
use crate::models::check::{CheckResult, CheckStatus};
use crate::models::monitor::Monitor;
use crate::models::outage::Outage;
use crate::models::rollup::MonitorDailyRollup;
use crate::utils::interval::{self, CoveragePoint, Interval};
use crate::utils::timeutil::{utc_day_start, DAY};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info};

/// Frozen latency bucket boundaries (ms). Histograms from different days
/// merge by element-wise sum, so this set must never change.
pub const LATENCY_BUCKETS_MS: [i64; 10] = [10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10_000];

const FLUSH_BATCH: usize = 50;

#[derive(Debug, Default, Serialize)]
pub struct RollupSummary {
    pub ran: bool,
    pub day_start_at: i64,
    pub monitors: usize,
}

pub struct RollupService {
    pool: SqlitePool,
    config: AppConfig,
}

impl RollupService {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self { pool, config }
    }

    /// Roll up the previous UTC day, under a per-day lease.
    pub async fn run_daily_rollup(&self, now: i64) -> Result<RollupSummary, sqlx::Error> {
        let day_end = utc_day_start(now);
        let day_start = day_end - DAY;

        let lease = format!("analytics:daily-rollup:{day_start}");
        let locks = LockRepository::new(&self.pool);
        if !locks
            .try_acquire(&lease, now, self.config.rollup_lease_sec)
            .await?
        {
            info!("Rollup for day {} skipped, lease is held", day_start);
            return Ok(RollupSummary {
                ran: false,
                day_start_at: day_start,
                ..Default::default()
            });
        }

        let monitors = MonitorRepository::new(&self.pool)
            .get_created_before(day_end)
            .await?;
        info!("Rolling up day {} for {} monitors", day_start, monitors.len());

        let outage_repo = OutageRepository::new(&self.pool);
        let check_repo = CheckRepository::new(&self.pool);
        let rollup_repo = RollupRepository::new(&self.pool);

        let mut pending: Vec<MonitorDailyRollup> = Vec::with_capacity(FLUSH_BATCH);
        let mut written = 0;

        for monitor in &monitors {
            let range_start = day_start.max(monitor.created_at);
            if range_start >= day_end {
                continue;
            }

            let outages = outage_repo
                .get_overlapping(monitor.id, range_start, day_end)
                .await?;
            // Fetch back past the range start so pre-range coverage counts.
            let checks = check_repo
                .get_range(monitor.id, range_start - 2 * monitor.interval_sec, day_end)
                .await?;

            let Some(rollup) = compute_rollup(monitor, day_start, range_start, day_end, &outages, &checks)
            else {
                continue;
            };
            pending.push(rollup);
            written += 1;

            if pending.len() >= FLUSH_BATCH {
                rollup_repo.upsert_batch(&pending).await?;
                pending.clear();
            }
        }
        rollup_repo.upsert_batch(&pending).await?;

        if let Err(e) = locks.release(&lease).await {
            error!("Failed to release rollup lease: {:?}", e);
        }

        Ok(RollupSummary {
            ran: true,
            day_start_at: day_start,
            monitors: written,
        })
    }
}

/// Pure reduction of one monitor-day. `checks` may begin before
/// `range_start`; rows before it only contribute coverage.
pub fn compute_rollup(
    monitor: &Monitor,
    day_start: i64,
    range_start: i64,
    range_end: i64,
    outages: &[Outage],
    checks: &[CheckResult],
) -> Option<MonitorDailyRollup> {
    if range_start >= range_end {
        return None;
    }
    let range = Interval::new(range_start, range_end);
    let total_sec = range_end - range_start;

    let downtime = interval::merge(
        outages
            .iter()
            .filter_map(|o| {
                interval::clip(Interval::new(o.started_at, o.ended_at.unwrap_or(range_end)), range)
            })
            .collect(),
    );
    let downtime_sec = interval::sum(&downtime);

    let coverage: Vec<CoveragePoint> = checks
        .iter()
        .map(|c| CoveragePoint {
            at: c.checked_at,
            is_unknown: c.status == CheckStatus::Unknown,
        })
        .collect();
    let unknown = interval::build_unknown(range_start, range_end, monitor.interval_sec, &coverage);
    let unknown_sec =
        (interval::sum(&unknown) - interval::overlap(&unknown, &downtime)).max(0);

    let unavailable_sec = (downtime_sec + unknown_sec).min(total_sec);
    let uptime_sec = total_sec - unavailable_sec;

    let in_range = checks.iter().filter(|c| c.checked_at >= range_start);
    let (mut up, mut down, mut unk, mut maint) = (0i64, 0i64, 0i64, 0i64);
    let mut latencies: Vec<i64> = Vec::new();
    for check in in_range {
        match check.status {
            CheckStatus::Up => {
                up += 1;
                if let Some(latency) = check.latency_ms {
                    latencies.push(latency);
                }
            }
            CheckStatus::Down => down += 1,
            CheckStatus::Unknown => unk += 1,
            CheckStatus::Maintenance => maint += 1,
        }
    }
    latencies.sort_unstable();

    let avg_latency_ms = if latencies.is_empty() {
        None
    } else {
        Some((latencies.iter().sum::<i64>() as f64 / latencies.len() as f64).round() as i64)
    };

    Some(MonitorDailyRollup {
        monitor_id: monitor.id,
        day_start_at: day_start,
        total_sec,
        downtime_sec,
        unknown_sec,
        uptime_sec,
        checks_total: up + down + unk + maint,
        checks_up: up,
        checks_down: down,
        checks_unknown: unk,
        checks_maintenance: maint,
        avg_latency_ms,
        p50_latency_ms: percentile_nearest_rank(&latencies, 0.50),
        p95_latency_ms: percentile_nearest_rank(&latencies, 0.95),
        latency_histogram: histogram(&latencies),
    })
}

/// Nearest-rank percentile over an ascending-sorted sample.
pub fn percentile_nearest_rank(sorted: &[i64], p: f64) -> Option<i64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p * sorted.len() as f64).ceil().max(1.0) as usize;
    Some(sorted[rank.min(sorted.len()) - 1])
}

/// Bucket counts over the frozen boundary set, with a final overflow bucket.
pub fn histogram(samples: &[i64]) -> Vec<i64> {
    let mut counts = vec![0i64; LATENCY_BUCKETS_MS.len() + 1];
    for &v in samples {
        let idx = LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| v < bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        counts[idx] += 1;
    }
    counts
}

/// Element-wise sum; both sides must use the frozen bucket set.
pub fn merge_histograms(into: &mut Vec<i64>, other: &[i64]) {
    if into.len() < other.len() {
        into.resize(other.len(), 0);
    }
    for (i, &v) in other.iter().enumerate() {
        into[i] += v;
    }
}

/// Approximate percentile from a bucket histogram: nearest-rank over the
/// counts, reporting the bucket's upper boundary.
pub fn histogram_percentile(histogram: &[i64], p: f64) -> Option<i64> {
    let total: i64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }
    let rank = (p * total as f64).ceil().max(1.0) as i64;
    let mut seen = 0;
    for (i, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= rank {
            let bound = *LATENCY_BUCKETS_MS
                .get(i)
                .unwrap_or(LATENCY_BUCKETS_MS.last().expect("bucket set is non-empty"));
            return Some(bound);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::monitor::MonitorKind;

    fn monitor(interval_sec: i64, created_at: i64) -> Monitor {
        Monitor {
            id: 1,
            name: "m".to_string(),
            kind: MonitorKind::Http,
            target: "https://example.com".to_string(),
            interval_sec,
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

    fn check(at: i64, status: CheckStatus, latency: Option<i64>) -> CheckResult {
        CheckResult {
            id: 0,
            monitor_id: 1,
            checked_at: at,
            status,
            latency_ms: latency,
            http_status: None,
            error: None,
            attempt: 1,
        }
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        let sample = [10, 20, 30, 40];
        assert_eq!(percentile_nearest_rank(&sample, 0.50), Some(20));
        assert_eq!(percentile_nearest_rank(&sample, 0.95), Some(40));
        assert_eq!(percentile_nearest_rank(&[], 0.50), None);
        assert_eq!(percentile_nearest_rank(&[7], 0.95), Some(7));
    }

    #[test]
    fn test_histogram_buckets() {
        let counts = histogram(&[5, 10, 24, 100, 20_000]);
        assert_eq!(counts.len(), 11);
        assert_eq!(counts[0], 1); // 5 < 10
        assert_eq!(counts[1], 2); // 10, 24 in [10, 25)
        assert_eq!(counts[4], 1); // 100 in [100, 250)
        assert_eq!(counts[10], 1); // overflow
        assert_eq!(counts.iter().sum::<i64>(), 5);
    }

    #[test]
    fn test_histogram_merge_preserves_percentiles() {
        let day1 = histogram(&[10, 20, 30]);
        let day2 = histogram(&[400, 900]);
        let mut merged = day1.clone();
        merge_histograms(&mut merged, &day2);
        assert_eq!(merged.iter().sum::<i64>(), 5);
        // Rank 3 of 5 lands in the [25, 50) bucket.
        assert_eq!(histogram_percentile(&merged, 0.50), Some(50));
        assert_eq!(histogram_percentile(&merged, 0.95), Some(1000));
        assert_eq!(histogram_percentile(&[0; 11], 0.5), None);
    }

    #[test]
    fn test_rollup_scenario_latency_stats() {
        let m = monitor(60, 0);
        let checks: Vec<CheckResult> = (0..4)
            .map(|i| check(i * 60, CheckStatus::Up, Some((i + 1) * 10)))
            .collect();

        let rollup = compute_rollup(&m, 0, 0, DAY, &[], &checks).unwrap();
        assert_eq!(rollup.avg_latency_ms, Some(25));
        assert_eq!(rollup.p50_latency_ms, Some(20));
        assert_eq!(rollup.p95_latency_ms, Some(40));
        assert_eq!(rollup.checks_total, 4);
        assert_eq!(rollup.checks_up, 4);
    }

    #[test]
    fn test_rollup_counts_identity() {
        let m = monitor(60, 0);
        let checks = vec![
            check(0, CheckStatus::Up, Some(10)),
            check(60, CheckStatus::Down, None),
            check(120, CheckStatus::Unknown, None),
            check(180, CheckStatus::Maintenance, None),
        ];
        let outages = vec![Outage {
            id: 1,
            monitor_id: 1,
            started_at: 60,
            ended_at: Some(120),
            initial_error: None,
            last_error: None,
        }];

        let rollup = compute_rollup(&m, 0, 0, DAY, &outages, &checks).unwrap();
        assert_eq!(
            rollup.checks_up + rollup.checks_down + rollup.checks_unknown + rollup.checks_maintenance,
            rollup.checks_total
        );
        assert!(rollup.uptime_sec + rollup.downtime_sec + rollup.unknown_sec <= rollup.total_sec);
        assert_eq!(rollup.downtime_sec, 60);
    }

    #[test]
    fn test_rollup_unknown_gap() {
        let m = monitor(60, 0);
        let checks = vec![
            check(0, CheckStatus::Up, Some(10)),
            check(240, CheckStatus::Up, Some(10)),
        ];

        let rollup = compute_rollup(&m, 0, 0, DAY, &[], &checks).unwrap();
        // Gap [120, 240) plus the tail after 360.
        assert!(rollup.unknown_sec >= 120);
        assert_eq!(rollup.total_sec, DAY);
    }

    #[test]
    fn test_rollup_overlap_not_double_counted() {
        let m = monitor(60, 0);
        // No checks at all: the whole day is unknown. The outage overlaps it.
        let outages = vec![Outage {
            id: 1,
            monitor_id: 1,
            started_at: 0,
            ended_at: Some(3600),
            initial_error: None,
            last_error: None,
        }];

        let rollup = compute_rollup(&m, 0, 0, DAY, &outages, &[]).unwrap();
        assert_eq!(rollup.downtime_sec, 3600);
        assert_eq!(rollup.unknown_sec, DAY - 3600);
        assert_eq!(rollup.uptime_sec, 0);
    }

    #[test]
    fn test_rollup_clips_to_monitor_creation() {
        let m = monitor(60, DAY - 3600);
        let rollup = compute_rollup(&m, 0, m.created_at, DAY, &[], &[]).unwrap();
        assert_eq!(rollup.total_sec, 3600);
        assert_eq!(rollup.day_start_at, 0);
    }
}
