use crate::models::rollup::MonitorDailyRollup;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

pub struct RollupRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> RollupRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a batch of daily rows in one transaction. Re-running a day
    /// with identical inputs leaves every field unchanged.
    pub async fn upsert_batch(&self, rollups: &[MonitorDailyRollup]) -> Result<(), sqlx::Error> {
        if rollups.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for rollup in rollups {
            let histogram = serde_json::to_string(&rollup.latency_histogram)
                .unwrap_or_else(|_| "[]".to_string());

            sqlx::query(
                r#"
                INSERT INTO monitor_daily_rollups
                    (monitor_id, day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec,
                     checks_total, checks_up, checks_down, checks_unknown, checks_maintenance,
                     avg_latency_ms, p50_latency_ms, p95_latency_ms, latency_histogram_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(monitor_id, day_start_at) DO UPDATE SET
                    total_sec = excluded.total_sec,
                    downtime_sec = excluded.downtime_sec,
                    unknown_sec = excluded.unknown_sec,
                    uptime_sec = excluded.uptime_sec,
                    checks_total = excluded.checks_total,
                    checks_up = excluded.checks_up,
                    checks_down = excluded.checks_down,
                    checks_unknown = excluded.checks_unknown,
                    checks_maintenance = excluded.checks_maintenance,
                    avg_latency_ms = excluded.avg_latency_ms,
                    p50_latency_ms = excluded.p50_latency_ms,
                    p95_latency_ms = excluded.p95_latency_ms,
                    latency_histogram_json = excluded.latency_histogram_json
                "#,
            )
            .bind(rollup.monitor_id)
            .bind(rollup.day_start_at)
            .bind(rollup.total_sec)
            .bind(rollup.downtime_sec)
            .bind(rollup.unknown_sec)
            .bind(rollup.uptime_sec)
            .bind(rollup.checks_total)
            .bind(rollup.checks_up)
            .bind(rollup.checks_down)
            .bind(rollup.checks_unknown)
            .bind(rollup.checks_maintenance)
            .bind(rollup.avg_latency_ms)
            .bind(rollup.p50_latency_ms)
            .bind(rollup.p95_latency_ms)
            .bind(histogram)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    /// Rollup rows for one monitor across `[from_day, to_day)`, ascending.
    pub async fn get_range(
        &self,
        monitor_id: i64,
        from_day: i64,
        to_day: i64,
    ) -> Result<Vec<MonitorDailyRollup>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT monitor_id, day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec,
                   checks_total, checks_up, checks_down, checks_unknown, checks_maintenance,
                   avg_latency_ms, p50_latency_ms, p95_latency_ms, latency_histogram_json
            FROM monitor_daily_rollups
            WHERE monitor_id = ? AND day_start_at >= ? AND day_start_at < ?
            ORDER BY day_start_at ASC
            "#,
        )
        .bind(monitor_id)
        .bind(from_day)
        .bind(to_day)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_rollup).collect()
    }

    /// Rollup rows for all monitors across `[from_day, to_day)`.
    pub async fn get_range_all(
        &self,
        from_day: i64,
        to_day: i64,
    ) -> Result<Vec<MonitorDailyRollup>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT monitor_id, day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec,
                   checks_total, checks_up, checks_down, checks_unknown, checks_maintenance,
                   avg_latency_ms, p50_latency_ms, p95_latency_ms, latency_histogram_json
            FROM monitor_daily_rollups
            WHERE day_start_at >= ? AND day_start_at < ?
            ORDER BY monitor_id, day_start_at ASC
            "#,
        )
        .bind(from_day)
        .bind(to_day)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_rollup).collect()
    }

    pub async fn get_day(
        &self,
        monitor_id: i64,
        day_start_at: i64,
    ) -> Result<Option<MonitorDailyRollup>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT monitor_id, day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec,
                   checks_total, checks_up, checks_down, checks_unknown, checks_maintenance,
                   avg_latency_ms, p50_latency_ms, p95_latency_ms, latency_histogram_json
            FROM monitor_daily_rollups
            WHERE monitor_id = ? AND day_start_at = ?
            "#,
        )
        .bind(monitor_id)
        .bind(day_start_at)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_rollup(&r)).transpose()
    }
}

fn map_rollup(row: &SqliteRow) -> Result<MonitorDailyRollup, sqlx::Error> {
    let histogram_json: String = row.try_get("latency_histogram_json")?;
    let latency_histogram: Vec<i64> = serde_json::from_str(&histogram_json)
        .map_err(|e| sqlx::Error::Decode(format!("invalid latency histogram: {e}").into()))?;

    Ok(MonitorDailyRollup {
        monitor_id: row.try_get("monitor_id")?,
        day_start_at: row.try_get("day_start_at")?,
        total_sec: row.try_get("total_sec")?,
        downtime_sec: row.try_get("downtime_sec")?,
        unknown_sec: row.try_get("unknown_sec")?,
        uptime_sec: row.try_get("uptime_sec")?,
        checks_total: row.try_get("checks_total")?,
        checks_up: row.try_get("checks_up")?,
        checks_down: row.try_get("checks_down")?,
        checks_unknown: row.try_get("checks_unknown")?,
        checks_maintenance: row.try_get("checks_maintenance")?,
        avg_latency_ms: row.try_get("avg_latency_ms")?,
        p50_latency_ms: row.try_get("p50_latency_ms")?,
        p95_latency_ms: row.try_get("p95_latency_ms")?,
        latency_histogram,
    })
}
