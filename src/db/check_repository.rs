use crate::models::check::{CheckOutcome, CheckResult, CheckStatus};
use crate::models::monitor::MonitorState;
use crate::models::outage::OutageAction;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

pub struct CheckRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> CheckRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Atomically persist the result of one check: the append-only check
    /// row, the state upsert, and the outage action. The outage open is
    /// guarded so a duplicate batch can never create a second ongoing
    /// outage.
    pub async fn persist_batch(
        &self,
        checked_at: i64,
        outcome: &CheckOutcome,
        next_state: &MonitorState,
        outage_action: OutageAction,
    ) -> Result<(), sqlx::Error> {
        let monitor_id = next_state.monitor_id;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO check_results (monitor_id, checked_at, status, latency_ms, http_status, error, attempt, location)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(monitor_id)
        .bind(checked_at)
        .bind(outcome.status.as_str())
        .bind(outcome.latency_ms)
        .bind(outcome.http_status)
        .bind(&outcome.error)
        .bind(outcome.attempts)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO monitor_states
                (monitor_id, status, last_checked_at, last_changed_at, last_latency_ms,
                 last_error, consecutive_failures, consecutive_successes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(monitor_id) DO UPDATE SET
                status = excluded.status,
                last_checked_at = excluded.last_checked_at,
                last_changed_at = excluded.last_changed_at,
                last_latency_ms = excluded.last_latency_ms,
                last_error = excluded.last_error,
                consecutive_failures = excluded.consecutive_failures,
                consecutive_successes = excluded.consecutive_successes
            "#,
        )
        .bind(monitor_id)
        .bind(next_state.status.as_str())
        .bind(next_state.last_checked_at)
        .bind(next_state.last_changed_at)
        .bind(next_state.last_latency_ms)
        .bind(&next_state.last_error)
        .bind(next_state.consecutive_failures)
        .bind(next_state.consecutive_successes)
        .execute(&mut *tx)
        .await?;

        match outage_action {
            OutageAction::Open => {
                sqlx::query(
                    r#"
                    INSERT INTO outages (monitor_id, started_at, initial_error, last_error)
                    SELECT ?, ?, ?, ?
                    WHERE NOT EXISTS (SELECT 1 FROM outages WHERE monitor_id = ? AND ended_at IS NULL)
                    "#,
                )
                .bind(monitor_id)
                .bind(checked_at)
                .bind(&outcome.error)
                .bind(&outcome.error)
                .bind(monitor_id)
                .execute(&mut *tx)
                .await?;
            }
            OutageAction::Close => {
                sqlx::query(
                    "UPDATE outages SET ended_at = ? WHERE monitor_id = ? AND ended_at IS NULL",
                )
                .bind(checked_at)
                .bind(monitor_id)
                .execute(&mut *tx)
                .await?;
            }
            OutageAction::Update => {
                sqlx::query(
                    "UPDATE outages SET last_error = ? WHERE monitor_id = ? AND ended_at IS NULL",
                )
                .bind(&outcome.error)
                .bind(monitor_id)
                .execute(&mut *tx)
                .await?;
            }
            OutageAction::None => {}
        }

        tx.commit().await
    }

    /// Check rows for one monitor within `[from, to)`, ascending.
    pub async fn get_range(
        &self,
        monitor_id: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<CheckResult>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, monitor_id, checked_at, status, latency_ms, http_status, error, attempt
            FROM check_results
            WHERE monitor_id = ? AND checked_at >= ? AND checked_at < ?
            ORDER BY checked_at ASC
            "#,
        )
        .bind(monitor_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_check).collect()
    }

    /// The latest `per_monitor` checks per monitor since `since`, returned
    /// in chronological order within each monitor.
    pub async fn get_recent_per_monitor(
        &self,
        since: i64,
        per_monitor: i64,
    ) -> Result<Vec<CheckResult>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, monitor_id, checked_at, status, latency_ms, http_status, error, attempt
            FROM (
                SELECT *, ROW_NUMBER() OVER (PARTITION BY monitor_id ORDER BY checked_at DESC) AS rn
                FROM check_results
                WHERE checked_at >= ?
            )
            WHERE rn <= ?
            ORDER BY monitor_id, checked_at ASC
            "#,
        )
        .bind(since)
        .bind(per_monitor)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_check).collect()
    }
}

fn map_check(row: &SqliteRow) -> Result<CheckResult, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(CheckResult {
        id: row.try_get("id")?,
        monitor_id: row.try_get("monitor_id")?,
        checked_at: row.try_get("checked_at")?,
        status: CheckStatus::parse(&status),
        latency_ms: row.try_get("latency_ms")?,
        http_status: row.try_get("http_status")?,
        error: row.try_get("error")?,
        attempt: row.try_get("attempt")?,
    })
}
