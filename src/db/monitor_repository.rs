use crate::models::monitor::{Monitor, MonitorKind, MonitorState, MonitorStatus};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

const MONITOR_COLUMNS: &str = "id, name, kind, target, interval_sec, timeout_ms, is_active, \
     http_method, http_headers_json, http_body, expected_status_json, \
     response_keyword, response_forbidden_keyword, created_at, updated_at";

pub struct MonitorRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> MonitorRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, monitor: &Monitor) -> Result<i64, sqlx::Error> {
        tracing::info!(
            "Creating monitor -> name: '{}', kind: {}, target: '{}'",
            monitor.name,
            monitor.kind.as_str(),
            monitor.target
        );

        let result = sqlx::query(
            r#"
            INSERT INTO monitors
                (name, kind, target, interval_sec, timeout_ms, is_active,
                 http_method, http_headers_json, http_body, expected_status_json,
                 response_keyword, response_forbidden_keyword, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&monitor.name)
        .bind(monitor.kind.as_str())
        .bind(&monitor.target)
        .bind(monitor.interval_sec)
        .bind(monitor.timeout_ms)
        .bind(monitor.is_active)
        .bind(&monitor.http_method)
        .bind(monitor.http_headers.as_ref().map(|h| h.to_string()))
        .bind(&monitor.http_body)
        .bind(encode_expected_status(&monitor.expected_status))
        .bind(&monitor.response_keyword)
        .bind(&monitor.response_forbidden_keyword)
        .bind(monitor.created_at)
        .bind(monitor.updated_at)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, monitor: &Monitor) -> Result<u64, sqlx::Error> {
        tracing::info!("Updating monitor_id: {}", monitor.id);

        let result = sqlx::query(
            r#"
            UPDATE monitors
            SET name = ?, target = ?, interval_sec = ?, timeout_ms = ?, is_active = ?,
                http_method = ?, http_headers_json = ?, http_body = ?,
                expected_status_json = ?, response_keyword = ?,
                response_forbidden_keyword = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&monitor.name)
        .bind(&monitor.target)
        .bind(monitor.interval_sec)
        .bind(monitor.timeout_ms)
        .bind(monitor.is_active)
        .bind(&monitor.http_method)
        .bind(monitor.http_headers.as_ref().map(|h| h.to_string()))
        .bind(&monitor.http_body)
        .bind(encode_expected_status(&monitor.expected_status))
        .bind(&monitor.response_keyword)
        .bind(&monitor.response_forbidden_keyword)
        .bind(monitor.updated_at)
        .bind(monitor.id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_by_id(&self, monitor_id: i64) -> Result<Option<Monitor>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"
        ))
        .bind(monitor_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_monitor(&r)).transpose()
    }

    pub async fn get_all(&self) -> Result<Vec<Monitor>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_monitor).collect()
    }

    pub async fn get_all_active(&self) -> Result<Vec<Monitor>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_monitor).collect()
    }

    /// Active monitors created before `before`, for the rollup pass.
    pub async fn get_created_before(&self, before: i64) -> Result<Vec<Monitor>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors WHERE created_at < ? ORDER BY id"
        ))
        .bind(before)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_monitor).collect()
    }

    /// Monitors due for a check at `checked_at`: active, not paused, and not
    /// checked within their own interval.
    pub async fn get_due(&self, checked_at: i64) -> Result<Vec<Monitor>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MONITOR_COLUMNS} FROM monitors m
            LEFT JOIN monitor_states s ON s.monitor_id = m.id
            WHERE m.is_active = 1
              AND (s.status IS NULL OR s.status != 'paused')
              AND (s.last_checked_at IS NULL OR s.last_checked_at <= ? - m.interval_sec)
            ORDER BY m.id
            "#
        ))
        .bind(checked_at)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_monitor).collect()
    }

    /// Delete a monitor and its scheduler-owned data. Incident and
    /// maintenance links keep their rows so historical entries can still
    /// name the monitor by id.
    pub async fn delete_cascading(&self, monitor_id: i64) -> Result<u64, sqlx::Error> {
        tracing::info!("Deleting monitor_id: {} with history", monitor_id);

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM monitor_states WHERE monitor_id = ?")
            .bind(monitor_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM check_results WHERE monitor_id = ?")
            .bind(monitor_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM outages WHERE monitor_id = ?")
            .bind(monitor_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM monitor_daily_rollups WHERE monitor_id = ?")
            .bind(monitor_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM monitors WHERE id = ?")
            .bind(monitor_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            tracing::warn!("No monitor found to delete with id: {}", monitor_id);
        }
        Ok(result.rows_affected())
    }

    // --- MonitorState (one row per monitor, scheduler-owned) ---

    pub async fn get_state(&self, monitor_id: i64) -> Result<Option<MonitorState>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT monitor_id, status, last_checked_at, last_changed_at,
                   last_latency_ms, last_error, consecutive_failures, consecutive_successes
            FROM monitor_states WHERE monitor_id = ?
            "#,
        )
        .bind(monitor_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_state(&r)).transpose()
    }

    pub async fn get_states(&self) -> Result<Vec<MonitorState>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT monitor_id, status, last_checked_at, last_changed_at,
                   last_latency_ms, last_error, consecutive_failures, consecutive_successes
            FROM monitor_states
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_state).collect()
    }

    /// Force the stored state status, creating the row if the monitor has
    /// never been checked. Used by pause/resume; never touches outages.
    pub async fn set_state_status(
        &self,
        monitor_id: i64,
        status: MonitorStatus,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO monitor_states (monitor_id, status, last_changed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(monitor_id) DO UPDATE SET status = excluded.status, last_changed_at = excluded.last_changed_at
            "#,
        )
        .bind(monitor_id)
        .bind(status.as_str())
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

pub(crate) fn map_monitor(row: &SqliteRow) -> Result<Monitor, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let headers: Option<String> = row.try_get("http_headers_json")?;
    let expected: Option<String> = row.try_get("expected_status_json")?;

    Ok(Monitor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: MonitorKind::parse(&kind).unwrap_or(MonitorKind::Http),
        target: row.try_get("target")?,
        interval_sec: row.try_get("interval_sec")?,
        timeout_ms: row.try_get("timeout_ms")?,
        is_active: row.try_get("is_active")?,
        http_method: row.try_get("http_method")?,
        http_headers: headers.and_then(|h| serde_json::from_str(&h).ok()),
        http_body: row.try_get("http_body")?,
        expected_status: expected.and_then(|e| serde_json::from_str(&e).ok()),
        response_keyword: row.try_get("response_keyword")?,
        response_forbidden_keyword: row.try_get("response_forbidden_keyword")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_state(row: &SqliteRow) -> Result<MonitorState, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(MonitorState {
        monitor_id: row.try_get("monitor_id")?,
        status: MonitorStatus::parse(&status),
        last_checked_at: row.try_get("last_checked_at")?,
        last_changed_at: row.try_get("last_changed_at")?,
        last_latency_ms: row.try_get("last_latency_ms")?,
        last_error: row.try_get("last_error")?,
        consecutive_failures: row.try_get("consecutive_failures")?,
        consecutive_successes: row.try_get("consecutive_successes")?,
    })
}

fn encode_expected_status(expected: &Option<Vec<u16>>) -> Option<String> {
    expected
        .as_ref()
        .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::utils::timeutil::MINUTE;

    fn sample_monitor(name: &str, created_at: i64) -> Monitor {
        Monitor {
            id: 0,
            name: name.to_string(),
            kind: MonitorKind::Http,
            target: "https://example.com/health".to_string(),
            interval_sec: 60,
            timeout_ms: 5000,
            is_active: true,
            http_method: Some("GET".to_string()),
            http_headers: None,
            http_body: None,
            expected_status: Some(vec![200, 204]),
            response_keyword: None,
            response_forbidden_keyword: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_roundtrip() {
        let pool = test_pool().await;
        let repo = MonitorRepository::new(&pool);

        let id = repo.create(&sample_monitor("api", 1000)).await.unwrap();
        let fetched = repo.get_by_id(id).await.unwrap().unwrap();

        assert_eq!(fetched.name, "api");
        assert_eq!(fetched.kind, MonitorKind::Http);
        assert_eq!(fetched.expected_status, Some(vec![200, 204]));
        assert!(fetched.is_active);
    }

    #[tokio::test]
    async fn test_due_selection_respects_interval_and_pause() {
        let pool = test_pool().await;
        let repo = MonitorRepository::new(&pool);

        let fresh = repo.create(&sample_monitor("fresh", 0)).await.unwrap();
        let stale = repo.create(&sample_monitor("stale", 0)).await.unwrap();
        let paused = repo.create(&sample_monitor("paused", 0)).await.unwrap();

        let now = 10 * MINUTE;
        // "fresh" was checked within its interval, "stale" long ago.
        sqlx::query("INSERT INTO monitor_states (monitor_id, status, last_checked_at) VALUES (?, 'up', ?)")
            .bind(fresh)
            .bind(now - 30)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO monitor_states (monitor_id, status, last_checked_at) VALUES (?, 'up', ?)")
            .bind(stale)
            .bind(now - 120)
            .execute(&pool)
            .await
            .unwrap();
        repo.set_state_status(paused, MonitorStatus::Paused, now)
            .await
            .unwrap();

        let due: Vec<i64> = repo.get_due(now).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(due, vec![stale]);
    }

    #[tokio::test]
    async fn test_never_checked_monitor_is_due() {
        let pool = test_pool().await;
        let repo = MonitorRepository::new(&pool);
        let id = repo.create(&sample_monitor("new", 0)).await.unwrap();

        let due = repo.get_due(60).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
    }

    #[tokio::test]
    async fn test_delete_cascades_scheduler_data() {
        let pool = test_pool().await;
        let repo = MonitorRepository::new(&pool);
        let id = repo.create(&sample_monitor("gone", 0)).await.unwrap();

        repo.set_state_status(id, MonitorStatus::Up, 60).await.unwrap();
        sqlx::query("INSERT INTO check_results (monitor_id, checked_at, status) VALUES (?, 60, 'up')")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(repo.delete_cascading(id).await.unwrap(), 1);
        assert!(repo.get_by_id(id).await.unwrap().is_none());
        assert!(repo.get_state(id).await.unwrap().is_none());

        let checks: i64 = sqlx::query("SELECT COUNT(*) AS n FROM check_results WHERE monitor_id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap()
            .try_get("n")
            .unwrap();
        assert_eq!(checks, 0);
    }
}
