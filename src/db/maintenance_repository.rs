use crate::models::maintenance::MaintenanceWindow;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashSet;

pub struct MaintenanceRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> MaintenanceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        title: &str,
        message: Option<&str>,
        starts_at: i64,
        ends_at: i64,
        monitor_ids: &[i64],
        now: i64,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO maintenance_windows (title, message, starts_at, ends_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(message)
        .bind(starts_at)
        .bind(ends_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        for monitor_id in monitor_ids {
            sqlx::query("INSERT OR IGNORE INTO maintenance_monitors (window_id, monitor_id) VALUES (?, ?)")
                .bind(id)
                .bind(monitor_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    pub async fn update(&self, window: &MaintenanceWindow) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE maintenance_windows SET title = ?, message = ?, starts_at = ?, ends_at = ? WHERE id = ?",
        )
        .bind(&window.title)
        .bind(&window.message)
        .bind(window.starts_at)
        .bind(window.ends_at)
        .bind(window.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM maintenance_monitors WHERE window_id = ?")
            .bind(window.id)
            .execute(&mut *tx)
            .await?;
        for monitor_id in &window.monitor_ids {
            sqlx::query("INSERT OR IGNORE INTO maintenance_monitors (window_id, monitor_id) VALUES (?, ?)")
                .bind(window.id)
                .bind(monitor_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: i64) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM maintenance_monitors WHERE window_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM maintenance_windows WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<MaintenanceWindow>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, title, message, starts_at, ends_at, created_at FROM maintenance_windows WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.with_links(map_window(&row)?).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_all(&self) -> Result<Vec<MaintenanceWindow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, title, message, starts_at, ends_at, created_at FROM maintenance_windows ORDER BY starts_at DESC",
        )
        .fetch_all(self.pool)
        .await?;

        let mut windows = Vec::with_capacity(rows.len());
        for row in &rows {
            windows.push(self.with_links(map_window(row)?).await?);
        }
        Ok(windows)
    }

    /// Windows active at `now`, soonest-ending first.
    pub async fn get_active(&self, now: i64, limit: i64) -> Result<Vec<MaintenanceWindow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, message, starts_at, ends_at, created_at
            FROM maintenance_windows
            WHERE starts_at <= ? AND ? < ends_at
            ORDER BY ends_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        let mut windows = Vec::with_capacity(rows.len());
        for row in &rows {
            windows.push(self.with_links(map_window(row)?).await?);
        }
        Ok(windows)
    }

    /// Windows starting after `now`, soonest first.
    pub async fn get_upcoming(&self, now: i64, limit: i64) -> Result<Vec<MaintenanceWindow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, message, starts_at, ends_at, created_at
            FROM maintenance_windows
            WHERE starts_at > ?
            ORDER BY starts_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        let mut windows = Vec::with_capacity(rows.len());
        for row in &rows {
            windows.push(self.with_links(map_window(row)?).await?);
        }
        Ok(windows)
    }

    /// Ids of monitors covered by any window active at `now`.
    pub async fn get_active_monitor_ids(&self, now: i64) -> Result<HashSet<i64>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT mm.monitor_id
            FROM maintenance_monitors mm
            JOIN maintenance_windows w ON w.id = mm.window_id
            WHERE w.starts_at <= ? AND ? < w.ends_at
            "#,
        )
        .bind(now)
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(|r| r.try_get("monitor_id")).collect()
    }

    async fn with_links(&self, mut window: MaintenanceWindow) -> Result<MaintenanceWindow, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT monitor_id FROM maintenance_monitors WHERE window_id = ? ORDER BY monitor_id",
        )
        .bind(window.id)
        .fetch_all(self.pool)
        .await?;

        window.monitor_ids = rows
            .iter()
            .map(|r| r.try_get("monitor_id"))
            .collect::<Result<_, _>>()?;
        Ok(window)
    }
}

fn map_window(row: &SqliteRow) -> Result<MaintenanceWindow, sqlx::Error> {
    Ok(MaintenanceWindow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        created_at: row.try_get("created_at")?,
        monitor_ids: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_active_and_upcoming_selection() {
        let pool = test_pool().await;
        let repo = MaintenanceRepository::new(&pool);

        repo.create("db upgrade", None, 100, 200, &[1, 2], 50).await.unwrap();
        repo.create("later", None, 500, 600, &[3], 50).await.unwrap();

        let active = repo.get_active(150, 3).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "db upgrade");
        assert_eq!(active[0].monitor_ids, vec![1, 2]);

        let upcoming = repo.get_upcoming(150, 5).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "later");

        let ids = repo.get_active_monitor_ids(150).await.unwrap();
        assert!(ids.contains(&1) && ids.contains(&2) && !ids.contains(&3));
    }

    #[tokio::test]
    async fn test_window_boundaries_are_half_open() {
        let pool = test_pool().await;
        let repo = MaintenanceRepository::new(&pool);
        repo.create("w", None, 100, 200, &[1], 50).await.unwrap();

        assert_eq!(repo.get_active(100, 3).await.unwrap().len(), 1);
        assert_eq!(repo.get_active(199, 3).await.unwrap().len(), 1);
        assert_eq!(repo.get_active(200, 3).await.unwrap().len(), 0);
        assert_eq!(repo.get_active(99, 3).await.unwrap().len(), 0);
    }
}
