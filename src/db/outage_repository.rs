use crate::models::outage::Outage;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

pub struct OutageRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> OutageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_ongoing(&self, monitor_id: i64) -> Result<Option<Outage>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, monitor_id, started_at, ended_at, initial_error, last_error
             FROM outages WHERE monitor_id = ? AND ended_at IS NULL",
        )
        .bind(monitor_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_outage(&r)).transpose()
    }

    /// Outages of one monitor overlapping `[from, to)`.
    pub async fn get_overlapping(
        &self,
        monitor_id: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<Outage>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, monitor_id, started_at, ended_at, initial_error, last_error
            FROM outages
            WHERE monitor_id = ? AND started_at < ? AND (ended_at IS NULL OR ended_at > ?)
            ORDER BY started_at ASC
            "#,
        )
        .bind(monitor_id)
        .bind(to)
        .bind(from)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_outage).collect()
    }

    /// Outages of all active monitors overlapping `[from, to)`.
    pub async fn get_overlapping_all(&self, from: i64, to: i64) -> Result<Vec<Outage>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.monitor_id, o.started_at, o.ended_at, o.initial_error, o.last_error
            FROM outages o
            JOIN monitors m ON m.id = o.monitor_id
            WHERE m.is_active = 1 AND o.started_at < ? AND (o.ended_at IS NULL OR o.ended_at > ?)
            ORDER BY o.started_at ASC
            "#,
        )
        .bind(to)
        .bind(from)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_outage).collect()
    }

    /// Keyset page of one monitor's outages in a range, newest first.
    pub async fn get_page(
        &self,
        monitor_id: i64,
        from: i64,
        to: i64,
        cursor: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Outage>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, monitor_id, started_at, ended_at, initial_error, last_error
            FROM outages
            WHERE monitor_id = ? AND started_at < ? AND (ended_at IS NULL OR ended_at > ?)
              AND id < ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(monitor_id)
        .bind(to)
        .bind(from)
        .bind(cursor.unwrap_or(i64::MAX))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_outage).collect()
    }
}

fn map_outage(row: &SqliteRow) -> Result<Outage, sqlx::Error> {
    Ok(Outage {
        id: row.try_get("id")?,
        monitor_id: row.try_get("monitor_id")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        initial_error: row.try_get("initial_error")?,
        last_error: row.try_get("last_error")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn insert_monitor(pool: &SqlitePool, id: i64) {
        sqlx::query(
            "INSERT INTO monitors (id, name, target, created_at, updated_at) VALUES (?, 'm', 't', 0, 0)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_outage(pool: &SqlitePool, monitor_id: i64, started: i64, ended: Option<i64>) {
        insert_monitor(pool, monitor_id).await;
        sqlx::query("INSERT INTO outages (monitor_id, started_at, ended_at) VALUES (?, ?, ?)")
            .bind(monitor_id)
            .bind(started)
            .bind(ended)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overlapping_selection() {
        let pool = test_pool().await;
        let repo = OutageRepository::new(&pool);

        insert_outage(&pool, 1, 0, Some(50)).await; // before range
        insert_outage(&pool, 1, 80, Some(150)).await; // straddles start
        insert_outage(&pool, 1, 200, None).await; // ongoing

        let overlapping = repo.get_overlapping(1, 100, 300).await.unwrap();
        let starts: Vec<i64> = overlapping.iter().map(|o| o.started_at).collect();
        assert_eq!(starts, vec![80, 200]);
    }

    #[tokio::test]
    async fn test_keyset_page_descends_by_id() {
        let pool = test_pool().await;
        let repo = OutageRepository::new(&pool);

        for i in 0..5 {
            insert_outage(&pool, 1, 100 + i * 100, Some(150 + i * 100)).await;
        }

        let first = repo.get_page(1, 0, 10_000, None, 2).await.unwrap();
        let ids: Vec<i64> = first.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![5, 4]);

        let second = repo.get_page(1, 0, 10_000, Some(4), 2).await.unwrap();
        let ids: Vec<i64> = second.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
