use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// A cached public payload row.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub key: String,
    pub generated_at: i64,
    pub body_json: String,
    pub updated_at: i64,
}

pub struct SnapshotRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> SnapshotRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<SnapshotRow>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT key, generated_at, body_json, updated_at FROM public_snapshots WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_snapshot(&r)).transpose()
    }

    /// Last write wins; racing refreshers are acceptable for this row.
    pub async fn upsert(
        &self,
        key: &str,
        generated_at: i64,
        body_json: &str,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO public_snapshots (key, generated_at, body_json, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                generated_at = excluded.generated_at,
                body_json = excluded.body_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(generated_at)
        .bind(body_json)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

fn map_snapshot(row: &SqliteRow) -> Result<SnapshotRow, sqlx::Error> {
    Ok(SnapshotRow {
        key: row.try_get("key")?,
        generated_at: row.try_get("generated_at")?,
        body_json: row.try_get("body_json")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let pool = test_pool().await;
        let repo = SnapshotRepository::new(&pool);

        repo.upsert("status", 100, "{\"a\":1}", 100).await.unwrap();
        repo.upsert("status", 160, "{\"a\":2}", 161).await.unwrap();

        let row = repo.get("status").await.unwrap().unwrap();
        assert_eq!(row.generated_at, 160);
        assert_eq!(row.body_json, "{\"a\":2}");
        assert_eq!(row.updated_at, 161);
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let pool = test_pool().await;
        let repo = SnapshotRepository::new(&pool);
        assert!(repo.get("status").await.unwrap().is_none());
    }
}
