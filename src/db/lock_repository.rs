use sqlx::SqlitePool;

pub struct LockRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> LockRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Try to take the named lease until `now + ttl_sec`. The conditional
    /// upsert only succeeds when no live lease exists, which makes the row a
    /// fencing token for overlapping trigger invocations.
    pub async fn try_acquire(&self, name: &str, now: i64, ttl_sec: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO locks (name, expires_at) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET expires_at = excluded.expires_at
            WHERE locks.expires_at <= ?
            "#,
        )
        .bind(name)
        .bind(now + ttl_sec)
        .bind(now)
        .execute(self.pool)
        .await?;

        let acquired = result.rows_affected() > 0;
        if !acquired {
            tracing::debug!("Lease '{}' is held elsewhere", name);
        }
        Ok(acquired)
    }

    /// Drop a lease early so the next invocation does not wait out the TTL.
    pub async fn release(&self, name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM locks WHERE name = ?")
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_live_lease_blocks_acquisition() {
        let pool = test_pool().await;
        let repo = LockRepository::new(&pool);

        assert!(repo.try_acquire("scheduler:tick", 100, 55).await.unwrap());
        assert!(!repo.try_acquire("scheduler:tick", 120, 55).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let pool = test_pool().await;
        let repo = LockRepository::new(&pool);

        assert!(repo.try_acquire("scheduler:tick", 100, 55).await.unwrap());
        assert!(repo.try_acquire("scheduler:tick", 160, 55).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_frees_lease() {
        let pool = test_pool().await;
        let repo = LockRepository::new(&pool);

        assert!(repo.try_acquire("analytics:daily-rollup:0", 100, 600).await.unwrap());
        repo.release("analytics:daily-rollup:0").await.unwrap();
        assert!(repo.try_acquire("analytics:daily-rollup:0", 101, 600).await.unwrap());
    }
}
