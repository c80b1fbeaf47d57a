use crate::models::channel::{DeliveryStatus, NotificationChannel, NotificationDelivery, WebhookConfig};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

pub struct ChannelRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        kind: &str,
        config: &WebhookConfig,
        now: i64,
    ) -> Result<i64, sqlx::Error> {
        tracing::info!("Creating notification channel '{}'", name);

        let config_json = serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string());
        let result = sqlx::query(
            "INSERT INTO notification_channels (name, kind, config_json, is_active, created_at) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(name)
        .bind(kind)
        .bind(config_json)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, channel: &NotificationChannel) -> Result<u64, sqlx::Error> {
        let config_json = serde_json::to_string(&channel.config).unwrap_or_else(|_| "{}".to_string());
        let result = sqlx::query(
            "UPDATE notification_channels SET name = ?, config_json = ?, is_active = ? WHERE id = ?",
        )
        .bind(&channel.name)
        .bind(config_json)
        .bind(channel.is_active)
        .bind(channel.id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notification_channels WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<NotificationChannel>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, name, kind, config_json, is_active, created_at FROM notification_channels WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| map_channel(&r)).transpose()
    }

    pub async fn get_all(&self) -> Result<Vec<NotificationChannel>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, name, kind, config_json, is_active, created_at FROM notification_channels ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_channel).collect()
    }

    pub async fn get_active(&self) -> Result<Vec<NotificationChannel>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, name, kind, config_json, is_active, created_at FROM notification_channels WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_channel).collect()
    }

    /// Claim a delivery slot for `(event_key, channel_id)`. Returns false if
    /// another worker already holds it; the unique index makes the race safe.
    pub async fn claim_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO notification_deliveries (event_key, channel_id, status, created_at) VALUES (?, ?, 'pending', ?)",
        )
        .bind(event_key)
        .bind(channel_id)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn finalize_delivery(
        &self,
        event_key: &str,
        channel_id: i64,
        status: DeliveryStatus,
        http_status: Option<i64>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notification_deliveries SET status = ?, http_status = ?, error = ? WHERE event_key = ? AND channel_id = ?",
        )
        .bind(status.as_str())
        .bind(http_status)
        .bind(error)
        .bind(event_key)
        .bind(channel_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_deliveries_for_event(
        &self,
        event_key: &str,
    ) -> Result<Vec<NotificationDelivery>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, event_key, channel_id, status, http_status, error, created_at
             FROM notification_deliveries WHERE event_key = ? ORDER BY channel_id",
        )
        .bind(event_key)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(map_delivery).collect()
    }
}

fn map_channel(row: &SqliteRow) -> Result<NotificationChannel, sqlx::Error> {
    let config_json: String = row.try_get("config_json")?;
    let config: WebhookConfig = serde_json::from_str(&config_json).map_err(|e| {
        sqlx::Error::Decode(format!("invalid channel config: {e}").into())
    })?;

    Ok(NotificationChannel {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: row.try_get("kind")?,
        config,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_delivery(row: &SqliteRow) -> Result<NotificationDelivery, sqlx::Error> {
    Ok(NotificationDelivery {
        id: row.try_get("id")?,
        event_key: row.try_get("event_key")?,
        channel_id: row.try_get("channel_id")?,
        status: row.try_get("status")?,
        http_status: row.try_get("http_status")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn webhook_config(url: &str) -> WebhookConfig {
        serde_json::from_value(serde_json::json!({ "url": url })).unwrap()
    }

    #[tokio::test]
    async fn test_config_roundtrip_with_defaults() {
        let pool = test_pool().await;
        let repo = ChannelRepository::new(&pool);

        let id = repo
            .create("ops", "webhook", &webhook_config("https://hooks.example.com/x"), 100)
            .await
            .unwrap();

        let channel = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(channel.config.method, "POST");
        assert_eq!(channel.config.timeout_ms, 5000);
        assert_eq!(channel.config.payload_type, "json");
        assert!(channel.config.signing.is_none());
    }

    #[tokio::test]
    async fn test_delivery_claim_is_exclusive() {
        let pool = test_pool().await;
        let repo = ChannelRepository::new(&pool);
        let id = repo
            .create("ops", "webhook", &webhook_config("https://hooks.example.com/x"), 100)
            .await
            .unwrap();

        assert!(repo.claim_delivery("monitor:1:down:60", id, 60).await.unwrap());
        assert!(!repo.claim_delivery("monitor:1:down:60", id, 61).await.unwrap());

        repo.finalize_delivery("monitor:1:down:60", id, DeliveryStatus::Success, Some(200), None)
            .await
            .unwrap();

        let deliveries = repo.get_deliveries_for_event("monitor:1:down:60").await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, "success");
        assert_eq!(deliveries[0].http_status, Some(200));
    }
}
