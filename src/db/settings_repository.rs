use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

pub struct SettingsRepository<'a> {
    pub pool: &'a SqlitePool,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_all(&self) -> Result<BTreeMap<String, serde_json::Value>, sqlx::Error> {
        let rows = sqlx::query("SELECT key, value_json FROM settings")
            .fetch_all(self.pool)
            .await?;

        let mut settings = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("key")?;
            let raw: String = row.try_get("value_json")?;
            let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);
            settings.insert(key, value);
        }
        Ok(settings)
    }

    pub async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value_json) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json
            "#,
        )
        .bind(key)
        .bind(value.to_string())
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
    async fn test_set_and_get() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(&pool);

        repo.set("page_title", &serde_json::json!("Acme Status")).await.unwrap();
        repo.set("page_title", &serde_json::json!("Acme Status Page")).await.unwrap();

        let settings = repo.get_all().await.unwrap();
        assert_eq!(settings["page_title"], serde_json::json!("Acme Status Page"));
    }
}
