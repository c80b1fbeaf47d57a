//! Cached public snapshot plumbing.
//!
//! Reads are served from one `public_snapshots` row under a freshness bound;
//! misses fall back to a live build whose result is written back in the
//! background. A slightly stale snapshot always beats a 5xx.

use crate::config::AppConfig;
use crate::db::snapshot_repository::SnapshotRepository;
use crate::services::status_builder::{self, PublicStatusResponse};
use sqlx::SqlitePool;
use tracing::{error, info};

pub const SNAPSHOT_KEY: &str = "status";

/// A snapshot body ready to serve, with its age in seconds.
pub struct ServedSnapshot {
    pub body_json: String,
    pub age: i64,
}

/// Read the cached snapshot if it is fresh enough.
pub async fn read(
    pool: &SqlitePool,
    config: &AppConfig,
    now: i64,
) -> Result<Option<ServedSnapshot>, sqlx::Error> {
    let Some(row) = SnapshotRepository::new(pool).get(SNAPSHOT_KEY).await? else {
        return Ok(None);
    };

    let age = (now - row.generated_at).max(0);
    if age > config.snapshot_max_age_sec {
        return Ok(None);
    }

    Ok(Some(ServedSnapshot {
        body_json: row.body_json,
        age,
    }))
}

pub async fn write(
    pool: &SqlitePool,
    payload: &PublicStatusResponse,
    now: i64,
) -> Result<(), sqlx::Error> {
    let body_json = serde_json::to_string(payload)
        .map_err(|e| sqlx::Error::Decode(format!("snapshot serialize: {e}").into()))?;
    SnapshotRepository::new(pool)
        .upsert(SNAPSHOT_KEY, payload.generated_at, &body_json, now)
        .await
}

/// Serve the snapshot: cached when fresh, live-built on a miss (with the
/// write deferred to the background), and refreshed in the background once
/// it is old enough.
pub async fn serve(
    pool: &SqlitePool,
    config: &AppConfig,
    now: i64,
) -> Result<ServedSnapshot, sqlx::Error> {
    match read(pool, config, now).await {
        Ok(Some(snapshot)) => {
            if snapshot.age >= config.snapshot_refresh_age_sec {
                spawn_refresh(pool.clone(), config.clone());
            }
            return Ok(snapshot);
        }
        Ok(None) => {}
        Err(e) => {
            // Degrade to a live build rather than failing the request.
            error!("Snapshot read failed, building live: {:?}", e);
        }
    }

    let payload = status_builder::build_public_status(pool, now).await?;
    let body_json = serde_json::to_string(&payload)
        .map_err(|e| sqlx::Error::Decode(format!("snapshot serialize: {e}").into()))?;

    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = write(&pool, &payload, now).await {
            error!("Background snapshot write failed: {:?}", e);
        }
    });

    Ok(ServedSnapshot { body_json, age: 0 })
}

/// Rebuild and store the snapshot, swallowing every failure. The scheduler
/// calls this after each tick.
pub async fn refresh_best_effort(pool: &SqlitePool, _config: &AppConfig, now: i64) {
    match status_builder::build_public_status(pool, now).await {
        Ok(payload) => {
            if let Err(e) = write(pool, &payload, now).await {
                error!("Snapshot write failed: {:?}", e);
            } else {
                info!("Snapshot refreshed at {}", now);
            }
        }
        Err(e) => error!("Snapshot rebuild failed: {:?}", e),
    }
}

fn spawn_refresh(pool: SqlitePool, config: AppConfig) {
    tokio::spawn(async move {
        let now = crate::utils::timeutil::now_unix();
        refresh_best_effort(&pool, &config, now).await;
    });
}

/// Derive the Cache-Control header for a snapshot of the given age.
pub fn cache_control(age: i64, max_age_bound: i64) -> String {
    let max_age = (max_age_bound - age).clamp(0, 30);
    let remainder = (max_age_bound - age - max_age).max(0);
    format!(
        "public, max-age={max_age}, stale-while-revalidate={remainder}, stale-if-error={remainder}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn test_cache_control_fresh() {
        assert_eq!(
            cache_control(5, 60),
            "public, max-age=30, stale-while-revalidate=25, stale-if-error=25"
        );
    }

    #[test]
    fn test_cache_control_near_expiry() {
        assert_eq!(
            cache_control(50, 60),
            "public, max-age=10, stale-while-revalidate=0, stale-if-error=0"
        );
        assert_eq!(
            cache_control(60, 60),
            "public, max-age=0, stale-while-revalidate=0, stale-if-error=0"
        );
    }

    #[tokio::test]
    async fn test_read_respects_max_age() {
        let pool = test_pool().await;
        let config = AppConfig::default();

        let payload = status_builder::build_public_status(&pool, 1000).await.unwrap();
        write(&pool, &payload, 1000).await.unwrap();

        assert!(read(&pool, &config, 1030).await.unwrap().is_some());
        assert!(read(&pool, &config, 1061).await.unwrap().is_none());

        let served = read(&pool, &config, 1030).await.unwrap().unwrap();
        assert_eq!(served.age, 30);
    }

    #[tokio::test]
    async fn test_serve_miss_builds_live() {
        let pool = test_pool().await;
        let config = AppConfig::default();

        let served = serve(&pool, &config, 500).await.unwrap();
        assert_eq!(served.age, 0);

        let parsed: serde_json::Value = serde_json::from_str(&served.body_json).unwrap();
        assert_eq!(parsed["generated_at"], 500);
        assert_eq!(parsed["banner"]["status"], "operational");
    }
}
