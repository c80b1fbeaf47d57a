pub mod channel_repository;
pub mod check_repository;
pub mod incident_repository;
pub mod lock_repository;
pub mod maintenance_repository;
pub mod monitor_repository;
pub mod outage_repository;
pub mod rollup_repository;
pub mod settings_repository;
pub mod snapshot_repository;

use sqlx::migrate::Migrator;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

// One connection only: each in-memory sqlite connection is its own database.
#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    MIGRATOR.run(&pool).await.expect("migrations");
    pool
}
