mod config;
mod db;
mod handlers;
mod models;
mod routes;
mod services;
mod utils;

use axum::{routing::get, Router};
use config::AppConfig;
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: AppConfig,
}

#[tokio::main]
async fn main() -> Result<(), sqlx::Error> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    let config = AppConfig::load();
    tracing::info!("Environment loaded, using database at {}", config.database_url);

    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    db::MIGRATOR.run(&pool).await?;
    tracing::info!("Migrations applied. DB is ready.");

    let state = AppState {
        db: pool,
        config: config.clone(),
    };

    let app = Router::new()
        .nest("/public", routes::public_routes())
        .nest("/admin", routes::admin_routes())
        .nest("/triggers", routes::trigger_routes())
        .route("/health", get(health_check))
        .with_state(state);

    let addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    tracing::info!("statuswatch is listening on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .map_err(sqlx::Error::Io)?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
