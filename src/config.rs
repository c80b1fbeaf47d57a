//! Configuration loaded from environment variables with sensible defaults.

use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bearer secret required by all `/admin` and `/triggers` routes.
    pub admin_token: String,
    /// HTTP bind port (default: 3000).
    pub http_port: u16,
    /// sqlx connection string (default: "sqlite:statuswatch.db").
    pub database_url: String,
    /// Max in-flight probes per scheduler tick (default: 5).
    pub probe_concurrency: usize,
    /// Scheduler tick lease, must stay under the tick cadence (default: 55).
    pub scheduler_lease_sec: i64,
    /// Daily rollup lease (default: 600).
    pub rollup_lease_sec: i64,
    /// Snapshot freshness bound (default: 60).
    pub snapshot_max_age_sec: i64,
    /// Snapshot age at which a background refresh is kicked off (default: 30).
    pub snapshot_refresh_age_sec: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            admin_token: String::new(),
            http_port: 3000,
            database_url: "sqlite:statuswatch.db".to_string(),
            probe_concurrency: 5,
            scheduler_lease_sec: 55,
            rollup_lease_sec: 600,
            snapshot_max_age_sec: 60,
            snapshot_refresh_age_sec: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment. `ADMIN_TOKEN` is required;
    /// everything else falls back to defaults.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        cfg.admin_token = env::var("ADMIN_TOKEN").expect("ADMIN_TOKEN must be set");

        if let Ok(url) = env::var("DATABASE_URL") {
            cfg.database_url = url;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            if let Ok(port) = port.parse() {
                cfg.http_port = port;
            }
        }
        if let Ok(n) = env::var("PROBE_CONCURRENCY") {
            if let Ok(n) = n.parse::<usize>() {
                cfg.probe_concurrency = n.max(1);
            }
        }
        if let Ok(n) = env::var("SCHEDULER_LEASE_SEC") {
            if let Ok(n) = n.parse() {
                cfg.scheduler_lease_sec = n;
            }
        }
        if let Ok(n) = env::var("ROLLUP_LEASE_SEC") {
            if let Ok(n) = n.parse() {
                cfg.rollup_lease_sec = n;
            }
        }
        if let Ok(n) = env::var("SNAPSHOT_MAX_AGE_SEC") {
            if let Ok(n) = n.parse() {
                cfg.snapshot_max_age_sec = n;
            }
        }
        if let Ok(n) = env::var("SNAPSHOT_REFRESH_AGE_SEC") {
            if let Ok(n) = n.parse() {
                cfg.snapshot_refresh_age_sec = n;
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.probe_concurrency, 5);
        assert_eq!(cfg.scheduler_lease_sec, 55);
        assert_eq!(cfg.snapshot_max_age_sec, 60);
        assert_eq!(cfg.snapshot_refresh_age_sec, 30);
    }
}
