pub mod analytics_service;
pub mod notifier;
pub mod probe_service;
pub mod rollup_service;
pub mod scheduler;
pub mod snapshot_service;
pub mod status_builder;
pub mod transition;
