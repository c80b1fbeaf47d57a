//! Build the public status payload.
//!
//! Everything the status page needs in one document: per-monitor display
//! status with heartbeats, status counts, the banner, active incidents and
//! maintenance windows. The snapshot store caches the serialized result.

use crate::db::check_repository::CheckRepository;
use crate::db::incident_repository::IncidentRepository;
use crate::db::maintenance_repository::MaintenanceRepository;
use crate::db::monitor_repository::MonitorRepository;
use crate::db::settings_repository::SettingsRepository;
use crate::models::check::CheckStatus;
use crate::models::incident::{IncidentDetail, IncidentImpact};
use crate::models::maintenance::MaintenanceWindow;
use crate::models::monitor::{Monitor, MonitorState, MonitorStatus};
use crate::utils::timeutil::{floor_to_minute, DAY};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

pub const HEARTBEAT_LIMIT: i64 = 60;
const HEARTBEAT_LOOKBACK: i64 = 7 * DAY;
const INCIDENT_LIMIT: i64 = 5;
const ACTIVE_MAINTENANCE_LIMIT: i64 = 3;
const UPCOMING_MAINTENANCE_LIMIT: i64 = 5;
const MAJOR_OUTAGE_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Serialize)]
pub struct PublicStatusResponse {
    pub generated_at: i64,
    pub page: PageInfo,
    pub overall_status: MonitorStatus,
    pub counts: StatusCounts,
    pub banner: Banner,
    pub monitors: Vec<PublicMonitor>,
    pub active_incidents: Vec<IncidentDetail>,
    pub active_maintenance: Vec<MaintenanceWindow>,
    pub upcoming_maintenance: Vec<MaintenanceWindow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub maintenance: usize,
    pub paused: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Banner {
    pub source: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident: Option<IncidentDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<MaintenanceWindow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicMonitor {
    pub id: i64,
    pub name: String,
    pub kind: &'static str,
    pub status: MonitorStatus,
    pub is_stale: bool,
    pub last_checked_at: Option<i64>,
    pub last_latency_ms: Option<i64>,
    pub heartbeats: Vec<Heartbeat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub checked_at: i64,
    pub status: CheckStatus,
    pub latency_ms: Option<i64>,
}

pub async fn build_public_status(
    pool: &SqlitePool,
    now: i64,
) -> Result<PublicStatusResponse, sqlx::Error> {
    let range_end = floor_to_minute(now);

    let monitor_repo = MonitorRepository::new(pool);
    let maintenance_repo = MaintenanceRepository::new(pool);

    let monitors = monitor_repo.get_all_active().await?;
    let states: HashMap<i64, MonitorState> = monitor_repo
        .get_states()
        .await?
        .into_iter()
        .map(|s| (s.monitor_id, s))
        .collect();
    let in_maintenance = maintenance_repo.get_active_monitor_ids(now).await?;

    let mut heartbeats: HashMap<i64, Vec<Heartbeat>> = HashMap::new();
    let recent = CheckRepository::new(pool)
        .get_recent_per_monitor(range_end - HEARTBEAT_LOOKBACK, HEARTBEAT_LIMIT)
        .await?;
    for check in recent {
        heartbeats.entry(check.monitor_id).or_default().push(Heartbeat {
            checked_at: check.checked_at,
            status: check.status,
            latency_ms: check.latency_ms,
        });
    }

    let mut counts = StatusCounts::default();
    let mut public_monitors = Vec::with_capacity(monitors.len());
    for monitor in &monitors {
        let entry = project_monitor(
            monitor,
            states.get(&monitor.id),
            in_maintenance.contains(&monitor.id),
            now,
            heartbeats.remove(&monitor.id).unwrap_or_default(),
        );
        tally(&mut counts, entry.status);
        public_monitors.push(entry);
    }

    let active_incidents = IncidentRepository::new(pool).get_unresolved(INCIDENT_LIMIT).await?;
    let active_maintenance = maintenance_repo.get_active(now, ACTIVE_MAINTENANCE_LIMIT).await?;
    let upcoming_maintenance = maintenance_repo
        .get_upcoming(now, UPCOMING_MAINTENANCE_LIMIT)
        .await?;

    let banner = derive_banner(&active_incidents, &counts, &active_maintenance);
    let overall_status = derive_overall(&counts);

    let settings = SettingsRepository::new(pool).get_all().await?;
    let page = PageInfo {
        title: settings
            .get("page_title")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "Status".to_string()),
        description: settings
            .get("page_description")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default(),
    };

    Ok(PublicStatusResponse {
        generated_at: now,
        page,
        overall_status,
        counts,
        banner,
        monitors: public_monitors,
        active_incidents,
        active_maintenance,
        upcoming_maintenance,
    })
}

/// Compute the display status and staleness for one monitor. Maintenance
/// always wins over down; a stale monitor reads as unknown with its latency
/// suppressed.
pub fn project_monitor(
    monitor: &Monitor,
    state: Option<&MonitorState>,
    in_maintenance: bool,
    now: i64,
    heartbeats: Vec<Heartbeat>,
) -> PublicMonitor {
    let stored = state.map(|s| s.status).unwrap_or(MonitorStatus::Unknown);
    let last_checked_at = state.and_then(|s| s.last_checked_at);

    let (status, is_stale) = if in_maintenance {
        (MonitorStatus::Maintenance, false)
    } else if stored == MonitorStatus::Paused || stored == MonitorStatus::Maintenance {
        (stored, false)
    } else {
        let stale = match last_checked_at {
            None => true,
            Some(at) => now - at > 2 * monitor.interval_sec,
        };
        if stale {
            (MonitorStatus::Unknown, true)
        } else {
            (stored, false)
        }
    };

    let last_latency_ms = if is_stale {
        None
    } else {
        state.and_then(|s| s.last_latency_ms)
    };

    PublicMonitor {
        id: monitor.id,
        name: monitor.name.clone(),
        kind: monitor.kind.as_str(),
        status,
        is_stale,
        last_checked_at,
        last_latency_ms,
        heartbeats,
    }
}

fn tally(counts: &mut StatusCounts, status: MonitorStatus) {
    counts.total += 1;
    match status {
        MonitorStatus::Up => counts.up += 1,
        MonitorStatus::Down => counts.down += 1,
        MonitorStatus::Maintenance => counts.maintenance += 1,
        MonitorStatus::Paused => counts.paused += 1,
        MonitorStatus::Unknown => counts.unknown += 1,
    }
}

pub fn derive_overall(counts: &StatusCounts) -> MonitorStatus {
    if counts.down > 0 {
        MonitorStatus::Down
    } else if counts.unknown > 0 {
        MonitorStatus::Unknown
    } else if counts.maintenance > 0 {
        MonitorStatus::Maintenance
    } else if counts.up > 0 {
        MonitorStatus::Up
    } else if counts.paused > 0 {
        MonitorStatus::Paused
    } else {
        MonitorStatus::Unknown
    }
}

/// Banner priority: incidents, then down monitors, then unknown, then
/// maintenance, then all-clear.
pub fn derive_banner(
    incidents: &[IncidentDetail],
    counts: &StatusCounts,
    active_maintenance: &[MaintenanceWindow],
) -> Banner {
    if !incidents.is_empty() {
        let max_impact = incidents
            .iter()
            .map(|d| d.incident.impact)
            .max()
            .unwrap_or(IncidentImpact::None);
        let status = match max_impact {
            IncidentImpact::Critical | IncidentImpact::Major => "major_outage",
            IncidentImpact::Minor => "partial_outage",
            IncidentImpact::None => "operational",
        };
        let top = incidents
            .iter()
            .max_by_key(|d| (d.incident.started_at, d.incident.id))
            .cloned();
        return Banner {
            source: "incident",
            status,
            down_ratio: None,
            incident: top,
            maintenance: None,
        };
    }

    if counts.down > 0 && counts.total > 0 {
        let down_ratio = counts.down as f64 / counts.total as f64;
        let status = if down_ratio >= MAJOR_OUTAGE_RATIO {
            "major_outage"
        } else {
            "partial_outage"
        };
        return Banner {
            source: "monitors",
            status,
            down_ratio: Some(down_ratio),
            incident: None,
            maintenance: None,
        };
    }

    if counts.unknown > 0 {
        return Banner {
            source: "monitors",
            status: "unknown",
            down_ratio: None,
            incident: None,
            maintenance: None,
        };
    }

    if let Some(window) = active_maintenance.first() {
        return Banner {
            source: "maintenance",
            status: "maintenance",
            down_ratio: None,
            incident: None,
            maintenance: Some(window.clone()),
        };
    }
    if counts.maintenance > 0 {
        return Banner {
            source: "monitors",
            status: "maintenance",
            down_ratio: None,
            incident: None,
            maintenance: None,
        };
    }

    Banner {
        source: "monitors",
        status: "operational",
        down_ratio: None,
        incident: None,
        maintenance: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::incident::{Incident, IncidentStatus};
    use crate::models::monitor::MonitorKind;

    fn monitor(id: i64, interval_sec: i64) -> Monitor {
        Monitor {
            id,
            name: format!("m{id}"),
            kind: MonitorKind::Http,
            target: "https://example.com".to_string(),
            interval_sec,
            timeout_ms: 5000,
            is_active: true,
            http_method: None,
            http_headers: None,
            http_body: None,
            expected_status: None,
            response_keyword: None,
            response_forbidden_keyword: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn state(id: i64, status: MonitorStatus, last_checked_at: i64) -> MonitorState {
        MonitorState {
            monitor_id: id,
            status,
            last_checked_at: Some(last_checked_at),
            last_changed_at: Some(last_checked_at),
            last_latency_ms: Some(30),
            last_error: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }

    fn counts(up: usize, down: usize, unknown: usize, maintenance: usize) -> StatusCounts {
        StatusCounts {
            total: up + down + unknown + maintenance,
            up,
            down,
            maintenance,
            paused: 0,
            unknown,
        }
    }

    fn incident_detail(id: i64, impact: IncidentImpact, started_at: i64) -> IncidentDetail {
        IncidentDetail {
            incident: Incident {
                id,
                title: "t".to_string(),
                status: IncidentStatus::Investigating,
                impact,
                message: None,
                started_at,
                resolved_at: None,
            },
            updates: Vec::new(),
            monitor_ids: vec![1],
        }
    }

    #[test]
    fn test_maintenance_overrides_down() {
        let m = monitor(1, 60);
        let s = state(1, MonitorStatus::Down, 100);
        let projected = project_monitor(&m, Some(&s), true, 120, Vec::new());
        assert_eq!(projected.status, MonitorStatus::Maintenance);
        assert!(!projected.is_stale);
    }

    #[test]
    fn test_stale_monitor_reads_unknown_and_hides_latency() {
        let m = monitor(1, 60);
        let s = state(1, MonitorStatus::Up, 100);
        // 2 * interval = 120s staleness threshold.
        let fresh = project_monitor(&m, Some(&s), false, 219, Vec::new());
        assert_eq!(fresh.status, MonitorStatus::Up);
        assert_eq!(fresh.last_latency_ms, Some(30));

        let stale = project_monitor(&m, Some(&s), false, 221, Vec::new());
        assert_eq!(stale.status, MonitorStatus::Unknown);
        assert!(stale.is_stale);
        assert_eq!(stale.last_latency_ms, None);
    }

    #[test]
    fn test_never_checked_is_stale() {
        let m = monitor(1, 60);
        let projected = project_monitor(&m, None, false, 1000, Vec::new());
        assert_eq!(projected.status, MonitorStatus::Unknown);
        assert!(projected.is_stale);
    }

    #[test]
    fn test_overall_priority() {
        assert_eq!(derive_overall(&counts(5, 1, 0, 0)), MonitorStatus::Down);
        assert_eq!(derive_overall(&counts(5, 0, 1, 0)), MonitorStatus::Unknown);
        assert_eq!(derive_overall(&counts(5, 0, 0, 1)), MonitorStatus::Maintenance);
        assert_eq!(derive_overall(&counts(5, 0, 0, 0)), MonitorStatus::Up);
        assert_eq!(derive_overall(&counts(0, 0, 0, 0)), MonitorStatus::Unknown);
    }

    #[test]
    fn test_banner_down_ratio_threshold() {
        let banner = derive_banner(&[], &counts(7, 3, 0, 0), &[]);
        assert_eq!(banner.source, "monitors");
        assert_eq!(banner.status, "major_outage");
        assert_eq!(banner.down_ratio, Some(0.3));

        let banner = derive_banner(&[], &counts(9, 1, 0, 0), &[]);
        assert_eq!(banner.status, "partial_outage");
    }

    #[test]
    fn test_banner_incident_beats_monitors() {
        let incidents = vec![
            incident_detail(1, IncidentImpact::Minor, 100),
            incident_detail(2, IncidentImpact::Critical, 50),
        ];
        let banner = derive_banner(&incidents, &counts(1, 9, 0, 0), &[]);
        assert_eq!(banner.source, "incident");
        assert_eq!(banner.status, "major_outage");
        // Newest started is embedded, not the most severe.
        assert_eq!(banner.incident.unwrap().incident.id, 1);
    }

    #[test]
    fn test_banner_operational_when_quiet() {
        let banner = derive_banner(&[], &counts(3, 0, 0, 0), &[]);
        assert_eq!(banner.source, "monitors");
        assert_eq!(banner.status, "operational");
    }

    #[test]
    fn test_banner_maintenance_window() {
        let window = MaintenanceWindow {
            id: 1,
            title: "upgrade".to_string(),
            message: None,
            starts_at: 0,
            ends_at: 100,
            created_at: 0,
            monitor_ids: vec![1],
        };
        let banner = derive_banner(&[], &counts(2, 0, 0, 1), &[window]);
        assert_eq!(banner.source, "maintenance");
        assert_eq!(banner.status, "maintenance");
        assert!(banner.maintenance.is_some());
    }
}
