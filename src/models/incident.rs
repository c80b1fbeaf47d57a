use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Investigating,
    Identified,
    Monitoring,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Identified => "identified",
            IncidentStatus::Monitoring => "monitoring",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "investigating" => Some(IncidentStatus::Investigating),
            "identified" => Some(IncidentStatus::Identified),
            "monitoring" => Some(IncidentStatus::Monitoring),
            "resolved" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentImpact {
    None,
    Minor,
    Major,
    Critical,
}

impl IncidentImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentImpact::None => "none",
            IncidentImpact::Minor => "minor",
            IncidentImpact::Major => "major",
            IncidentImpact::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(IncidentImpact::None),
            "minor" => Some(IncidentImpact::Minor),
            "major" => Some(IncidentImpact::Major),
            "critical" => Some(IncidentImpact::Critical),
            _ => None,
        }
    }
}

/// Operator-authored narrative of a disruption.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: i64,
    pub title: String,
    pub status: IncidentStatus,
    pub impact: IncidentImpact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub started_at: i64,
    pub resolved_at: Option<i64>,
}

/// Append-only progress note on an incident.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentUpdate {
    pub id: i64,
    pub incident_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    pub message: String,
    pub created_at: i64,
}

/// Incident with its update trail and linked monitor ids, as served by the
/// public and admin APIs.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentDetail {
    #[serde(flatten)]
    pub incident: Incident,
    pub updates: Vec<IncidentUpdate>,
    pub monitor_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIncident {
    pub title: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_impact")]
    pub impact: String,
    pub message: Option<String>,
    pub started_at: Option<i64>,
    pub monitor_ids: Vec<i64>,
}

fn default_status() -> String {
    "investigating".to_string()
}
fn default_impact() -> String {
    "none".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateIncidentUpdate {
    pub status: Option<String>,
    pub message: String,
}
