use serde::{Deserialize, Serialize};

/// Normalized webhook configuration stored in `config_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
    #[serde(default = "default_payload_type")]
    pub payload_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,
}

fn default_method() -> String {
    "POST".to_string()
}
fn default_timeout_ms() -> i64 {
    5000
}
fn default_payload_type() -> String {
    "json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub enabled: bool,
    /// Name of the secret in the host-provided secret store.
    pub secret_ref: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationChannel {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub config: WebhookConfig,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// One delivery attempt per `(event_key, channel_id)`; the unique index on
/// that pair is the dedup key.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationDelivery {
    pub id: i64,
    pub event_key: String,
    pub channel_id: i64,
    pub status: String,
    pub http_status: Option<i64>,
    pub error: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannel {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub config: serde_json::Value,
}

fn default_kind() -> String {
    "webhook".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateChannel {
    pub name: Option<String>,
    pub config: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}
