//! Webhook notification dispatch.
//!
//! Fan out one event to every active channel with at-most-once delivery per
//! `(event_key, channel_id)`. Delivery never affects monitor state; failures
//! are recorded on the delivery row and logged.

use crate::db::channel_repository::ChannelRepository;
use crate::models::channel::{DeliveryStatus, NotificationChannel};
use crate::models::check::CheckOutcome;
use crate::models::monitor::Monitor;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "X-Signature";

#[derive(Clone)]
pub struct Notifier {
    pool: SqlitePool,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            client: reqwest::Client::new(),
        }
    }

    /// Deliver `payload` to every channel, claiming the dedup slot first.
    pub async fn dispatch_event(
        &self,
        channels: &[NotificationChannel],
        event_key: &str,
        payload: &serde_json::Value,
        now: i64,
    ) {
        let repo = ChannelRepository::new(&self.pool);

        for channel in channels {
            match repo.claim_delivery(event_key, channel.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    info!("Delivery {} -> channel {} already attempted, skipping", event_key, channel.id);
                    continue;
                }
                Err(e) => {
                    error!("Failed to claim delivery {} for channel {}: {:?}", event_key, channel.id, e);
                    continue;
                }
            }

            let (status, http_status, err) = self.deliver(channel, payload).await;
            if let Err(e) = repo
                .finalize_delivery(event_key, channel.id, status, http_status, err.as_deref())
                .await
            {
                error!("Failed to finalize delivery {} for channel {}: {:?}", event_key, channel.id, e);
            }
        }
    }

    /// Send one webhook. Returns the delivery verdict instead of an error so
    /// the caller always finalizes the claimed row.
    async fn deliver(
        &self,
        channel: &NotificationChannel,
        payload: &serde_json::Value,
    ) -> (DeliveryStatus, Option<i64>, Option<String>) {
        let config = &channel.config;

        let method = reqwest::Method::from_bytes(config.method.as_bytes())
            .unwrap_or(reqwest::Method::POST);
        let body = payload.to_string();
        let timeout = Duration::from_millis(config.timeout_ms.max(0) as u64);

        let mut request = self
            .client
            .request(method, &config.url)
            .timeout(timeout)
            .header("Content-Type", "application/json");

        if let Some(headers) = &config.headers {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }

        if let Some(signing) = &config.signing {
            if signing.enabled {
                match std::env::var(&signing.secret_ref) {
                    Ok(secret) if !secret.is_empty() => {
                        let signature = sign_body(body.as_bytes(), secret.as_bytes());
                        request = request.header(SIGNATURE_HEADER, format!("sha256={signature}"));
                    }
                    _ => {
                        warn!(
                            "Signing secret '{}' for channel {} is unavailable, sending unsigned",
                            signing.secret_ref, channel.id
                        );
                    }
                }
            }
        }

        match request.body(body).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    info!("Webhook delivered to channel {} with status {}", channel.id, status);
                    (DeliveryStatus::Success, Some(status.as_u16() as i64), None)
                } else {
                    let text = resp.text().await.unwrap_or_default();
                    error!("Webhook to channel {} failed: {} - {}", channel.id, status, text);
                    (
                        DeliveryStatus::Failed,
                        Some(status.as_u16() as i64),
                        Some(format!("status {status}")),
                    )
                }
            }
            Err(e) => {
                error!("Webhook request to channel {} failed: {:?}", channel.id, e);
                let reason = if e.is_timeout() { "timeout".to_string() } else { e.to_string() };
                (DeliveryStatus::Failed, None, Some(reason))
            }
        }
    }
}

pub fn sign_body(body: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// The outbound payload for a monitor transition event.
pub fn build_event_payload(
    event: &str,
    event_key: &str,
    timestamp: i64,
    monitor: &Monitor,
    outcome: &CheckOutcome,
) -> serde_json::Value {
    serde_json::json!({
        "event": event,
        "event_id": event_key,
        "timestamp": timestamp,
        "monitor": {
            "id": monitor.id,
            "name": monitor.name,
            "type": monitor.kind.as_str(),
            "target": monitor.target,
        },
        "state": {
            "status": outcome.status.as_str(),
            "latency_ms": outcome.latency_ms,
            "http_status": outcome.http_status,
            "error": outcome.error,
            "location": serde_json::Value::Null,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::monitor::MonitorKind;

    #[test]
    fn test_signature_is_stable_hex() {
        let a = sign_body(b"{\"event\":\"monitor.down\"}", b"s3cret");
        let b = sign_body(b"{\"event\":\"monitor.down\"}", b"s3cret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let other = sign_body(b"{\"event\":\"monitor.up\"}", b"s3cret");
        assert_ne!(a, other);
    }

    #[test]
    fn test_event_payload_shape() {
        let monitor = Monitor {
            id: 7,
            name: "api".to_string(),
            kind: MonitorKind::Http,
            target: "https://example.com".to_string(),
            interval_sec: 60,
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
        };
        let payload = build_event_payload(
            "monitor.down",
            "monitor:7:down:60",
            60,
            &monitor,
            &CheckOutcome::down("timeout"),
        );

        assert_eq!(payload["event"], "monitor.down");
        assert_eq!(payload["event_id"], "monitor:7:down:60");
        assert_eq!(payload["monitor"]["id"], 7);
        assert_eq!(payload["monitor"]["type"], "http");
        assert_eq!(payload["state"]["status"], "down");
        assert_eq!(payload["state"]["error"], "timeout");
        assert!(payload["state"]["location"].is_null());
    }
}
