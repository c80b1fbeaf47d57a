//! HTTP and TCP probe execution.
//!
//! Probe failures are data: anything that goes wrong on the wire becomes a
//! `down` outcome with a classified reason. `unknown` is reserved for
//! configuration errors discovered at probe time.

use crate::models::check::CheckOutcome;
use crate::models::monitor::{Monitor, MonitorKind};
use reqwest::redirect::Policy;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

const MAX_REDIRECTS: usize = 5;

/// Run the probe appropriate for the monitor's kind.
pub async fn run_probe(monitor: &Monitor) -> CheckOutcome {
    match monitor.kind {
        MonitorKind::Http => run_http_probe(monitor).await,
        MonitorKind::Tcp => run_tcp_probe(&monitor.target, monitor.timeout_ms).await,
    }
}

pub async fn run_http_probe(monitor: &Monitor) -> CheckOutcome {
    let url = match validate_http_target(&monitor.target) {
        Ok(url) => url,
        Err(reason) => return CheckOutcome::unknown(reason),
    };

    let method_str = monitor.http_method.as_deref().unwrap_or("GET");
    let method = match reqwest::Method::from_bytes(method_str.as_bytes()) {
        Ok(m) => m,
        Err(_) => return CheckOutcome::unknown(format!("invalid method {method_str}")),
    };

    // HEAD never follows redirects, everything else up to a small cap. The
    // redirect policy is per-client, so each probe gets its own.
    let policy = if method == reqwest::Method::HEAD {
        Policy::none()
    } else {
        Policy::limited(MAX_REDIRECTS)
    };
    let client = match reqwest::Client::builder().redirect(policy).build() {
        Ok(c) => c,
        Err(e) => return CheckOutcome::unknown(format!("client setup failed: {e}")),
    };

    send_http(client, monitor, method, &url).await
}

async fn send_http(
    client: reqwest::Client,
    monitor: &Monitor,
    method: reqwest::Method,
    url: &reqwest::Url,
) -> CheckOutcome {
    let timeout = Duration::from_millis(monitor.timeout_ms.max(0) as u64);

    let mut request = client
        .request(method.clone(), url.clone())
        .timeout(timeout);

    if let Some(serde_json::Value::Object(headers)) = &monitor.http_headers {
        for (name, value) in headers {
            let Some(value) = value.as_str() else {
                return CheckOutcome::unknown(format!("invalid header {name}"));
            };
            request = request.header(name.as_str(), value);
        }
    }
    if let Some(body) = &monitor.http_body {
        if method != reqwest::Method::GET && method != reqwest::Method::HEAD {
            request = request.body(body.clone());
        }
    }

    let Some(built) = request.build().ok() else {
        return CheckOutcome::unknown("invalid request configuration");
    };

    let start = Instant::now();
    let mut response = client.execute(built).await;
    let mut attempts = 1;

    // One retry on connection-level failures, within the original deadline.
    let connect_failed = matches!(&response, Err(e) if e.is_connect());
    if connect_failed && start.elapsed() < timeout {
        attempts = 2;
        let retry = client
            .request(method.clone(), url.clone())
            .timeout(timeout.saturating_sub(start.elapsed()));
        if let Ok(req) = retry.build() {
            response = client.execute(req).await;
        }
    }

    match response {
        Ok(resp) => {
            let latency_ms = start.elapsed().as_millis() as i64;
            let status = resp.status().as_u16();

            let status_ok = match &monitor.expected_status {
                Some(expected) => expected.contains(&status),
                None => (200..300).contains(&status),
            };
            if !status_ok {
                let mut outcome = CheckOutcome::down(format!("status {status}"));
                outcome.http_status = Some(status as i64);
                outcome.latency_ms = Some(latency_ms);
                outcome.attempts = attempts;
                return outcome;
            }

            if monitor.response_keyword.is_some() || monitor.response_forbidden_keyword.is_some() {
                let body = match resp.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        let mut outcome = CheckOutcome::down(classify_reqwest_error(&e));
                        outcome.attempts = attempts;
                        return outcome;
                    }
                };
                if let Some(keyword) = &monitor.response_keyword {
                    if !body.contains(keyword.as_str()) {
                        let mut outcome = CheckOutcome::down("missing keyword");
                        outcome.http_status = Some(status as i64);
                        outcome.latency_ms = Some(latency_ms);
                        outcome.attempts = attempts;
                        return outcome;
                    }
                }
                if let Some(forbidden) = &monitor.response_forbidden_keyword {
                    if body.contains(forbidden.as_str()) {
                        let mut outcome = CheckOutcome::down("forbidden keyword present");
                        outcome.http_status = Some(status as i64);
                        outcome.latency_ms = Some(latency_ms);
                        outcome.attempts = attempts;
                        return outcome;
                    }
                }
            }

            let mut outcome = CheckOutcome::up(latency_ms, Some(status as i64));
            outcome.attempts = attempts;
            outcome
        }
        Err(e) => {
            let mut outcome = CheckOutcome::down(classify_reqwest_error(&e));
            outcome.attempts = attempts;
            outcome
        }
    }
}

pub async fn run_tcp_probe(target: &str, timeout_ms: i64) -> CheckOutcome {
    let (host, port) = match validate_tcp_target(target) {
        Ok(parts) => parts,
        Err(reason) => return CheckOutcome::unknown(reason),
    };

    let timeout = Duration::from_millis(timeout_ms.max(0) as u64);
    let start = Instant::now();

    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host.as_str(), port))).await
    {
        Ok(Ok(_stream)) => CheckOutcome::up(start.elapsed().as_millis() as i64, None),
        Ok(Err(e)) => CheckOutcome::down(format!("connect error: {e}")),
        Err(_) => CheckOutcome::down("timeout"),
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timeout".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else if e.is_redirect() {
        "too many redirects".to_string()
    } else {
        "network error".to_string()
    }
}

/// Validate an HTTP monitor target: scheme, hostname, port and address
/// allow-lists. Also used by the admin write path so bad targets are
/// rejected before they are stored.
pub fn validate_http_target(target: &str) -> Result<reqwest::Url, String> {
    let url: reqwest::Url = target.parse().map_err(|_| "invalid url".to_string())?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {other}")),
    }

    let host = url.host_str().ok_or_else(|| "empty hostname".to_string())?;
    check_host_allowed(host)?;

    if let Some(port) = url.port() {
        check_port_allowed(port)?;
    }

    Ok(url)
}

/// Validate a TCP target of the form `host:port` or `[v6addr]:port`.
pub fn validate_tcp_target(target: &str) -> Result<(String, u16), String> {
    let (host, port_str) = if let Some(rest) = target.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| "invalid target".to_string())?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| "missing port".to_string())?;
        (host.to_string(), port)
    } else {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| "missing port".to_string())?;
        (host.to_string(), port)
    };

    if host.is_empty() {
        return Err("empty hostname".to_string());
    }
    let port: u16 = port_str.parse().map_err(|_| "invalid port".to_string())?;

    check_host_allowed(&host)?;
    check_port_allowed(port)?;

    Ok((host, port))
}

fn check_host_allowed(host: &str) -> Result<(), String> {
    if host.eq_ignore_ascii_case("localhost") {
        return Err("target host is not allowed".to_string());
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked_ip(&ip) {
            return Err("target address is not allowed".to_string());
        }
    }
    Ok(())
}

fn check_port_allowed(port: u16) -> Result<(), String> {
    if port == 80 || port == 443 || port >= 1024 {
        Ok(())
    } else {
        Err(format!("port {port} is not allowed"))
    }
}

fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_v4(&mapped);
            }
            is_blocked_v6(v6)
        }
    }
}

fn is_blocked_v4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    match octets[0] {
        0 | 10 | 127 => true,
        100 if (64..128).contains(&octets[1]) => true,
        169 if octets[1] == 254 => true,
        172 if (16..32).contains(&octets[1]) => true,
        192 if octets[1] == 168 => true,
        192 if octets[1] == 0 && octets[2] == 2 => true,
        198 if octets[1] == 18 || octets[1] == 19 => true,
        224..=255 => true,
        _ => false,
    }
}

fn is_blocked_v6(ip: &Ipv6Addr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() {
        return true;
    }
    let first = ip.segments()[0];
    // fe80::/10 link-local, fc00::/7 unique-local
    (first & 0xffc0) == 0xfe80 || (first & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_target_schemes() {
        assert!(validate_http_target("https://example.com/health").is_ok());
        assert!(validate_http_target("http://example.com").is_ok());
        assert!(validate_http_target("ftp://example.com").is_err());
        assert!(validate_http_target("not a url").is_err());
    }

    #[test]
    fn test_blocked_hosts() {
        assert!(validate_http_target("http://localhost/").is_err());
        assert!(validate_http_target("http://127.0.0.1/").is_err());
        assert!(validate_http_target("http://10.1.2.3/").is_err());
        assert!(validate_http_target("http://100.64.0.1/").is_err());
        assert!(validate_http_target("http://169.254.0.1/").is_err());
        assert!(validate_http_target("http://172.16.0.1/").is_err());
        assert!(validate_http_target("http://172.31.255.255/").is_err());
        assert!(validate_http_target("http://192.168.1.1/").is_err());
        assert!(validate_http_target("http://192.0.2.7/").is_err());
        assert!(validate_http_target("http://198.18.0.1/").is_err());
        assert!(validate_http_target("http://224.0.0.1/").is_err());
        assert!(validate_http_target("http://[::1]/").is_err());
        assert!(validate_http_target("http://[fe80::1]/").is_err());
        assert!(validate_http_target("http://[fc00::1]/").is_err());
    }

    #[test]
    fn test_allowed_hosts() {
        assert!(validate_http_target("http://93.184.216.34/").is_ok());
        assert!(validate_http_target("http://172.32.0.1/").is_ok());
        assert!(validate_http_target("http://100.128.0.1/").is_ok());
        assert!(validate_http_target("http://198.20.0.1/").is_ok());
    }

    #[test]
    fn test_port_allow_list() {
        assert!(validate_http_target("http://example.com:80/").is_ok());
        assert!(validate_http_target("https://example.com:443/").is_ok());
        assert!(validate_http_target("http://example.com:8080/").is_ok());
        assert!(validate_http_target("http://example.com:22/").is_err());
        assert!(validate_http_target("http://example.com:1023/").is_err());
    }

    #[test]
    fn test_tcp_target_parsing() {
        assert_eq!(
            validate_tcp_target("db.example.com:5432").unwrap(),
            ("db.example.com".to_string(), 5432)
        );
        assert_eq!(
            validate_tcp_target("[2001:db8::1]:6379").unwrap(),
            ("2001:db8::1".to_string(), 6379)
        );
        assert!(validate_tcp_target("example.com").is_err());
        assert!(validate_tcp_target("localhost:9000").is_err());
        assert!(validate_tcp_target("example.com:999").is_err());
        assert!(validate_tcp_target("[::1]:8080").is_err());
        assert!(validate_tcp_target(":8080").is_err());
    }

    #[tokio::test]
    async fn test_tcp_probe_rejects_bad_config_as_unknown() {
        let outcome = run_tcp_probe("no-port-here", 1000).await;
        assert_eq!(outcome.status, crate::models::check::CheckStatus::Unknown);
        assert!(outcome.error.is_some());
    }
}
