//! Outbound delivery (§4.4): URL resolution, SSRF guard, header
//! construction, retry-with-backoff, and the circuit breaker gate.

use crate::circuit::CircuitBreaker;
use crate::client::{self, TrustMode};
use alertbridge_core::error::RelayError;
use alertbridge_core::rules::{Defaults, Route, Target};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;

/// Fixed attempt-delay schedule: four attempts total, the first immediate.
const BACKOFF_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(0),
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

pub struct Forwarder {
    shared_client: reqwest::Client,
    breaker: CircuitBreaker,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder {
    pub fn new() -> Self {
        Self {
            shared_client: client::build_shared_client(
                Duration::from_secs(5),
                Duration::from_secs(10),
            ),
            breaker: CircuitBreaker::new(),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Send `body` to `route.target`, retrying per the fixed backoff
    /// schedule. Returns `Ok(())` on a 2xx, otherwise the last observed
    /// failure as a [`RelayError::Forward`].
    pub async fn forward_payload(
        &self,
        route: &Route,
        defaults: &Defaults,
        body: &Value,
        request_id: &str,
    ) -> Result<(), RelayError> {
        if !self.breaker.allow(&route.name) {
            tracing::warn!(route = %route.name, "circuit breaker open, refusing to forward");
            return Err(RelayError::Forward(format!(
                "circuit breaker open for route {:?}",
                route.name
            )));
        }

        let url = resolve_and_guard(&route.target)?;
        let client = self.client_for(&route.target, defaults)?;
        let headers = build_headers(&route.target, request_id)?;

        let mut last_error = None;
        for delay in BACKOFF_SCHEDULE {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match client
                .post(url.clone())
                .headers(headers.clone())
                .json(body)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.breaker.record_success(&route.name);
                        return Ok(());
                    }
                    if status.as_u16() < 500 {
                        self.breaker.record_failure(&route.name);
                        tracing::warn!(route = %route.name, %status, "target rejected request, not retrying");
                        return Err(RelayError::Forward(format!(
                            "target rejected request with status {status}"
                        )));
                    }
                    tracing::debug!(route = %route.name, %status, "target returned a server error, will retry");
                    last_error = Some(format!("target returned status {status}"));
                }
                Err(e) => {
                    tracing::debug!(route = %route.name, error = %e, "forward attempt failed, will retry");
                    last_error = Some(e.to_string());
                }
            }
        }

        self.breaker.record_failure(&route.name);
        tracing::error!(route = %route.name, "forward exhausted all retry attempts");
        Err(RelayError::Forward(
            last_error.unwrap_or_else(|| "forward failed with no response".to_string()),
        ))
    }

    /// Two-phase health probe (§4.4), independent of circuit breaker state.
    pub async fn check_target_status(&self, route: &Route, defaults: &Defaults) -> TargetStatus {
        let mut status = TargetStatus {
            route: route.name.clone(),
            target_url: None,
            phase1_ok: false,
            phase2_ok: false,
            error: None,
        };

        let url = match resolve_and_guard(&route.target) {
            Ok(u) => u,
            Err(e) => {
                status.error = Some(e.to_string());
                return status;
            }
        };
        status.target_url = Some(url.to_string());

        let client = match self.client_for(&route.target, defaults) {
            Ok(c) => c,
            Err(e) => {
                status.error = Some(e.to_string());
                return status;
            }
        };

        let origin = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or_default()
        );
        let origin = match url.port() {
            Some(p) => format!("{origin}:{p}"),
            None => origin,
        };

        match client
            .get(&origin)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(_) => status.phase1_ok = true,
            Err(e) => {
                status.error = Some(e.to_string());
                return status;
            }
        }

        let headers = match build_headers(&route.target, "health-probe") {
            Ok(h) => h,
            Err(e) => {
                status.error = Some(e.to_string());
                return status;
            }
        };

        match client
            .post(url.clone())
            .headers(headers)
            .json(&serde_json::json!({}))
            .send()
            .await
        {
            Ok(resp) => {
                status.phase2_ok = resp.status().is_success();
                if !status.phase2_ok {
                    status.error = Some(format!("target returned status {}", resp.status()));
                }
            }
            Err(e) => status.error = Some(e.to_string()),
        }

        status
    }

    fn client_for(&self, target: &Target, defaults: &Defaults) -> Result<reqwest::Client, RelayError> {
        let mode = client::resolve_trust_mode(target);
        if mode == TrustMode::Default {
            return Ok(self.shared_client.clone());
        }
        client::build_transient_client(
            &mode,
            Duration::from_secs(defaults.target_timeout_connect_sec),
            Duration::from_secs(defaults.target_timeout_read_sec),
        )
        .map_err(|e| RelayError::Forward(format!("failed to build TLS client: {e}")))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetStatus {
    pub route: String,
    pub target_url: Option<String>,
    pub phase1_ok: bool,
    pub phase2_ok: bool,
    pub error: Option<String>,
}

/// URL resolution (literal wins over env) plus the SSRF scheme guard.
fn resolve_and_guard(target: &Target) -> Result<reqwest::Url, RelayError> {
    let raw = target
        .resolve_url()
        .ok_or_else(|| RelayError::Forward("target has no url nor url_env".to_string()))?;
    let url = reqwest::Url::parse(&raw)
        .map_err(|e| RelayError::Forward(format!("target url {raw:?} is not valid: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RelayError::Forward(format!(
            "target url scheme {other:?} is not allowed"
        ))),
    }
}

fn build_headers(target: &Target, request_id: &str) -> Result<HeaderMap, RelayError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static("x-request-id"),
        HeaderValue::from_str(request_id)
            .map_err(|e| RelayError::Internal(format!("invalid request id header: {e}")))?,
    );

    if let Some(var) = &target.auth_header_env
        && let Ok(value) = std::env::var(var)
    {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&value)
                .map_err(|e| RelayError::Internal(format!("invalid auth header value: {e}")))?,
        );
    }

    if let Some(header_name) = &target.api_key_header {
        let mut value = target.resolve_api_key().unwrap_or_default();
        if header_name.eq_ignore_ascii_case("authorization") && !value.to_lowercase().starts_with("bearer ") {
            value = format!("Bearer {value}");
        }
        let name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| RelayError::Internal(format!("invalid api-key header name: {e}")))?;
        headers.insert(
            name,
            HeaderValue::from_str(&value)
                .map_err(|e| RelayError::Internal(format!("invalid api-key header value: {e}")))?,
        );
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssrf_guard_rejects_non_http_scheme() {
        let target = Target {
            url: Some("file:///etc/passwd".to_string()),
            ..Default::default()
        };
        assert!(resolve_and_guard(&target).is_err());
    }

    #[test]
    fn ssrf_guard_accepts_https() {
        let target = Target {
            url: Some("https://example.com/hook".to_string()),
            ..Default::default()
        };
        assert!(resolve_and_guard(&target).is_ok());
    }

    #[test]
    fn url_env_used_when_literal_absent() {
        unsafe {
            std::env::set_var("ALERTBRIDGE_TEST_TARGET_URL", "https://from-env.example.com/hook");
        }
        let target = Target {
            url_env: Some("ALERTBRIDGE_TEST_TARGET_URL".to_string()),
            ..Default::default()
        };
        let url = resolve_and_guard(&target).unwrap();
        assert_eq!(url.host_str(), Some("from-env.example.com"));
        unsafe {
            std::env::remove_var("ALERTBRIDGE_TEST_TARGET_URL");
        }
    }

    #[test]
    fn api_key_header_named_authorization_gets_bearer_prefix() {
        let target = Target {
            api_key_header: Some("Authorization".to_string()),
            api_key: Some("abc123".to_string()),
            ..Default::default()
        };
        let headers = build_headers(&target, "req-1").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc123");
    }

    #[test]
    fn api_key_header_with_existing_bearer_prefix_not_doubled() {
        let target = Target {
            api_key_header: Some("Authorization".to_string()),
            api_key: Some("Bearer abc123".to_string()),
            ..Default::default()
        };
        let headers = build_headers(&target, "req-1").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc123");
    }

    #[test]
    fn custom_api_key_header_untouched() {
        let target = Target {
            api_key_header: Some("X-API-Key".to_string()),
            api_key: Some("abc123".to_string()),
            ..Default::default()
        };
        let headers = build_headers(&target, "req-1").unwrap();
        assert_eq!(
            headers.get(HeaderName::from_static("x-api-key")).unwrap(),
            "abc123"
        );
    }
}
