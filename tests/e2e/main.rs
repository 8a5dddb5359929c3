//! End-to-end coverage of the webhook relay surface: a real `axum::Router`
//! built from `AppState`, driven with `tower::ServiceExt::oneshot`, against
//! an in-process mock delivery target (grounded in this codebase's
//! `crates/server/tests/dashboard_tests.rs` harness shape, adapted from
//! JWT-protected dashboard endpoints to webhook delivery + Basic-Auth admin
//! endpoints).

use alertbridge_core::config::Config;
use alertbridge_core::metrics::Metrics;
use alertbridge_core::request_log::{PayloadLogStore, RequestLogStore};
use alertbridge_core::rules::{
    ApiKeyEntry, ApiKeys, Auth, Defaults, Hmac, HmacAlgorithm, Route, RouteMatch, RuleSet, Target,
};
use alertbridge_core::store::RuleStore;
use alertbridge_core::transform::{OutputTemplate, Transform};
use alertbridge_relay::Forwarder;
use alertbridge_server::{AppState, build_router};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use hmac::Mac;
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Harness: a real AppState backed by a temp-file rule document, and an
// in-process mock delivery target recording every request it receives.
// ---------------------------------------------------------------------------

struct TestHarness {
    state: AppState,
    _temp_dir: tempfile::TempDir,
}

fn build_harness(rules: RuleSet) -> TestHarness {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let rules_path = temp_dir.path().join("rules.yaml");

    let rule_store = Arc::new(RuleStore::new(rules_path, None));
    rule_store.set_rules(rules);

    let mut config = Config::default();
    config.basic_auth_user = Some("admin".to_string());
    config.basic_auth_password = Some("s3cret".to_string());

    let state = AppState {
        config: Arc::new(config),
        rule_store,
        forwarder: Arc::new(Forwarder::new()),
        metrics: Arc::new(Metrics::new()),
        request_logs: Arc::new(RequestLogStore::new(500)),
        payload_logs: Arc::new(PayloadLogStore::new(500)),
        start_time: Instant::now(),
    };

    TestHarness {
        state,
        _temp_dir: temp_dir,
    }
}

async fn send(harness: &TestHarness, request: Request<Body>) -> (StatusCode, Value) {
    let router = build_router(harness.state.clone());
    let response = router.oneshot(request).await.expect("request failed");
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let value: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn basic_auth_header() -> String {
    use base64::Engine;
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(b"admin:s3cret")
    )
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", basic_auth_header())
        .body(Body::empty())
        .unwrap()
}

// ---------------------------------------------------------------------------
// Mock delivery target: records every body it receives (GET or POST) and
// replies with a configurable, self-repeating status sequence.
// ---------------------------------------------------------------------------

struct MockTarget {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockTarget {
    fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn spawn_mock_target(status_sequence: Vec<u16>) -> MockTarget {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let statuses = Arc::new(Mutex::new(VecDeque::from(status_sequence)));

    let requests_for_handler = requests.clone();
    let app = axum::Router::new().fallback(move |body: Bytes| {
        let requests = requests_for_handler.clone();
        let statuses = statuses.clone();
        async move {
            let parsed: Value = serde_json::from_slice(&body).unwrap_or(json!({}));
            requests.lock().unwrap().push(parsed);
            let mut statuses = statuses.lock().unwrap();
            let code = if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                *statuses.front().unwrap_or(&200)
            };
            StatusCode::from_u16(code).unwrap()
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockTarget { addr, requests }
}

fn route_to(name: &str, source: &str, target_url: String) -> Route {
    Route {
        name: name.to_string(),
        r#match: RouteMatch {
            source: source.to_string(),
        },
        target: Target {
            url: Some(target_url),
            ..Default::default()
        },
        transform: Transform::default(),
        verify_hmac: None,
        unroll_alerts: false,
    }
}

fn rules_with_routes(routes: Vec<Route>) -> RuleSet {
    RuleSet {
        version: 1,
        defaults: Defaults::default(),
        routes,
        auth: None,
        patterns: Vec::new(),
    }
}

// ===========================================================================
// Core delivery
// ===========================================================================

#[tokio::test]
async fn webhook_forwards_payload_and_applies_output_template() {
    let target = spawn_mock_target(vec![200]).await;

    let mut route = route_to("ocp", "ocp", target.url());
    let mut rename = IndexMap::new();
    rename.insert(
        "alerts.0.labels.severity".to_string(),
        "severity".to_string(),
    );
    let mut fields = IndexMap::new();
    fields.insert("severity".to_string(), "$.severity".to_string());
    route.transform = Transform {
        rename,
        output_template: Some(OutputTemplate {
            r#type: "object".to_string(),
            fields,
        }),
        ..Default::default()
    };

    let harness = build_harness(rules_with_routes(vec![route]));

    let payload = json!({
        "status": "firing",
        "alerts": [{"labels": {"alertname": "X", "severity": "critical"}}]
    });
    let (status, body) = send(&harness, post_json("/webhook/ocp", payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forwarded"], true);
    assert_eq!(target.call_count(), 1);
    assert_eq!(target.requests.lock().unwrap()[0], json!({"severity": "critical"}));
}

#[tokio::test]
async fn rename_into_array_slot_reaches_the_target_as_an_array() {
    let target = spawn_mock_target(vec![200]).await;

    let mut route = route_to("ocp", "ocp", target.url());
    let mut rename = IndexMap::new();
    rename.insert("value".to_string(), "data.items.0.val".to_string());
    route.transform = Transform {
        rename,
        ..Default::default()
    };

    let harness = build_harness(rules_with_routes(vec![route]));
    let (status, _) = send(&harness, post_json("/webhook/ocp", json!({"value": "v"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        target.requests.lock().unwrap()[0],
        json!({"data": {"items": [{"val": "v"}]}})
    );
}

#[tokio::test]
async fn route_resolution_via_dash_suffix_alias() {
    let target = spawn_mock_target(vec![200]).await;
    let route = route_to("ocp", "ocp", target.url());
    let harness = build_harness(rules_with_routes(vec![route]));

    let (status, _) = send(
        &harness,
        post_json("/webhook/ocp-alertmanager", json!({"a": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(target.call_count(), 1);
}

#[tokio::test]
async fn unknown_source_returns_404() {
    let harness = build_harness(rules_with_routes(vec![route_to(
        "ocp",
        "ocp",
        "https://example.com/hook".to_string(),
    )]));
    let (status, body) = send(&harness, post_json("/webhook/kafka", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "routing_error");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let harness = build_harness(rules_with_routes(vec![route_to(
        "ocp",
        "ocp",
        "https://example.com/hook".to_string(),
    )]));
    let huge = "a".repeat(2 * 1024 * 1024);
    let (status, _) = send(&harness, post_json("/webhook/ocp", json!({"big": huge}))).await;
    // Enforced by the `RequestBodyLimitLayer` wrapping this route before the
    // handler's own size check ever runs.
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

// ===========================================================================
// Alert unrolling
// ===========================================================================

#[tokio::test]
async fn unroll_splits_alerts_into_one_send_per_element() {
    let target = spawn_mock_target(vec![200]).await;
    let mut route = route_to("ocp", "ocp", target.url());
    route.unroll_alerts = true;
    let harness = build_harness(rules_with_routes(vec![route]));

    let payload = json!({
        "alerts": [
            {"labels": {"alertname": "A"}},
            {"labels": {"alertname": "B"}},
        ]
    });
    let (status, body) = send(&harness, post_json("/webhook/ocp", payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forwarded"], true);
    assert_eq!(target.call_count(), 2);
    let received = target.requests.lock().unwrap();
    assert_eq!(received[0]["alerts"][0]["labels"]["alertname"], "A");
    assert_eq!(received[1]["alerts"][0]["labels"]["alertname"], "B");
}

#[tokio::test]
async fn unroll_rejects_non_object_alert_element() {
    let target = spawn_mock_target(vec![200]).await;
    let mut route = route_to("ocp", "ocp", target.url());
    route.unroll_alerts = true;
    let harness = build_harness(rules_with_routes(vec![route]));

    let payload = json!({"alerts": ["not-an-object"]});
    let (status, body) = send(&harness, post_json("/webhook/ocp", payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "validation_error");
    assert_eq!(target.call_count(), 0);
}

#[tokio::test]
async fn unroll_is_a_noop_when_alerts_is_absent() {
    let target = spawn_mock_target(vec![200]).await;
    let mut route = route_to("ocp", "ocp", target.url());
    route.unroll_alerts = true;
    let harness = build_harness(rules_with_routes(vec![route]));

    let (status, _) = send(&harness, post_json("/webhook/ocp", json!({"a": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(target.call_count(), 1);
}

// ===========================================================================
// HMAC verification
// ===========================================================================

fn hex_hmac_sha256(secret: &str, body: &[u8]) -> String {
    let mut mac = hmac::Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn hmac_valid_signature_is_forwarded() {
    unsafe {
        std::env::set_var("E2E_HMAC_SECRET_VALID", "topsecret");
    }
    let target = spawn_mock_target(vec![200]).await;
    let mut route = route_to("ocp", "ocp", target.url());
    route.verify_hmac = Some(Hmac {
        secret_env: "E2E_HMAC_SECRET_VALID".to_string(),
        header: "X-Signature-256".to_string(),
        algorithm: HmacAlgorithm::Sha256,
    });
    let harness = build_harness(rules_with_routes(vec![route]));

    let body = json!({"a": 1});
    let raw = body.to_string();
    let digest = hex_hmac_sha256("topsecret", raw.as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/webhook/ocp")
        .header("content-type", "application/json")
        .header("X-Signature-256", format!("sha256={digest}"))
        .body(Body::from(raw))
        .unwrap();
    let (status, _) = send(&harness, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(target.call_count(), 1);
    unsafe {
        std::env::remove_var("E2E_HMAC_SECRET_VALID");
    }
}

#[tokio::test]
async fn hmac_invalid_signature_is_rejected_before_forwarding() {
    unsafe {
        std::env::set_var("E2E_HMAC_SECRET_INVALID", "topsecret");
    }
    let target = spawn_mock_target(vec![200]).await;
    let mut route = route_to("ocp", "ocp", target.url());
    route.verify_hmac = Some(Hmac {
        secret_env: "E2E_HMAC_SECRET_INVALID".to_string(),
        header: "X-Signature-256".to_string(),
        algorithm: HmacAlgorithm::Sha256,
    });
    let harness = build_harness(rules_with_routes(vec![route]));

    let request = Request::builder()
        .method("POST")
        .uri("/webhook/ocp")
        .header("content-type", "application/json")
        .header("X-Signature-256", "sha256=deadbeef")
        .body(Body::from(json!({"a": 1}).to_string()))
        .unwrap();
    let (status, body) = send(&harness, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "auth_error");
    assert_eq!(target.call_count(), 0);
    unsafe {
        std::env::remove_var("E2E_HMAC_SECRET_INVALID");
    }
}

// ===========================================================================
// API key auth
// ===========================================================================

#[tokio::test]
async fn required_api_key_missing_is_rejected() {
    let harness = build_harness(RuleSet {
        version: 1,
        defaults: Defaults::default(),
        routes: vec![route_to("ocp", "ocp", "https://example.com/hook".to_string())],
        auth: Some(Auth {
            basic: None,
            api_keys: Some(ApiKeys {
                keys: vec![ApiKeyEntry {
                    name: "primary".to_string(),
                    key: "k-123".to_string(),
                    created_at: None,
                }],
                required: true,
            }),
        }),
        patterns: Vec::new(),
    });

    let (status, body) = send(&harness, post_json("/webhook/ocp", json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "auth_error");
}

#[tokio::test]
async fn required_api_key_present_and_valid_is_forwarded() {
    let target = spawn_mock_target(vec![200]).await;
    let harness = build_harness(RuleSet {
        version: 1,
        defaults: Defaults::default(),
        routes: vec![route_to("ocp", "ocp", target.url())],
        auth: Some(Auth {
            basic: None,
            api_keys: Some(ApiKeys {
                keys: vec![ApiKeyEntry {
                    name: "primary".to_string(),
                    key: "k-123".to_string(),
                    created_at: None,
                }],
                required: true,
            }),
        }),
        patterns: Vec::new(),
    });

    let request = Request::builder()
        .method("POST")
        .uri("/webhook/ocp")
        .header("content-type", "application/json")
        .header("x-api-key", "k-123")
        .body(Body::from(json!({}).to_string()))
        .unwrap();
    let (status, _) = send(&harness, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(target.call_count(), 1);
}

// ===========================================================================
// SSRF guard
// ===========================================================================

#[tokio::test]
async fn non_http_target_scheme_fails_delivery_without_crashing_the_request() {
    let route = route_to("ocp", "ocp", "file:///etc/passwd".to_string());
    let harness = build_harness(rules_with_routes(vec![route]));

    let (status, body) = send(&harness, post_json("/webhook/ocp", json!({"a": 1}))).await;
    // The webhook was accepted and routed; only the outbound send failed.
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["forwarded"], false);
}

// ===========================================================================
// Retry and circuit breaker
// ===========================================================================

#[tokio::test]
async fn retries_on_5xx_and_succeeds_on_a_later_attempt() {
    let target = spawn_mock_target(vec![500, 200]).await;
    let route = route_to("ocp", "ocp", target.url());
    let harness = build_harness(rules_with_routes(vec![route]));

    let (status, body) = send(&harness, post_json("/webhook/ocp", json!({"a": 1}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["forwarded"], true);
    assert_eq!(target.call_count(), 2);
}

#[tokio::test]
async fn four_xx_response_fails_fast_without_retrying() {
    let target = spawn_mock_target(vec![400]).await;
    let route = route_to("ocp", "ocp", target.url());
    let harness = build_harness(rules_with_routes(vec![route]));

    let (status, body) = send(&harness, post_json("/webhook/ocp", json!({"a": 1}))).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["forwarded"], false);
    assert_eq!(target.call_count(), 1);
}

#[tokio::test]
async fn circuit_opens_after_five_consecutive_failures_and_stops_calling_the_target() {
    let target = spawn_mock_target(vec![400]).await;
    let route = route_to("ocp", "ocp", target.url());
    let harness = build_harness(rules_with_routes(vec![route]));

    for _ in 0..5 {
        let (status, body) = send(&harness, post_json("/webhook/ocp", json!({"a": 1}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["forwarded"], false);
    }
    assert_eq!(target.call_count(), 5);

    // The 6th attempt is denied by the breaker before it ever reaches the target.
    let (status, body) = send(&harness, post_json("/webhook/ocp", json!({"a": 1}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["forwarded"], false);
    assert_eq!(target.call_count(), 5);
}

// ===========================================================================
// Health probe
// ===========================================================================

#[tokio::test]
async fn target_status_reports_both_probe_phases() {
    let target = spawn_mock_target(vec![200]).await;
    let route = route_to("ocp", "ocp", target.url());
    let harness = build_harness(rules_with_routes(vec![route]));

    let request = Request::builder()
        .method("GET")
        .uri("/api/target-status")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&harness, request).await;

    assert_eq!(status, StatusCode::OK);
    let statuses = body.as_array().expect("target-status should return an array");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0]["route"], "ocp");
    assert_eq!(statuses[0]["phase1-ok"], true);
    assert_eq!(statuses[0]["phase2-ok"], true);
}

// ===========================================================================
// Admin surface: Basic Auth, config, transform preview
// ===========================================================================

#[tokio::test]
async fn admin_config_requires_basic_auth() {
    let harness = build_harness(rules_with_routes(vec![route_to(
        "ocp",
        "ocp",
        "https://example.com/hook".to_string(),
    )]));

    let request = Request::builder()
        .method("GET")
        .uri("/api/config")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&harness, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_config_accepts_valid_basic_credentials() {
    let harness = build_harness(rules_with_routes(vec![route_to(
        "ocp",
        "ocp",
        "https://example.com/hook".to_string(),
    )]));

    let (status, _) = send(&harness, authed_get("/api/config")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn transform_preview_does_not_forward() {
    let target = spawn_mock_target(vec![200]).await;
    let mut route = route_to("ocp", "ocp", target.url());
    let mut rename = IndexMap::new();
    rename.insert("a".to_string(), "b".to_string());
    route.transform = Transform {
        rename,
        ..Default::default()
    };
    let harness = build_harness(rules_with_routes(vec![route]));

    let request = Request::builder()
        .method("POST")
        .uri("/api/transform/ocp")
        .header("content-type", "application/json")
        .header("authorization", basic_auth_header())
        .body(Body::from(json!({"a": "v"}).to_string()))
        .unwrap();
    let (status, body) = send(&harness, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"b": "v"}));
    assert_eq!(target.call_count(), 0, "preview must never forward");
}

// ===========================================================================
// Unauthenticated dashboard feeds
// ===========================================================================

#[tokio::test]
async fn recent_requests_and_stats_reflect_webhook_traffic() {
    let target = spawn_mock_target(vec![200]).await;
    let route = route_to("ocp", "ocp", target.url());
    let harness = build_harness(rules_with_routes(vec![route]));

    send(&harness, post_json("/webhook/ocp", json!({"a": 1}))).await;
    send(&harness, post_json("/webhook/ocp", json!({"a": 2}))).await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/stats")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&harness, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_entries"], 2);

    let request = Request::builder()
        .method("GET")
        .uri("/api/recent-requests")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&harness, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn healthz_and_readyz_report_ok() {
    let harness = build_harness(rules_with_routes(vec![route_to(
        "ocp",
        "ocp",
        "https://example.com/hook".to_string(),
    )]));

    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, body) = send(&harness, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let request = Request::builder().uri("/readyz").body(Body::empty()).unwrap();
    let (status, body) = send(&harness, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}
