//! The core webhook surface (C3 + C2 + C4 wired together):
//! `POST /webhook/{source}`, the Basic-Auth-guarded transform preview at
//! `POST /api/transform/{source}`, and the cross-route health probe at
//! `GET /api/target-status`.

use crate::AppState;
use crate::auth;
use alertbridge_core::error::RelayError;
use alertbridge_core::request_log::{PayloadLogEntry, RequestLogEntry};
use alertbridge_core::rules::resolve_route;
use alertbridge_core::{path, transform};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{Json, http::StatusCode};
use bytes::Bytes;
use serde_json::{Value, json};

const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let start = std::time::Instant::now();

    let outcome = handle_webhook(&state, &source, &headers, &body, &request_id).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let (status, route_name, forwarded, error) = match &outcome {
        Ok((all_ok, route_name)) => (
            if *all_ok { StatusCode::OK } else { StatusCode::ACCEPTED },
            Some(route_name.clone()),
            Some(*all_ok),
            None,
        ),
        Err(e) => (e.status_code(), None, None, Some(e.to_string())),
    };

    state.metrics.record_request(&source, route_name.as_deref().unwrap_or("-"), status.as_u16());
    state.request_logs.push(RequestLogEntry {
        timestamp: chrono::Utc::now().timestamp_millis(),
        request_id: request_id.clone(),
        source: source.clone(),
        route: route_name,
        status: status.as_u16(),
        forwarded,
        duration_ms,
        error: error.clone(),
    });

    match outcome {
        Ok((all_ok, _)) => (
            status,
            Json(json!({"status": if all_ok {"forwarded"} else {"partial"}, "request_id": request_id, "forwarded": all_ok})),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(request_id = %request_id, source = %source, error = %e, "webhook request failed");
            e.into_response()
        }
    }
}

/// Returns `(all_sends_succeeded, route_name)` on success, so the caller
/// can still log/attribute the route even when forwarding partially fails.
async fn handle_webhook(
    state: &AppState,
    source: &str,
    headers: &HeaderMap,
    body: &Bytes,
    request_id: &str,
) -> Result<(bool, String), RelayError> {
    if body.len() > MAX_WEBHOOK_BODY_BYTES {
        return Err(RelayError::Size {
            limit: MAX_WEBHOOK_BODY_BYTES,
        });
    }

    let rules = state.rule_store.get_rules();
    let route = resolve_route(&rules.routes, source)
        .ok_or_else(|| RelayError::Routing(source.to_string()))?
        .clone();

    if let Some(api_keys) = rules.auth.as_ref().and_then(|a| a.api_keys.as_ref()) {
        auth::verify_api_key(api_keys, headers)?;
    }

    if let Some(hmac) = &route.verify_hmac {
        let verified = auth::verify_hmac(hmac, headers, body);
        state.metrics.record_hmac_verify(&route.name, verified.is_ok());
        verified?;
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::Validation(format!("invalid JSON body: {e}")))?;

    let unrolled = unroll(&payload, route.unroll_alerts)?;

    let sanitized_preview = transform::sanitize(&payload);
    state.payload_logs.push(PayloadLogEntry {
        timestamp: chrono::Utc::now().timestamp_millis(),
        request_id: request_id.to_string(),
        source: source.to_string(),
        route: Some(route.name.clone()),
        sanitized_payload: sanitized_preview,
    });

    let mut all_ok = true;
    for item in &unrolled {
        let transformed = transform::apply(&route.transform, item);
        let send_start = std::time::Instant::now();
        let result = state
            .forwarder
            .forward_payload(&route, &rules.defaults, &transformed, request_id)
            .await;
        state
            .metrics
            .record_forward_latency(&route.name, send_start.elapsed().as_secs_f64());
        match result {
            Ok(()) => state.metrics.record_forward(&route.name, true),
            Err(e) => {
                state.metrics.record_forward(&route.name, false);
                tracing::warn!(
                    request_id = %request_id,
                    route = %route.name,
                    error = %e,
                    sanitized_payload = %transform::sanitize(item),
                    "forward failed"
                );
                all_ok = false;
            }
        }
    }

    Ok((all_ok, route.name))
}

/// Alert "unrolling" (§4.3): when enabled and `alerts` is a non-empty
/// array, emit one payload per element with `alerts` narrowed to that
/// single element. A non-object element is rejected outright rather than
/// forwarded opaquely.
fn unroll(payload: &Value, unroll_alerts: bool) -> Result<Vec<Value>, RelayError> {
    if !unroll_alerts {
        return Ok(vec![payload.clone()]);
    }

    let alerts = match payload.get("alerts").and_then(Value::as_array) {
        Some(a) if !a.is_empty() => a,
        _ => return Ok(vec![payload.clone()]),
    };

    let mut out = Vec::with_capacity(alerts.len());
    for alert in alerts {
        if !alert.is_object() {
            return Err(RelayError::Validation(
                "alerts element is not a JSON object".to_string(),
            ));
        }
        let mut copy = payload.clone();
        path::set(&mut copy, "alerts", Value::Array(vec![alert.clone()]));
        out.push(copy);
    }
    Ok(out)
}

/// `POST /api/transform/{source}` — preview mode: apply the route's
/// transform and echo the result without forwarding. Basic-Auth guarded.
pub async fn preview_transform(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, RelayError> {
    let rules = state.rule_store.get_rules();
    let route = resolve_route(&rules.routes, &source)
        .ok_or_else(|| RelayError::Routing(source.clone()))?;
    let transformed = transform::apply(&route.transform, &payload);
    Ok(Json(transformed))
}

/// `GET /api/target-status` — fan out the two-phase health probe across
/// every configured route concurrently.
pub async fn target_status(State(state): State<AppState>) -> Json<Vec<alertbridge_relay::TargetStatus>> {
    let rules = state.rule_store.get_rules();
    let futures = rules
        .routes
        .iter()
        .map(|route| state.forwarder.check_target_status(route, &rules.defaults));
    let results = futures::future::join_all(futures).await;
    Json(results)
}

type Response = axum::response::Response;
