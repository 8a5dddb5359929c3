//! Ambient admin surface: read/replace the rule document, force a reload,
//! and list effective target URLs without ever echoing secrets.

use crate::AppState;
use alertbridge_core::error::RelayError;
use alertbridge_core::rules::{self, RuleSet};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{Json, http::StatusCode};
use bytes::Bytes;
use serde_json::json;

const MAX_CONFIG_BODY_BYTES: usize = 512 * 1024;

/// `GET /api/config` — YAML by default, JSON when `Accept: application/json`.
pub async fn get_config(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, RelayError> {
    let rules = state.rule_store.get_rules();
    let wants_json = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));

    if wants_json {
        Ok((
            [("content-type", "application/json")],
            serde_json::to_string_pretty(&*rules)?,
        ))
    } else {
        let yaml = serde_yaml_ng::to_string(&*rules)
            .map_err(|e| RelayError::Internal(format!("failed to serialize rules: {e}")))?;
        Ok(([("content-type", "application/yaml")], yaml))
    }
}

/// `PUT /api/config` — replace the RuleSet from the request body (YAML or
/// JSON by `Content-Type`), validate, persist, and swap it in atomically.
pub async fn put_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, RelayError> {
    if body.len() > MAX_CONFIG_BODY_BYTES {
        return Err(RelayError::Size {
            limit: MAX_CONFIG_BODY_BYTES,
        });
    }

    let is_json = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));

    let parsed: RuleSet = if is_json {
        serde_json::from_slice(&body)?
    } else {
        serde_yaml_ng::from_slice(&body)
            .map_err(|e| RelayError::Validation(format!("invalid YAML: {e}")))?
    };

    let errors = rules::validate(&parsed);
    if !errors.is_empty() {
        return Err(RelayError::Validation(format!(
            "rule document failed validation: {}",
            errors.join("; ")
        )));
    }

    state.rule_store.persist_rules(&parsed)?;
    state.rule_store.set_rules(parsed);

    Ok(Json(json!({"message": "configuration updated"})))
}

/// `POST /admin/reload` — force a reload from the persisted document.
pub async fn reload(State(state): State<AppState>) -> Result<impl IntoResponse, RelayError> {
    match state.rule_store.reload_rules() {
        Ok(rules) => {
            state.metrics.record_config_reload(true);
            Ok((
                StatusCode::OK,
                Json(json!({"message": "reloaded", "routes": rules.routes.len()})),
            ))
        }
        Err(e) => {
            state.metrics.record_config_reload(false);
            Err(e)
        }
    }
}

/// `GET /api/config/targets` — effective target URL per route; secrets
/// (API keys, auth headers, CA paths) are never echoed, only the URL.
pub async fn config_targets(State(state): State<AppState>) -> impl IntoResponse {
    let rules = state.rule_store.get_rules();
    let targets: Vec<_> = rules
        .routes
        .iter()
        .map(|r| {
            json!({
                "route": r.name,
                "source": r.r#match.source,
                "target_url": r.target.resolve_url(),
                "verify_tls": r.target.verify_tls,
            })
        })
        .collect();
    Json(targets)
}
