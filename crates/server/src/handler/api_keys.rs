//! API-key management for the inbound webhook surface's `Auth.api_keys`.
//! Key values themselves are returned on creation only; listing omits them.

use crate::AppState;
use alertbridge_core::error::RelayError;
use alertbridge_core::rules::{ApiKeyEntry, ApiKeys, Auth};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Json, http::StatusCode};
use serde::Deserialize;
use serde_json::json;

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let rules = state.rule_store.get_rules();
    let names: Vec<_> = rules
        .auth
        .as_ref()
        .and_then(|a| a.api_keys.as_ref())
        .map(|k| k.keys.iter().map(|e| json!({"name": e.name, "created_at": e.created_at})).collect())
        .unwrap_or_else(Vec::<serde_json::Value>::new);
    Json(names)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub key: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let mut rules = (*state.rule_store.get_rules()).clone();
    let auth = rules.auth.get_or_insert_with(Auth::default);
    let api_keys = auth.api_keys.get_or_insert_with(ApiKeys::default);

    if api_keys.keys.iter().any(|e| e.name == req.name) {
        return Err(RelayError::Validation(format!(
            "an API key named {:?} already exists",
            req.name
        )));
    }

    api_keys.keys.push(ApiKeyEntry {
        name: req.name.clone(),
        key: req.key,
        created_at: Some(chrono::Utc::now().to_rfc3339()),
    });

    state.rule_store.persist_rules(&rules)?;
    state.rule_store.set_rules(rules);
    Ok((StatusCode::CREATED, Json(json!({"name": req.name}))))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let mut rules = (*state.rule_store.get_rules()).clone();
    let Some(auth) = rules.auth.as_mut() else {
        return Err(RelayError::Validation("no API keys configured".to_string()));
    };
    let Some(api_keys) = auth.api_keys.as_mut() else {
        return Err(RelayError::Validation("no API keys configured".to_string()));
    };

    let before = api_keys.keys.len();
    api_keys.keys.retain(|e| e.name != name);
    if api_keys.keys.len() == before {
        return Err(RelayError::Validation(format!("no API key named {name:?}")));
    }

    state.rule_store.persist_rules(&rules)?;
    state.rule_store.set_rules(rules);
    Ok(Json(json!({"message": "API key deleted"})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiKeysConfigRequest {
    pub required: bool,
}

/// `PUT /api/api-keys/config` — toggle whether a key is mandatory.
pub async fn update_config(
    State(state): State<AppState>,
    Json(req): Json<ApiKeysConfigRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let mut rules = (*state.rule_store.get_rules()).clone();
    let auth = rules.auth.get_or_insert_with(Auth::default);
    let api_keys = auth.api_keys.get_or_insert_with(ApiKeys::default);
    api_keys.required = req.required;

    state.rule_store.persist_rules(&rules)?;
    state.rule_store.set_rules(rules);
    Ok(Json(json!({"required": req.required})))
}
