//! Pattern-builder CRUD surface: saved source→target field-mapping
//! presets, compiled into a `Transform` and attached to a route on apply.

use crate::AppState;
use alertbridge_core::error::RelayError;
use alertbridge_core::pattern::{self, Pattern};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Json, http::StatusCode};
use serde::Deserialize;
use serde_json::json;

pub async fn schemas() -> impl IntoResponse {
    let schemas = pattern::builtin_source_schemas();
    Json(json!({
        "source_schemas": schemas.into_iter().map(|(name, fields)| json!({"source_type": name, "fields": fields})).collect::<Vec<_>>(),
        "target_fields": pattern::target_fields(),
    }))
}

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let rules = state.rule_store.get_rules();
    Json(rules.patterns.clone())
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Pattern>, RelayError> {
    let rules = state.rule_store.get_rules();
    rules
        .patterns
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| RelayError::Validation(format!("no pattern with id {id:?}")))
}

pub async fn create(
    State(state): State<AppState>,
    Json(new_pattern): Json<Pattern>,
) -> Result<impl IntoResponse, RelayError> {
    let mut rules = (*state.rule_store.get_rules()).clone();
    if rules.patterns.iter().any(|p| p.id == new_pattern.id) {
        return Err(RelayError::Validation(format!(
            "pattern with id {:?} already exists",
            new_pattern.id
        )));
    }
    rules.patterns.push(new_pattern.clone());
    state.rule_store.persist_rules(&rules)?;
    state.rule_store.set_rules(rules);
    Ok((StatusCode::CREATED, Json(new_pattern)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let mut rules = (*state.rule_store.get_rules()).clone();
    let before = rules.patterns.len();
    rules.patterns.retain(|p| p.id != id);
    if rules.patterns.len() == before {
        return Err(RelayError::Validation(format!("no pattern with id {id:?}")));
    }
    state.rule_store.persist_rules(&rules)?;
    state.rule_store.set_rules(rules);
    Ok(Json(json!({"message": "pattern deleted"})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApplyPatternRequest {
    pub pattern_id: String,
    pub route_name: String,
}

/// `POST /api/patterns/apply` — compile a saved pattern and assign it as
/// the named route's transform.
pub async fn apply(
    State(state): State<AppState>,
    Json(req): Json<ApplyPatternRequest>,
) -> Result<impl IntoResponse, RelayError> {
    let mut rules = (*state.rule_store.get_rules()).clone();
    let pattern = rules
        .patterns
        .iter()
        .find(|p| p.id == req.pattern_id)
        .cloned()
        .ok_or_else(|| RelayError::Validation(format!("no pattern with id {:?}", req.pattern_id)))?;

    let source_fields = pattern::builtin_source_schemas()
        .into_iter()
        .find(|(name, _)| *name == pattern.source_type)
        .map(|(_, fields)| fields)
        .ok_or_else(|| {
            RelayError::Validation(format!("unknown source-schema {:?}", pattern.source_type))
        })?;

    let transform = pattern::compile(&pattern, &source_fields);

    let route = rules
        .routes
        .iter_mut()
        .find(|r| r.name == req.route_name)
        .ok_or_else(|| RelayError::Validation(format!("no route named {:?}", req.route_name)))?;
    route.transform = transform;

    state.rule_store.persist_rules(&rules)?;
    state.rule_store.set_rules(rules);
    Ok(Json(json!({"message": "pattern applied"})))
}
