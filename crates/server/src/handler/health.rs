use crate::AppState;
use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let rules_loaded = state.rule_store.is_loaded();
    Json(json!({
        "ready": rules_loaded,
        "rules_loaded": rules_loaded,
        "http_client_ready": true,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}
