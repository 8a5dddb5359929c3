//! Unauthenticated read-only dashboard feeds backed by the in-memory
//! ring buffers.

use crate::AppState;
use alertbridge_core::request_log::LogQuery;
use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.request_logs.stats())
}

pub async fn recent_requests(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> impl IntoResponse {
    Json(state.request_logs.query(&query))
}

pub async fn recent_payloads(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.payload_logs.recent(100))
}
