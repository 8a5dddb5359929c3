pub mod auth;
pub mod basic_auth;
pub mod handler;
pub mod middleware;

use alertbridge_core::config::Config;
use alertbridge_core::metrics::Metrics;
use alertbridge_core::request_log::{PayloadLogStore, RequestLogStore};
use alertbridge_core::store::RuleStore;
use alertbridge_relay::Forwarder;
use axum::{Router, middleware as axum_mw};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rule_store: Arc<RuleStore>,
    pub forwarder: Arc<Forwarder>,
    pub metrics: Arc<Metrics>,
    pub request_logs: Arc<RequestLogStore>,
    pub payload_logs: Arc<PayloadLogStore>,
    pub start_time: Instant,
}

pub fn build_router(state: AppState) -> Router {
    // Core webhook surface — inbound delivery and the independent health probe.
    let webhook_routes = Router::new()
        .route(
            "/webhook/{source}",
            axum::routing::post(handler::webhook::receive_webhook),
        )
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .route(
            "/api/target-status",
            axum::routing::get(handler::webhook::target_status),
        );

    // Public, unauthenticated surface.
    let public_routes = Router::new()
        .route("/healthz", axum::routing::get(handler::health::healthz))
        .route("/readyz", axum::routing::get(handler::health::readyz))
        .route("/metrics", axum::routing::get(handler::health::metrics))
        .route("/api/stats", axum::routing::get(handler::dashboard::stats))
        .route(
            "/api/recent-requests",
            axum::routing::get(handler::dashboard::recent_requests),
        )
        .route(
            "/api/recent-payloads",
            axum::routing::get(handler::dashboard::recent_payloads),
        )
        .route(
            "/api/config/targets",
            axum::routing::get(handler::admin::config_targets),
        );

    // Basic-Auth-guarded admin surface: config, reload, preview, patterns, API keys.
    let admin_routes = Router::new()
        .route(
            "/api/config",
            axum::routing::get(handler::admin::get_config).put(handler::admin::put_config),
        )
        .route("/admin/reload", axum::routing::post(handler::admin::reload))
        .route(
            "/api/transform/{source}",
            axum::routing::post(handler::webhook::preview_transform),
        )
        .route(
            "/api/pattern-schemas",
            axum::routing::get(handler::patterns::schemas),
        )
        .route(
            "/api/patterns",
            axum::routing::get(handler::patterns::list).post(handler::patterns::create),
        )
        .route(
            "/api/patterns/{id}",
            axum::routing::get(handler::patterns::get).delete(handler::patterns::delete),
        )
        .route(
            "/api/patterns/apply",
            axum::routing::post(handler::patterns::apply),
        )
        .route(
            "/api/api-keys",
            axum::routing::get(handler::api_keys::list).post(handler::api_keys::create),
        )
        .route(
            "/api/api-keys/{name}",
            axum::routing::delete(handler::api_keys::delete),
        )
        .route(
            "/api/api-keys/config",
            axum::routing::put(handler::api_keys::update_config),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            basic_auth::basic_auth_middleware,
        ));

    Router::new()
        .merge(webhook_routes)
        .merge(public_routes)
        .merge(admin_routes)
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::request_logging::request_logging_middleware,
        ))
        .layer(axum_mw::from_fn(
            middleware::request_context::request_context_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
