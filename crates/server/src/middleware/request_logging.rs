use alertbridge_core::context::RequestContext;
use axum::{extract::Request, middleware::Next, response::Response};

/// Logs request/response with the injected `RequestContext`. Per-route
/// structured fields (`source`, `route`, `forward_result`) are attached by
/// the webhook handler itself via `tracing::info!` at the point those are
/// known; this middleware only covers the request envelope.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let ctx = request.extensions().get::<RequestContext>().cloned();
    let request_id = ctx.as_ref().map(|c| c.request_id.clone()).unwrap_or_default();
    let client_ip = ctx
        .as_ref()
        .and_then(|c| c.client_ip.clone())
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(
        request_id = %request_id,
        client_ip = %client_ip,
        method = %method,
        path = %uri,
        "request received"
    );

    let response = next.run(request).await;

    let elapsed = ctx.map(|c| c.elapsed_ms()).unwrap_or(0);
    let status = response.status().as_u16();

    tracing::info!(
        request_id = %request_id,
        status = status,
        elapsed_ms = elapsed,
        "request completed"
    );

    response
}
