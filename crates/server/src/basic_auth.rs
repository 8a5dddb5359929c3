//! Basic Auth middleware guarding the admin surface (config, reload,
//! patterns, API-key management, transform preview). Credentials come
//! from `RuleSet.auth.basic.users` (password resolved per-user from its
//! `password_env`), falling back to `Config.basic_auth_user`/`_password`
//! when no users are configured — mirroring the JWT middleware's
//! extract-then-validate shape from this codebase's dashboard auth, but
//! over HTTP Basic rather than bearer JWTs.

use crate::AppState;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{extract::State, http::Request, middleware::Next, response::Response};
use base64::Engine;
use serde_json::json;

pub async fn basic_auth_middleware(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let rules = state.rule_store.get_rules();
    let config = state.config.clone();

    let header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing_credentials", "Authorization header required"))?;

    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| unauthorized("invalid_scheme", "Expected Basic authentication"))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| unauthorized("invalid_credentials", "Malformed Basic credentials"))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| unauthorized("invalid_credentials", "Malformed Basic credentials"))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| unauthorized("invalid_credentials", "Malformed Basic credentials"))?;

    let basic_users = rules.auth.as_ref().and_then(|a| a.basic.as_ref());
    let authorized = match basic_users {
        Some(basic) if !basic.users.is_empty() => basic.users.iter().any(|u| {
            u.username == username
                && std::env::var(&u.password_env)
                    .map(|expected| crate::auth::constant_time_eq(expected.as_bytes(), password.as_bytes()))
                    .unwrap_or(false)
        }),
        _ => {
            match (&config.basic_auth_user, &config.basic_auth_password) {
                (Some(u), Some(p)) => {
                    u == username && crate::auth::constant_time_eq(p.as_bytes(), password.as_bytes())
                }
                _ => false,
            }
        }
    };

    if !authorized {
        return Err(unauthorized("invalid_credentials", "Invalid username or password"));
    }

    Ok(next.run(request).await)
}

fn unauthorized(code: &str, message: &str) -> Response {
    let body = json!({"error": code, "message": message});
    (
        StatusCode::UNAUTHORIZED,
        [("content-type", "application/json")],
        body.to_string(),
    )
        .into_response()
}
