//! Request guards: per-client rate limiting and bearer authentication.

use crate::api::state::{AppState, AuthUser};
use crate::rate_limit::{Attempt, PathRateLimiter};
use axum::{
    Json,
    extract::{ConnectInfo, Extension, Request},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Identify the client: first `X-Forwarded-For` hop when present, else the
/// peer address.
fn client_key(headers: &HeaderMap, request: &Request) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(hop) = forwarded {
        return hop.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Global guard run before route dispatch.
///
/// Rate limiting halts the request with 429; bearer resolution never halts,
/// it only attaches [`AuthUser`] for handlers that require it.
pub async fn guard(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let client = client_key(request.headers(), &request);
    if state.limiter.try_attempt(&client) == Attempt::Exceeded {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Too many requests" })),
        )
            .into_response();
    }

    if let Some(token) = bearer_token(request.headers()) {
        match state.tokens.authenticate(&token, &state.users).await {
            Ok(user) => {
                request.extensions_mut().insert(AuthUser(user));
            }
            Err(failure) => debug!("Bearer token rejected: {failure}"),
        }
    }

    next.run(request).await
}

/// Brute-force guard scoped to `(client, path)`.
///
/// An alternative to the global limiter for integrators who only want to
/// throttle sensitive routes; answers plain-text 429 on exceed.
pub async fn path_guard(
    Extension(limiter): Extension<Arc<PathRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(request.headers(), &request);
    if limiter.try_attempt(&client, request.uri().path()) == Attempt::Exceeded {
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    }
    next.run(request).await
}
