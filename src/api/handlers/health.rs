//! Liveness probe and root banner.

use crate::api::state::AppState;
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// `GET /health` — process liveness plus a user count; the only dependency
/// is the local filesystem.
pub async fn health(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.users.list().await {
        Ok(users) => (
            StatusCode::OK,
            Json(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "users": users.len(),
            })),
        )
            .into_response(),
        Err(err) => {
            error!("Health scan failed: {err}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// `GET /` — plain banner.
pub async fn root() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
