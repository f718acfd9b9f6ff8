//! User listing, record projections, and access summaries.

use crate::api::handlers::{UserSummary, UserView, error_body};
use crate::api::state::{AppState, AuthUser};
use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// `GET /auth/info` — sorted usernames, admins only.
pub async fn list_users(
    Extension(state): Extension<Arc<AppState>>,
    auth: Option<Extension<AuthUser>>,
) -> Response {
    let admin = auth
        .as_ref()
        .is_some_and(|Extension(AuthUser(user))| user.is_admin());
    if !admin {
        return error_body(StatusCode::FORBIDDEN, "Forbidden");
    }
    match state.users.list().await {
        Ok(users) => (StatusCode::OK, Json(json!({ "users": users }))).into_response(),
        Err(err) => {
            error!("Failed to list users: {err}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
        }
    }
}

/// `GET /auth/info/:username` and `GET /auth/signin/:username` — project a
/// user record for the caller.
///
/// Admins, the user themself, and public profiles get the full view minus
/// secrets; everyone else gets name, email, and creation time.
pub async fn show_user(
    Extension(state): Extension<Arc<AppState>>,
    auth: Option<Extension<AuthUser>>,
    Path(username): Path<String>,
) -> Response {
    let Some(Extension(AuthUser(caller))) = auth else {
        return error_body(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    let target = match state.users.get(&username).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_body(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to load user: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    };

    if caller.is_admin() || caller.name == target.name || target.is_public {
        (StatusCode::OK, Json(UserView::from(&target))).into_response()
    } else {
        (StatusCode::OK, Json(UserSummary::from(&target))).into_response()
    }
}

/// `GET /auth/access/info` — the caller's own rules plus the group and
/// global rules that apply to them.
pub async fn access_info(
    Extension(state): Extension<Arc<AppState>>,
    auth: Option<Extension<AuthUser>>,
) -> Response {
    let Some(Extension(AuthUser(caller))) = auth else {
        return error_body(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    match state.access.info(&caller.name).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(err) => {
            error!("Failed to collect access info: {err}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
        }
    }
}
