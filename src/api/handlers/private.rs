//! `/private/*` — arbitrary JSON documents gated by the access evaluator.

use crate::access::AccessLevel;
use crate::api::handlers::error_body;
use crate::api::state::{AppState, AuthUser};
use crate::store::StoreError;
use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::error;

fn document_path(path: &str) -> String {
    format!("private/{path}")
}

/// Resolve the caller and check the required access level; `Err` carries
/// the ready-made 401/403/500 response.
async fn authorize(
    state: &AppState,
    auth: Option<&AuthUser>,
    path: &str,
    level: AccessLevel,
) -> Result<(), Response> {
    let Some(AuthUser(caller)) = auth else {
        return Err(error_body(StatusCode::UNAUTHORIZED, "Unauthorized"));
    };
    match state.access.check(&caller.name, path, level).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(error_body(StatusCode::FORBIDDEN, "Forbidden")),
        Err(err) => {
            error!("Access evaluation failed: {err}");
            Err(error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage failure",
            ))
        }
    }
}

/// `GET`/`HEAD /private/*path` — return the stored document. HEAD requests
/// get the status with an empty body.
pub async fn get_document(
    method: Method,
    Extension(state): Extension<Arc<AppState>>,
    auth: Option<Extension<AuthUser>>,
    Path(path): Path<String>,
) -> Response {
    if let Err(response) = authorize(
        &state,
        auth.as_ref().map(|Extension(user)| user),
        &path,
        AccessLevel::Read,
    )
    .await
    {
        return response;
    }
    match state.store.load_raw(&document_path(&path)).await {
        Ok(_) if method == Method::HEAD => StatusCode::OK.into_response(),
        Ok(bytes) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response(),
        Err(StoreError::NotFound(_)) if method == Method::HEAD => {
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) if err.is_not_found() => error_body(StatusCode::NOT_FOUND, "Not found"),
        // Traversal attempts read the same as missing documents.
        Err(StoreError::InvalidPath(_)) => error_body(StatusCode::NOT_FOUND, "Not found"),
        Err(err) => {
            error!("Failed to load private document: {err}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
        }
    }
}

/// `POST /private/*path` — store the request body as a JSON document.
///
/// A body that is not valid JSON is stored as a JSON string, so a later GET
/// still returns well-formed JSON.
pub async fn post_document(
    Extension(state): Extension<Arc<AppState>>,
    auth: Option<Extension<AuthUser>>,
    Path(path): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(response) = authorize(
        &state,
        auth.as_ref().map(|Extension(user)| user),
        &path,
        AccessLevel::Write,
    )
    .await
    {
        return response;
    }
    let document = match serde_json::from_slice::<Value>(&body) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(&body).into_owned()),
    };
    match state.store.save(&document_path(&path), &document).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "success": true }))).into_response(),
        Err(StoreError::InvalidPath(_)) => error_body(StatusCode::BAD_REQUEST, "Invalid path"),
        Err(err) => {
            error!("Failed to store private document: {err}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
        }
    }
}

/// `DELETE /private/*path` — remove the stored document.
pub async fn delete_document(
    Extension(state): Extension<Arc<AppState>>,
    auth: Option<Extension<AuthUser>>,
    Path(path): Path<String>,
) -> Response {
    if let Err(response) = authorize(
        &state,
        auth.as_ref().map(|Extension(user)| user),
        &path,
        AccessLevel::Delete,
    )
    .await
    {
        return response;
    }
    let target = document_path(&path);
    if !state.store.exists(&target).await {
        return error_body(StatusCode::NOT_FOUND, "Not found");
    }
    match state.store.drop_document(&target).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(err) => {
            error!("Failed to delete private document: {err}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
        }
    }
}
