//! Password-reset flow: code issuance and redemption.

use crate::api::handlers::{TokensBody, error_body, numeric_code};
use crate::api::state::AppState;
use crate::hash::password_hash;
use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    code: Option<String>,
    password: Option<String>,
}

/// `POST /auth/forgot/:username` — stamp a reset code on the user.
pub async fn forgot(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
) -> Response {
    let lock = state.users.lock(&username).await;
    let _guard = lock.lock().await;

    let mut user = match state.users.get(&username).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_body(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to load user: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    };

    user.reset_code = Some(numeric_code());
    user.updated_at = chrono::Utc::now();
    if let Err(err) = state.users.save(&user).await {
        error!("Failed to persist reset code: {err}");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
    }

    info!("Issued reset code for {username}");
    (StatusCode::OK, Json(json!({ "message": "Reset code sent" }))).into_response()
}

/// `PUT /auth/forgot/:username` — redeem the reset code for a new password
/// and a fresh token pair.
///
/// The 404 body deliberately matches the 401 wording; an unknown name and a
/// wrong code read the same to a prober. When the server is configured to
/// clear tokens on reset, every existing token and rotation node for the
/// user is revoked before the new pair is minted.
pub async fn reset(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
    payload: Option<Json<ResetRequest>>,
) -> Response {
    let (code, password) = match payload {
        Some(Json(ResetRequest {
            code: Some(code),
            password: Some(password),
        })) => (code, password),
        _ => return error_body(StatusCode::BAD_REQUEST, "Missing required fields"),
    };

    let lock = state.users.lock(&username).await;
    let _guard = lock.lock().await;

    let mut user = match state.users.get(&username).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_body(StatusCode::NOT_FOUND, "Invalid reset code"),
        Err(err) => {
            error!("Failed to load user: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    };
    if user.reset_code.as_deref() != Some(code.as_str()) {
        return error_body(StatusCode::UNAUTHORIZED, "Invalid reset code");
    }

    user.password_hash = password_hash(&password);
    user.reset_code = None;
    user.updated_at = chrono::Utc::now();

    let result = async {
        if state.config().clear_tokens_on_reset() {
            state.tokens.clear_user(&username).await?;
            state.rotation.clear_user(&username).await?;
        }
        Ok::<(), crate::store::StoreError>(())
    }
    .await;
    if let Err(err) = result {
        error!("Failed to revoke tokens on reset: {err}");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
    }
    if let Err(err) = state.users.save(&user).await {
        error!("Failed to persist password reset: {err}");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
    }

    let pair = match state.tokens.mint(&username).await {
        Ok(pair) => pair,
        Err(err) => {
            error!("Failed to mint tokens: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    };
    if let Err(err) = state
        .rotation
        .register(&pair.refresh_token, &username, None)
        .await
    {
        error!("Failed to register refresh token: {err}");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
    }

    info!("Password reset for {username}");
    (
        StatusCode::OK,
        Json(TokensBody {
            message: Some("Password reset".to_string()),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    )
        .into_response()
}
