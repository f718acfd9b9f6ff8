//! Signup, verification, and account deletion.

use crate::api::handlers::{TokensBody, error_body, numeric_code};
use crate::api::state::AppState;
use crate::hash::password_hash;
use crate::users::{User, valid_name};
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
pub struct SignupRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    code: Option<String>,
}

/// `POST /auth/signup` — create an unverified user and stash a
/// verification code for out-of-band delivery.
pub async fn signup(
    Extension(state): Extension<Arc<AppState>>,
    payload: Option<Json<SignupRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return error_body(StatusCode::BAD_REQUEST, "Missing required fields");
    };
    let (Some(username), Some(email), Some(password)) =
        (request.username, request.email, request.password)
    else {
        return error_body(StatusCode::BAD_REQUEST, "Missing required fields");
    };
    if !valid_name(&username) {
        return error_body(StatusCode::BAD_REQUEST, "Invalid username");
    }

    let lock = state.users.lock(&username).await;
    let _guard = lock.lock().await;

    match state.users.get(&username).await {
        Ok(Some(_)) => return error_body(StatusCode::CONFLICT, "User already exists"),
        Ok(None) => {}
        Err(err) => {
            error!("Failed to check user existence: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    }

    let mut user = User::new(&username, &email, &password_hash(&password));
    user.verification_code = Some(numeric_code());
    if let Err(err) = state.users.save(&user).await {
        error!("Failed to persist new user: {err}");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
    }
    info!("Created unverified user {username}");
    (
        StatusCode::OK,
        Json(json!({ "message": "Verification code sent" })),
    )
        .into_response()
}

/// `PUT /auth/signup/:username` — confirm the verification code, mark the
/// user verified, and hand out the first token pair.
pub async fn confirm(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
    payload: Option<Json<ConfirmRequest>>,
) -> Response {
    let code = payload.and_then(|Json(request)| request.code);

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
    if user.verified {
        return error_body(StatusCode::BAD_REQUEST, "User already verified");
    }
    if code.is_none() || code != user.verification_code {
        return error_body(StatusCode::UNAUTHORIZED, "Invalid verification code");
    }

    user.verified = true;
    user.verification_code = None;
    user.updated_at = chrono::Utc::now();
    if let Err(err) = state.users.save(&user).await {
        error!("Failed to persist verified user: {err}");
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

    info!("User {username} verified");
    (
        StatusCode::OK,
        Json(TokensBody {
            message: Some("User verified".to_string()),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    )
        .into_response()
}

/// `DELETE /auth/signup/:username` — remove the account and cascade every
/// token and rotation node that mentions it.
pub async fn remove(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
) -> Response {
    let lock = state.users.lock(&username).await;
    let _guard = lock.lock().await;

    match state.users.get(&username).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_body(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to load user: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    }

    let result = async {
        state.tokens.clear_user(&username).await?;
        state.rotation.clear_user(&username).await?;
        state.users.delete(&username).await
    }
    .await;
    if let Err(err) = result {
        error!("Failed to delete user {username}: {err}");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
    }

    info!("Deleted user {username}");
    (StatusCode::OK, Json(json!({ "message": "User deleted" }))).into_response()
}
