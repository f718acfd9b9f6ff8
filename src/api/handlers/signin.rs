//! Password signin and signout.

use crate::api::handlers::{TokensBody, error_body};
use crate::api::state::{AppState, AuthUser};
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
pub struct SigninRequest {
    password: Option<String>,
}

/// `POST /auth/signin/:username` — verify the password and mint a pair.
///
/// Unknown users get 404 with the same body text as a wrong password, so
/// the status is the only enumeration signal.
pub async fn signin(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
    payload: Option<Json<SigninRequest>>,
) -> Response {
    let Some(password) = payload.and_then(|Json(request)| request.password) else {
        return error_body(StatusCode::BAD_REQUEST, "Missing password");
    };

    let lock = state.users.lock(&username).await;
    let _guard = lock.lock().await;

    let user = match state.users.get(&username).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_body(StatusCode::NOT_FOUND, "Invalid password or username"),
        Err(err) => {
            error!("Failed to load user: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    };
    if !user.verified {
        return error_body(StatusCode::FORBIDDEN, "User not verified");
    }
    if user.password_hash != password_hash(&password) {
        return error_body(StatusCode::UNAUTHORIZED, "Invalid password or username");
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

    info!("User {username} signed in");
    (
        StatusCode::OK,
        Json(TokensBody {
            message: None,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    )
        .into_response()
}

/// `DELETE /auth/signin/:username` — drop every token and rotation node
/// belonging to the authenticated caller.
pub async fn signout(
    Extension(state): Extension<Arc<AppState>>,
    auth: Option<Extension<AuthUser>>,
    Path(_username): Path<String>,
) -> Response {
    let Some(Extension(AuthUser(caller))) = auth else {
        return error_body(StatusCode::UNAUTHORIZED, "Unauthorized");
    };

    let lock = state.users.lock(&caller.name).await;
    let _guard = lock.lock().await;

    let result = async {
        state.tokens.clear_user(&caller.name).await?;
        state.rotation.clear_user(&caller.name).await
    }
    .await;
    if let Err(err) = result {
        error!("Failed to clear tokens for {}: {err}", caller.name);
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
    }

    info!("User {} signed out", caller.name);
    (StatusCode::OK, Json(json!({ "message": "Signed out" }))).into_response()
}
