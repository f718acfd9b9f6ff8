//! Refresh-token rotation endpoint.

use crate::api::handlers::{TokensBody, error_body};
use crate::api::state::AppState;
use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    replace: Option<bool>,
}

/// `PUT /auth/refresh/:token` — exchange a refresh token for a new pair.
///
/// The new refresh token is chained to the presented one. With
/// `replace: true` the presented token's whole chain is invalidated, so a
/// replayed ancestor finds itself already revoked.
pub async fn refresh(
    Extension(state): Extension<Arc<AppState>>,
    Path(token): Path<String>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let replace = payload
        .and_then(|Json(request)| request.replace)
        .unwrap_or(false);

    let record = match state.tokens.resolve(&token).await {
        Ok(record) if record.is_refresh => record,
        Ok(_) => {
            debug!("Access token presented to refresh endpoint");
            return error_body(StatusCode::UNAUTHORIZED, "Invalid refresh token");
        }
        Err(failure) => {
            debug!("Refresh token rejected: {failure}");
            return error_body(StatusCode::UNAUTHORIZED, "Invalid refresh token");
        }
    };

    match state.rotation.validate(&token, &record.subject).await {
        Ok(true) => {}
        Ok(false) => return error_body(StatusCode::UNAUTHORIZED, "Invalid refresh token"),
        Err(err) => {
            error!("Failed to validate rotation node: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    }

    match state.users.get(&record.subject).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            error!("Refresh token subject missing: {}", record.subject);
            return error_body(StatusCode::UNAUTHORIZED, "Invalid refresh token");
        }
        Err(err) => {
            error!("Failed to load refresh subject: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    }

    let lock = state.users.lock(&record.subject).await;
    let _guard = lock.lock().await;

    let pair = match state.tokens.mint(&record.subject).await {
        Ok(pair) => pair,
        Err(err) => {
            error!("Failed to mint tokens: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
        }
    };
    let result = async {
        state
            .rotation
            .register(&pair.refresh_token, &record.subject, Some(&token))
            .await?;
        if replace {
            state.rotation.invalidate(&token).await?;
        }
        Ok::<(), crate::store::StoreError>(())
    }
    .await;
    if let Err(err) = result {
        error!("Failed to update rotation chain: {err}");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure");
    }

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
