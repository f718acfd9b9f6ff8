//! Endpoint handlers and shared response shapes.

pub mod forgot;
pub mod health;
pub mod info;
pub mod private;
pub mod refresh;
pub mod signin;
pub mod signup;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rand::{Rng, rngs::OsRng};
use serde::Serialize;
use serde_json::json;

use crate::users::User;

/// Uniform error body: `{"error": "<message>"}`.
pub(crate) fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Six-digit numeric code for verification and password-reset flows.
/// Delivery is the integrator's concern; the code is only persisted.
pub(crate) fn numeric_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000))
}

/// Token material returned by verify, signin, refresh, and reset.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokensBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
}

/// Full record projection shown to admins, the user themself, and for
/// public users. Password hash and pending codes never leave the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserView {
    pub username: String,
    pub email: String,
    pub verified: bool,
    pub roles: Vec<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            username: user.name.clone(),
            email: user.email.clone(),
            verified: user.verified,
            roles: user.roles.iter().cloned().collect(),
            is_public: user.is_public,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Minimal projection shown to unrelated users.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserSummary {
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            username: user.name.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_code_is_six_digits() {
        for _ in 0..32 {
            let code = numeric_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn user_view_strips_secrets() {
        let mut user = User::new("alice", "a@x", "hash");
        user.verification_code = Some("123456".to_string());
        let view = UserView::from(&user);
        let json = serde_json::to_value(&view).expect("serialize");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("verificationCode").is_none());
        assert!(json.get("resetCode").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn tokens_body_omits_absent_message() {
        let body = TokensBody {
            message: None,
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert!(json.get("message").is_none());
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
    }
}
