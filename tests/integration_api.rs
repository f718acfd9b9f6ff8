//! End-to-end API tests.
//!
//! Each test builds the full application router over a scratch data
//! directory and drives it in-process with `tower::ServiceExt::oneshot`,
//! covering the signup/verify/signin lifecycle, refresh rotation, password
//! reset, access gating of `/private/*`, and rate limiting.

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::Response,
};
use pordisto::api::state::{AppState, ServerConfig};
use pordisto::api::router;
use pordisto::ports::PortSpec;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestServer {
    _dir: TempDir,
    app: Router,
    state: Arc<AppState>,
}

impl TestServer {
    /// Fresh server over a scratch data root. The rate limit is opened up
    /// so unrelated tests never trip it; the rate-limit test configures
    /// its own.
    async fn new() -> Result<Self> {
        Self::with_config(|config| config.with_rate_limit(10_000, Duration::from_secs(1))).await
    }

    async fn with_config(adjust: impl FnOnce(ServerConfig) -> ServerConfig) -> Result<Self> {
        let dir = TempDir::new()?;
        let config = adjust(ServerConfig::new(dir.path(), PortSpec::Single(0)));
        let state = Arc::new(AppState::new(config).await?);
        let app = router(state.clone());
        Ok(Self {
            _dir: dir,
            app,
            state,
        })
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Response> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(value) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))?,
            None => builder.body(Body::empty())?,
        };
        Ok(self.app.clone().oneshot(request).await?)
    }

    /// Sign up and verify `name`, returning `(access, refresh)` tokens.
    async fn verified_user(&self, name: &str) -> Result<(String, String)> {
        let response = self
            .request(
                "POST",
                "/auth/signup",
                None,
                Some(json!({ "username": name, "email": format!("{name}@example.com"), "password": "p" })),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        let code = self.verification_code(name).await?;
        let response = self
            .request(
                "PUT",
                &format!("/auth/signup/{name}"),
                None,
                Some(json!({ "code": code })),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        Ok((
            body["accessToken"].as_str().expect("access token").to_string(),
            body["refreshToken"].as_str().expect("refresh token").to_string(),
        ))
    }

    async fn verification_code(&self, name: &str) -> Result<String> {
        let user = self
            .state
            .users
            .get(name)
            .await?
            .expect("user should exist");
        Ok(user.verification_code.expect("code should be pending"))
    }

    async fn reset_code(&self, name: &str) -> Result<String> {
        let user = self
            .state
            .users
            .get(name)
            .await?
            .expect("user should exist");
        Ok(user.reset_code.expect("reset code should be pending"))
    }

    async fn allow_everyone(&self) -> Result<()> {
        self.state.store.save_raw(".access", b"* rwd /\n").await?;
        Ok(())
    }
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn happy_signup_verify_signin_private() -> Result<()> {
    let server = TestServer::new().await?;
    server.allow_everyone().await?;
    let (access, _refresh) = server.verified_user("alice").await?;

    let response = server
        .request(
            "POST",
            "/private/notes.json",
            Some(&access),
            Some(json!({ "t": 1 })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await?, json!({ "success": true }));

    let response = server
        .request("GET", "/private/notes.json", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?, json!({ "t": 1 }));

    // Signout revokes the access token.
    let response = server
        .request("DELETE", "/auth/signin/alice", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .request("GET", "/private/notes.json", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn duplicate_signup_conflicts() -> Result<()> {
    let server = TestServer::new().await?;
    let payload = json!({ "username": "alice", "email": "a@x", "password": "p" });
    let response = server
        .request("POST", "/auth/signup", None, Some(payload.clone()))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .request("POST", "/auth/signup", None, Some(payload))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        json_body(response).await?,
        json!({ "error": "User already exists" })
    );
    Ok(())
}

#[tokio::test]
async fn signup_missing_fields_is_rejected() -> Result<()> {
    let server = TestServer::new().await?;
    let response = server
        .request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({ "username": "alice" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn signup_invalid_username_is_rejected() -> Result<()> {
    let server = TestServer::new().await?;
    let response = server
        .request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({ "username": "no", "email": "a@x", "password": "p" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await?,
        json!({ "error": "Invalid username" })
    );
    Ok(())
}

#[tokio::test]
async fn confirm_with_wrong_code_is_unauthorized() -> Result<()> {
    let server = TestServer::new().await?;
    let response = server
        .request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({ "username": "alice", "email": "a@x", "password": "p" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .request(
            "PUT",
            "/auth/signup/alice",
            None,
            Some(json!({ "code": "000000x" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn signin_before_verification_is_forbidden() -> Result<()> {
    let server = TestServer::new().await?;
    let response = server
        .request(
            "POST",
            "/auth/signup",
            None,
            Some(json!({ "username": "alice", "email": "a@x", "password": "p" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .request(
            "POST",
            "/auth/signin/alice",
            None,
            Some(json!({ "password": "p" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn signin_unknown_user_masks_the_reason() -> Result<()> {
    let server = TestServer::new().await?;
    let response = server
        .request(
            "POST",
            "/auth/signin/ghost",
            None,
            Some(json!({ "password": "p" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    // The body wording matches the wrong-password response on purpose.
    assert_eq!(
        json_body(response).await?,
        json!({ "error": "Invalid password or username" })
    );
    Ok(())
}

#[tokio::test]
async fn signin_wrong_password_is_unauthorized() -> Result<()> {
    let server = TestServer::new().await?;
    server.verified_user("alice").await?;
    let response = server
        .request(
            "POST",
            "/auth/signin/alice",
            None,
            Some(json!({ "password": "wrong" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await?,
        json!({ "error": "Invalid password or username" })
    );
    Ok(())
}

#[tokio::test]
async fn password_reset_revokes_existing_tokens() -> Result<()> {
    let server = TestServer::new().await?;
    server.allow_everyone().await?;
    let (access, _refresh) = server.verified_user("alice").await?;

    let response = server
        .request("POST", "/auth/forgot/alice", None, None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let code = server.reset_code("alice").await?;
    let response = server
        .request(
            "PUT",
            "/auth/forgot/alice",
            None,
            Some(json!({ "code": code, "password": "q" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert!(body["accessToken"].is_string());
    assert!(body["refreshToken"].is_string());

    // The pre-reset access token no longer authenticates.
    let response = server
        .request("GET", "/private/anything", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The new password works.
    let response = server
        .request(
            "POST",
            "/auth/signin/alice",
            None,
            Some(json!({ "password": "q" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn reset_with_wrong_code_is_unauthorized() -> Result<()> {
    let server = TestServer::new().await?;
    server.verified_user("alice").await?;
    let response = server
        .request("POST", "/auth/forgot/alice", None, None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .request(
            "PUT",
            "/auth/forgot/alice",
            None,
            Some(json!({ "code": "0000000", "password": "q" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await?,
        json!({ "error": "Invalid reset code" })
    );
    Ok(())
}

#[tokio::test]
async fn reset_unknown_user_reads_like_a_bad_code() -> Result<()> {
    let server = TestServer::new().await?;
    let response = server
        .request(
            "PUT",
            "/auth/forgot/ghost",
            None,
            Some(json!({ "code": "123456", "password": "q" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(response).await?,
        json!({ "error": "Invalid reset code" })
    );
    Ok(())
}

#[tokio::test]
async fn refresh_rotation_with_replace_revokes_the_chain() -> Result<()> {
    let server = TestServer::new().await?;
    let (_access, refresh) = server.verified_user("alice").await?;

    let response = server
        .request(
            "PUT",
            &format!("/auth/refresh/{refresh}"),
            None,
            Some(json!({ "replace": true })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    let new_refresh = body["refreshToken"].as_str().expect("refresh").to_string();
    assert_ne!(new_refresh, refresh);

    // Replaying the original refresh token fails.
    let response = server
        .request(
            "PUT",
            &format!("/auth/refresh/{refresh}"),
            None,
            Some(json!({ "replace": true })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The rotated token still works.
    let response = server
        .request(
            "PUT",
            &format!("/auth/refresh/{new_refresh}"),
            None,
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn refresh_rejects_access_tokens() -> Result<()> {
    let server = TestServer::new().await?;
    let (access, _refresh) = server.verified_user("alice").await?;
    let response = server
        .request("PUT", &format!("/auth/refresh/{access}"), None, None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn rate_limit_emits_429() -> Result<()> {
    let server = TestServer::with_config(|config| {
        config.with_rate_limit(1, Duration::from_secs(1))
    })
    .await?;

    let response = server.request("GET", "/health", None, None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server.request("GET", "/health", None, None).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        json_body(response).await?,
        json!({ "error": "Too many requests" })
    );
    Ok(())
}

#[tokio::test]
async fn every_response_carries_the_server_id() -> Result<()> {
    let server = TestServer::new().await?;
    let response = server.request("GET", "/health", None, None).await?;
    let header = response
        .headers()
        .get("x-server-id")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    assert_eq!(header.as_deref(), Some(server.state.server_id.as_str()));

    // The 404 fallback is stamped too.
    let response = server.request("GET", "/no/such/route", None, None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-server-id"));
    Ok(())
}

#[tokio::test]
async fn private_requires_auth_and_permission() -> Result<()> {
    let server = TestServer::new().await?;
    let (access, _refresh) = server.verified_user("alice").await?;

    // No bearer token.
    let response = server.request("GET", "/private/doc", None, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Authenticated but no matching rule.
    let response = server
        .request("GET", "/private/doc", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A user rule opens only the matching prefix.
    server
        .state
        .store
        .save_raw("users/al/ic/alice/access.txt", b"alice rwd /mine/\n")
        .await?;
    let response = server
        .request(
            "POST",
            "/private/mine/doc",
            Some(&access),
            Some(json!({ "ok": true })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = server
        .request("GET", "/private/theirs/doc", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn private_delete_and_missing_documents() -> Result<()> {
    let server = TestServer::new().await?;
    server.allow_everyone().await?;
    let (access, _refresh) = server.verified_user("alice").await?;

    let response = server
        .request("GET", "/private/ghost.json", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .request("DELETE", "/private/ghost.json", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .request(
            "POST",
            "/private/doc.json",
            Some(&access),
            Some(json!({ "v": 2 })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = server
        .request("DELETE", "/private/doc.json", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?, json!({ "success": true }));

    let response = server
        .request("GET", "/private/doc.json", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn head_requests_reuse_the_get_route() -> Result<()> {
    let server = TestServer::new().await?;
    server.allow_everyone().await?;
    let (access, _refresh) = server.verified_user("alice").await?;
    server
        .request(
            "POST",
            "/private/doc.json",
            Some(&access),
            Some(json!({ "v": 1 })),
        )
        .await?;

    let response = server
        .request("HEAD", "/private/doc.json", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    assert!(bytes.is_empty());

    let response = server
        .request("HEAD", "/private/ghost.json", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn list_users_is_admin_only() -> Result<()> {
    let server = TestServer::new().await?;
    let (access, _refresh) = server.verified_user("alice").await?;

    let response = server.request("GET", "/auth/info", Some(&access), None).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The bootstrapped root user is an admin; sign in as root.
    let response = server
        .request(
            "POST",
            "/auth/signin/root",
            None,
            Some(json!({ "password": "root" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    let root_access = body["accessToken"].as_str().expect("access").to_string();

    let response = server
        .request("GET", "/auth/info", Some(&root_access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await?,
        json!({ "users": ["alice", "root"] })
    );
    Ok(())
}

#[tokio::test]
async fn user_projection_depends_on_the_caller() -> Result<()> {
    let server = TestServer::new().await?;
    let (alice_access, _r) = server.verified_user("alice").await?;
    let (bobby_access, _r) = server.verified_user("bobby").await?;

    // Unauthenticated.
    let response = server.request("GET", "/auth/info/alice", None, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Self sees the full record minus secrets.
    let response = server
        .request("GET", "/auth/info/alice", Some(&alice_access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["verified"], true);
    assert!(body.get("passwordHash").is_none());

    // An unrelated user only sees the summary.
    let response = server
        .request("GET", "/auth/info/alice", Some(&bobby_access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["username"], "alice");
    assert!(body.get("verified").is_none());
    assert!(body.get("roles").is_none());

    // Unknown target.
    let response = server
        .request("GET", "/auth/info/ghost", Some(&alice_access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn access_info_reflects_rule_files() -> Result<()> {
    let server = TestServer::new().await?;
    let (access, _refresh) = server.verified_user("alice").await?;

    let response = server
        .request("GET", "/auth/access/info", None, None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    server
        .state
        .store
        .save_raw("users/al/ic/alice/access.txt", b"alice r /mine\n")
        .await?;
    server.state.store.save_raw(".group", b"staff alice\n").await?;
    server
        .state
        .store
        .save_raw(".access", b"staff rw /shared\n* r /public\n")
        .await?;

    let response = server
        .request("GET", "/auth/access/info", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["groups"], json!(["staff"]));
    assert_eq!(body["userAccess"][0]["target"], "/mine");
    assert_eq!(body["groupRules"][0]["subject"], "staff");
    assert_eq!(body["globalRules"][0]["subject"], "*");
    Ok(())
}

#[tokio::test]
async fn delete_account_cascades() -> Result<()> {
    let server = TestServer::new().await?;
    server.allow_everyone().await?;
    let (access, _refresh) = server.verified_user("alice").await?;

    let response = server
        .request("DELETE", "/auth/signup/alice", None, None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Tokens and rotation nodes are gone with the account.
    let response = server
        .request("GET", "/private/anything", Some(&access), None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(server.state.users.get("alice").await?.is_none());

    let response = server
        .request("DELETE", "/auth/signup/alice", None, None)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn unknown_routes_fall_back_to_plain_404() -> Result<()> {
    let server = TestServer::new().await?;
    let response = server.request("GET", "/nope", None, None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&bytes[..], b"Not Found");
    Ok(())
}
