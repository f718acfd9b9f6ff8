//! HTTP surface: route table, middleware chain, and the serve loop.

pub mod handlers;
pub mod middleware;
pub mod state;

use crate::ports::PortSpec;
use anyhow::{Context, Result, bail};
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    routing::{get, post, put},
};
use state::{AppState, ServerConfig};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{Span, error, info, info_span, warn};

const MAX_BIND_ATTEMPTS: usize = 32;

/// Build the full application router over shared state.
///
/// Layer order is part of the contract: tracing, then the `X-Server-ID`
/// stamp, then rate limiting and bearer resolution, then route dispatch
/// with a plain-text 404 fallback.
pub fn router(state: Arc<AppState>) -> Router {
    let server_id = HeaderValue::from_str(&state.server_id)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/auth/signup", post(handlers::signup::signup))
        .route(
            "/auth/signup/:username",
            put(handlers::signup::confirm).delete(handlers::signup::remove),
        )
        .route(
            "/auth/signin/:username",
            post(handlers::signin::signin)
                .get(handlers::info::show_user)
                .delete(handlers::signin::signout),
        )
        .route("/auth/refresh/:token", put(handlers::refresh::refresh))
        .route(
            "/auth/forgot/:username",
            post(handlers::forgot::forgot).put(handlers::forgot::reset),
        )
        .route("/auth/info", get(handlers::info::list_users))
        .route("/auth/info/:username", get(handlers::info::show_user))
        .route("/auth/access/info", get(handlers::info::access_info))
        .route(
            "/private/*path",
            get(handlers::private::get_document)
                .post(handlers::private::post_document)
                .delete(handlers::private::delete_document),
        )
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("x-server-id"),
                    server_id,
                ))
                .layer(axum::extract::Extension(state))
                .layer(axum::middleware::from_fn(middleware::guard)),
        )
}

/// Start the server and run until interrupted.
///
/// # Errors
/// Returns an error if startup, binding, or serving fails.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let state = Arc::new(AppState::new(config).await?);
    let app = router(state.clone());

    let listener = bind(state.config().ports()).await?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    info!("Listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gracefully shutdown");
    Ok(())
}

/// Bind a listener, walking the port specification while the candidate is
/// already in use. Any other bind failure is fatal.
async fn bind(spec: &PortSpec) -> Result<TcpListener> {
    let mut prev = 0;
    for _ in 0..MAX_BIND_ATTEMPTS {
        let port = spec.next_port(prev)?;
        match TcpListener::bind(format!("::0:{port}")).await {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == ErrorKind::AddrInUse => {
                warn!("Port {port} in use, trying the next candidate");
                prev = port;
            }
            Err(err) => return Err(err).context(format!("Failed to bind port {port}")),
        }
    }
    bail!("Unable to bind a listen port after {MAX_BIND_ATTEMPTS} attempts")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

fn make_span(request: &Request<Body>) -> Span {
    info_span!(
        "http.request",
        http.method = %request.method(),
        http.path = %request.uri().path(),
    )
}
