//! Axum router assembly for the per-execution proxy server, per §4.J.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use rand::RngCore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::discovery::discover_tools;
use crate::health::health;
use crate::metrics_route::metrics;
use crate::state::AppState;
use crate::tool_call::call_tool;

/// 256-bit bearer token, hex-encoded, per §4.J.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn record_http_metrics(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    state.metrics.record_http_request(&method, status, &path, started.elapsed().as_secs_f64());
    response
}

/// `.layer()` calls wrap outer-to-inner in the reverse of their order here,
/// so `record_http_metrics` must be added after `require_bearer_token` to
/// stay outside it — otherwise a 401 short-circuit would never reach the
/// metrics layer and auth failures would go uncounted.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(call_tool))
        .route("/mcp/tools", get(discover_tools))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(middleware::from_fn_with_state(state.clone(), record_http_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds to an ephemeral loopback port, per §4.J.
pub async fn bind_loopback() -> std::io::Result<tokio::net::TcpListener> {
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("static address is valid");
    tokio::net::TcpListener::bind(addr).await
}

/// Serves `router` over `listener` until `shutdown` is cancelled, then
/// waits out in-flight connections (axum's own graceful-shutdown drain),
/// per §4.O steps 3-4.
pub async fn serve_with_shutdown(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: tokio_util::sync::CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
