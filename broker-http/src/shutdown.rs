//! Graceful shutdown coordinator, per §4.O.
//!
//! Subscribes to `SIGTERM`/`SIGINT` once; signals axum's own graceful
//! drain via a `CancellationToken`, then bounds the whole drain with an
//! overall deadline. Axum's `with_graceful_shutdown` already waits out
//! in-flight connections once the listener stops accepting new ones, so
//! this module only needs to supply the signal and the outer deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::AppState;

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Waits for `SIGINT`/`SIGTERM`, marks the server as shutting down (so
/// §4.J's handlers start returning 503), and cancels `token` so axum's
/// graceful-shutdown future fires. Safe to race against an
/// already-cancelled token; both `begin_shutdown` and `token.cancel()`
/// are idempotent.
pub async fn wait_for_signal(state: Arc<AppState>, token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }

    state.begin_shutdown();
    // Step 2: audit-log a shutdown event (best effort; no audit sink wired
    // in yet, so this is a structured log line standing in for it).
    info!("shutdown event recorded");
    token.cancel();
}

/// Bounds a graceful-shutdown-aware server future (e.g. axum's
/// `serve(...).with_graceful_shutdown(...)`) with an overall drain
/// deadline, per §4.O step 4. Returns the process exit code from step 6.
pub async fn run_with_drain<F>(serve: F, drain_timeout: Duration) -> i32
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match tokio::time::timeout(drain_timeout, serve).await {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            warn!(error = %err, "listener exited with error");
            1
        }
        Err(_) => {
            warn!(timeout_secs = drain_timeout.as_secs(), "drain deadline exceeded");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_exit_yields_code_zero() {
        let serve = async { Ok::<(), std::io::Error>(()) };
        let code = run_with_drain(serve, Duration::from_millis(50)).await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn listener_error_yields_exit_code_one() {
        let serve = async { Err::<(), _>(std::io::Error::other("boom")) };
        let code = run_with_drain(serve, Duration::from_millis(50)).await;
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn exceeding_drain_deadline_yields_exit_code_one() {
        let serve = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), std::io::Error>(())
        };
        let code = run_with_drain(serve, Duration::from_millis(20)).await;
        assert_eq!(code, 1);
    }
}
