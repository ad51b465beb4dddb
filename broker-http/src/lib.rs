//! The per-execution proxy HTTP server: auth, discovery, tool invocation,
//! health, metrics, and graceful shutdown, sitting on top of `broker-core`.

pub mod auth;
pub mod discovery;
pub mod error;
pub mod health;
pub mod metrics_route;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod tool_call;

pub use error::Error;
pub use server::{bind_loopback, build_router, generate_token, serve_with_shutdown};
pub use state::AppState;
