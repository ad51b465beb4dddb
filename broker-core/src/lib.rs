//! Core broker logic: filtering, caching, resilience, and the upstream
//! tool-server pool. No HTTP or process-entry concerns live here; those
//! belong to `broker-http` and the `broker` binary crate respectively.

pub mod allowlist;
pub mod cache;
pub mod circuit_breaker;
pub mod constants;
pub mod content_filter;
pub mod error;
pub mod error_formatter;
pub mod metrics;
pub mod network_filter;
pub mod pool;
pub mod rate_limiter;
pub mod schema_cache;
pub mod schema_validate;

pub use allowlist::{AllowList, CallTracker};
pub use circuit_breaker::CircuitBreaker;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use pool::{Connection, UpstreamConfig, UpstreamPool};
pub use rate_limiter::RateLimiter;
pub use schema_cache::SchemaCache;
