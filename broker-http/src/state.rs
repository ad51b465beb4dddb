//! Shared state handed to every axum handler via `State<Arc<AppState>>`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use broker_core::constants::DEFAULT_EXECUTION_TIMEOUT;
use broker_core::{AllowList, CallTracker, Metrics, RateLimiter, SchemaCache, UpstreamPool};

/// Everything a handler needs to serve a request. One instance per proxy
/// server instance (per sandboxed execution, per §5's ownership model).
pub struct AppState {
    pub token: String,
    pub pool: Arc<UpstreamPool>,
    pub schema_cache: Arc<SchemaCache>,
    pub allow_list: AllowList,
    pub rate_limiter: RateLimiter,
    pub call_tracker: CallTracker,
    pub metrics: Metrics,
    pub execution_timeout: Duration,
    pub shutting_down: AtomicBool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        token: String,
        pool: Arc<UpstreamPool>,
        schema_cache: Arc<SchemaCache>,
        allow_list: AllowList,
    ) -> Self {
        Self::with_rate_limiter(token, pool, schema_cache, allow_list, RateLimiter::new())
    }

    /// Same as [`AppState::new`] but with a pre-built rate limiter, for
    /// the composition root overriding §6's `CODE_EXECUTOR_RATE_LIMIT_RPM`
    /// default.
    pub fn with_rate_limiter(
        token: String,
        pool: Arc<UpstreamPool>,
        schema_cache: Arc<SchemaCache>,
        allow_list: AllowList,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            token,
            pool,
            schema_cache,
            allow_list,
            rate_limiter,
            call_tracker: CallTracker::new(),
            metrics: Metrics::new(),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            shutting_down: AtomicBool::new(false),
            started_at: Instant::now(),
        }
    }

    /// Overrides the per-tool-call deadline enforced in §4.L step 5/6,
    /// for the composition root threading §6's `CODE_EXECUTOR_TIMEOUT_MS`.
    pub fn with_execution_timeout(mut self, execution_timeout: Duration) -> Self {
        self.execution_timeout = execution_timeout;
        self
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Constant-time bearer-token comparison, per §4.J.
    pub fn token_matches(&self, candidate: &str) -> bool {
        use subtle::ConstantTimeEq;
        self.token.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}
