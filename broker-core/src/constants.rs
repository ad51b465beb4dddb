//! Default timeouts, thresholds, and bucket boundaries for the broker core.
//!
//! Centralized here so every module (and the composition root, which may
//! override them from configuration) reads the same defaults §4/§6
//! assign.

use std::time::Duration;

/// §4.F default consecutive-failure threshold before a breaker opens.
pub const CIRCUIT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
/// §4.F default cooldown before an open breaker allows a half-open probe.
pub const CIRCUIT_BREAKER_COOLDOWN: Duration = Duration::from_secs(30);
/// §4.F default per-call timeout treated as a failure when exceeded.
pub const CIRCUIT_BREAKER_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// §4.G default requests-per-window for the `default` endpoint class.
pub const RATE_LIMIT_DEFAULT_MAX: u32 = 30;
/// §4.G override for the `discovery` endpoint class.
pub const RATE_LIMIT_DISCOVERY_MAX: u32 = 60;
/// §4.G default sliding window for both classes.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// §4.E default schema-cache entry lifetime.
pub const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// §4.K discovery handler's hard deadline against the upstream pool.
pub const DISCOVERY_DEADLINE: Duration = Duration::from_millis(500);
/// §6 default end-to-end execution timeout.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_millis(120_000);

/// §4.K discovery query parameter length limit.
pub const DISCOVERY_QUERY_MAX_LEN: usize = 100;
