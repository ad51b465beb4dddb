//! Command-line interface and process composition root, per §6/§10.3.
//!
//! `Cli::parse()` plus `clap`'s `env` attribute: a thin `main` delegates
//! here, `run()` does all the sequencing (config → pool → schema cache →
//! router → serve → drain → exit code).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use broker_core::rate_limiter::{EndpointClass, LimiterConfig};
use broker_core::{AllowList, RateLimiter, SchemaCache, UpstreamPool};
use broker_common::ToolId;
use broker_http::AppState;

use crate::config;
use crate::docker;
use crate::logging;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Sandboxed code-execution broker proxy")]
pub struct Cli {
    /// Path to the project-local `mcp.json`-style config file.
    #[arg(long, env = "MCP_CONFIG_PATH", default_value = "mcp.json")]
    pub mcp_config: PathBuf,

    /// Additional tool-local config files, applied in order after
    /// `mcp_config` (later overrides earlier by server name).
    #[arg(long = "tool-config")]
    pub tool_configs: Vec<PathBuf>,

    /// Colon-separated list of project roots this execution may touch.
    /// Empty/unset means no restriction.
    #[arg(long, env = "ALLOWED_PROJECTS", value_delimiter = ':')]
    pub allowed_projects: Vec<PathBuf>,

    /// Tool ids this execution's sandbox may invoke, e.g.
    /// `mcp__zen__codereview`.
    #[arg(long = "allowed-tool")]
    pub allowed_tools: Vec<String>,

    #[arg(long, env = "ENABLE_AUDIT_LOG", default_value_t = false)]
    pub enable_audit_log: bool,

    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,

    #[arg(long, env = "CODE_EXECUTOR_TIMEOUT_MS", default_value_t = 120_000)]
    pub execution_timeout_ms: u64,

    #[arg(long, env = "CODE_EXECUTOR_SCHEMA_CACHE_TTL_MS", default_value_t = 86_400_000)]
    pub schema_cache_ttl_ms: u64,

    #[arg(long, env = "CODE_EXECUTOR_RATE_LIMIT_RPM", default_value_t = 60)]
    pub rate_limit_rpm: u32,

    #[arg(long, env = "CIRCUIT_BREAKER_THRESHOLD", default_value_t = 5)]
    pub circuit_breaker_threshold: u32,

    #[arg(long, env = "CIRCUIT_BREAKER_TIMEOUT_MS", default_value_t = 30_000)]
    pub circuit_breaker_timeout_ms: u64,

    #[arg(long, env = "DOCKER_CONTAINER")]
    pub docker_container: Option<String>,

    #[arg(long, default_value_t = false)]
    pub debug: bool,

    #[arg(long, default_value_t = false)]
    pub log_to_stderr: bool,

    /// Overall deadline for draining in-flight requests on shutdown.
    #[arg(long, default_value_t = 30_000)]
    pub drain_timeout_ms: u64,
}

pub async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    logging::init(log_level, !cli.log_to_stderr);

    let bridge_host = docker::bridge_host(cli.docker_container.as_deref());
    tracing::info!(bridge_host, "starting broker");
    tracing::debug!(
        allowed_projects = ?cli.allowed_projects,
        enable_audit_log = cli.enable_audit_log,
        audit_log_path = ?cli.audit_log_path,
        "sandbox-facing configuration (consumed by the sandbox runner collaborator)",
    );

    let mut config_paths = vec![cli.mcp_config.clone()];
    config_paths.extend(cli.tool_configs.iter().cloned());
    let upstream_configs = config::load_configs(&config_paths)
        .with_context(|| "failed to load mcp server configuration")?;

    if upstream_configs.is_empty() {
        tracing::warn!("no upstream servers configured; the pool will be empty");
    }

    let pool = Arc::new(UpstreamPool::with_breaker_params(
        upstream_configs.into_values(),
        cli.circuit_breaker_threshold,
        Duration::from_millis(cli.circuit_breaker_timeout_ms),
    ));

    let schema_cache = Arc::new(SchemaCache::with_ttl(
        1024,
        Duration::from_millis(cli.schema_cache_ttl_ms),
    ));

    let allow_list = AllowList::new(parse_allowed_tools(&cli.allowed_tools));

    let rate_limiter = RateLimiter::with_configs(
        LimiterConfig { max_requests: cli.rate_limit_rpm, window: Duration::from_secs(60) },
        LimiterConfig::for_class(EndpointClass::Discovery),
    );

    let token = broker_http::generate_token();
    let state = Arc::new(
        AppState::with_rate_limiter(token.clone(), pool, schema_cache, allow_list, rate_limiter)
            .with_execution_timeout(Duration::from_millis(cli.execution_timeout_ms)),
    );

    let router = broker_http::build_router(state.clone());
    let listener = broker_http::bind_loopback().await.context("failed to bind loopback listener")?;
    let addr = listener.local_addr().context("failed to read bound address")?;

    tracing::info!(%addr, "proxy listening, bearer token generated");
    eprintln!("BROKER_PROXY_URL=http://{bridge_host}:{}/", addr.port());
    eprintln!("BROKER_PROXY_TOKEN={token}");

    let shutdown_token = tokio_util::sync::CancellationToken::new();
    let signal_task = tokio::spawn(broker_http::shutdown::wait_for_signal(
        state.clone(),
        shutdown_token.clone(),
    ));

    let serve = broker_http::serve_with_shutdown(listener, router, shutdown_token.clone());

    let exit_code = broker_http::shutdown::run_with_drain(
        serve,
        Duration::from_millis(cli.drain_timeout_ms),
    )
    .await;

    signal_task.abort();
    Ok(exit_code)
}

fn parse_allowed_tools(raw: &[String]) -> Vec<ToolId> {
    raw.iter()
        .filter_map(|s| match ToolId::parse(s) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(tool = %s, error = %e, "ignoring malformed --allowed-tool entry");
                None
            }
        })
        .collect()
}
