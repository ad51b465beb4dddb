//! Upstream client pool: launches subordinate tool servers over a framed
//! stdio transport and keeps one reusable `rmcp` client per server.
//!
//! Each connection spawns via `TokioChildProcess` and hands off to
//! `ServiceExt::serve`; the pool itself is keyed by server name with a
//! lazily-established connection behind a per-slot async lock.

use dashmap::DashMap;
use futures::future::{BoxFuture, join_all};
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParams;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use broker_common::ToolId;

use crate::circuit_breaker::CircuitBreaker;
use crate::constants::CIRCUIT_BREAKER_CALL_TIMEOUT;
use crate::error::{Error, Result};
use crate::schema_cache::ToolSchema;

/// A single entry from the `{mcpServers: {...}}` document.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// A live upstream client session. Constructible outside this module so
/// callers can inject a connector backed by something other than
/// [`UpstreamPool::connect`]'s subprocess transport (e.g. an in-process
/// duplex-backed `rmcp` server in tests).
pub struct Connection {
    service: RunningService<RoleClient, ()>,
}

impl Connection {
    pub fn new(service: RunningService<RoleClient, ()>) -> Self {
        Self { service }
    }
}

/// Builds a fresh [`Connection`] for a slot. Production pools use
/// [`UpstreamPool::connect`]'s subprocess transport; [`UpstreamPool::with_connector`]
/// lets callers substitute a connector that hands back a different kind of
/// live connection, so the retry and circuit-breaker paths in
/// [`UpstreamPool::call_tool`] can be exercised without a real subprocess.
type Connector = Arc<dyn Fn(UpstreamConfig) -> BoxFuture<'static, Result<Connection>> + Send + Sync>;

struct Slot {
    config: UpstreamConfig,
    connection: AsyncMutex<Option<Connection>>,
    breaker: CircuitBreaker,
}

/// Pool of upstream tool-server connections, one entry per configured
/// server name. Connections are established lazily on first use.
pub struct UpstreamPool {
    slots: DashMap<String, Arc<Slot>>,
    connector: Connector,
}

impl UpstreamPool {
    pub fn new(configs: impl IntoIterator<Item = UpstreamConfig>) -> Self {
        Self::with_breaker_params(
            configs,
            crate::constants::CIRCUIT_BREAKER_FAILURE_THRESHOLD,
            crate::constants::CIRCUIT_BREAKER_COOLDOWN,
        )
    }

    /// Same as [`UpstreamPool::new`] but every slot's breaker uses the
    /// given `failureThreshold`/`cooldownMs`, for callers overriding the
    /// §6 `CIRCUIT_BREAKER_THRESHOLD`/`CIRCUIT_BREAKER_TIMEOUT_MS` defaults.
    pub fn with_breaker_params(
        configs: impl IntoIterator<Item = UpstreamConfig>,
        failure_threshold: u32,
        cooldown: std::time::Duration,
    ) -> Self {
        Self::build(
            configs,
            failure_threshold,
            cooldown,
            Arc::new(|config: UpstreamConfig| -> BoxFuture<'static, Result<Connection>> {
                Box::pin(async move { Self::connect(&config).await })
            }),
        )
    }

    /// Same as [`UpstreamPool::with_breaker_params`] but with a
    /// caller-supplied connector in place of the subprocess transport.
    pub fn with_connector<F, Fut>(
        configs: impl IntoIterator<Item = UpstreamConfig>,
        failure_threshold: u32,
        cooldown: std::time::Duration,
        connector: F,
    ) -> Self
    where
        F: Fn(UpstreamConfig) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Connection>> + Send + 'static,
    {
        Self::build(
            configs,
            failure_threshold,
            cooldown,
            Arc::new(move |config: UpstreamConfig| -> BoxFuture<'static, Result<Connection>> {
                Box::pin(connector(config))
            }),
        )
    }

    fn build(
        configs: impl IntoIterator<Item = UpstreamConfig>,
        failure_threshold: u32,
        cooldown: std::time::Duration,
        connector: Connector,
    ) -> Self {
        let slots = DashMap::new();
        for config in configs {
            let breaker = CircuitBreaker::with_params(config.name.clone(), failure_threshold, cooldown);
            slots.insert(
                config.name.clone(),
                Arc::new(Slot {
                    config,
                    connection: AsyncMutex::new(None),
                    breaker,
                }),
            );
        }
        Self { slots, connector }
    }

    fn slot(&self, server: &str) -> Result<Arc<Slot>> {
        self.slots
            .get(server)
            .map(|s| s.clone())
            .ok_or_else(|| Error::UnknownServer(server.to_string()))
    }

    async fn connect(config: &UpstreamConfig) -> Result<Connection> {
        info!(server = %config.name, command = %config.command, "spawning upstream tool server");

        let args = config.args.clone();
        let env = config.env.clone();
        let transport = TokioChildProcess::new(tokio::process::Command::new(&config.command).configure(
            |cmd| {
                cmd.args(&args);
                for (key, value) in &env {
                    cmd.env(key, value);
                }
            },
        ))
        .map_err(|e| Error::Transport(e.to_string()))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Connection { service })
    }

    /// Ensure the named upstream has a live connection, reconnecting if
    /// none is held yet. Returns a locked guard so the caller can issue a
    /// request without racing a concurrent reconnect.
    async fn ensure_connected<'a>(
        &self,
        slot: &'a Slot,
    ) -> Result<tokio::sync::MappedMutexGuard<'a, Connection>> {
        let mut guard = slot.connection.lock().await;
        if guard.is_none() {
            let connection = (self.connector)(slot.config.clone()).await?;
            *guard = Some(connection);
        }
        Ok(tokio::sync::MutexGuard::map(guard, |c| {
            c.as_mut().expect("just connected above")
        }))
    }

    /// Union of tool names across upstreams that are *currently*
    /// connected. Does not trigger new connections, so it is safe to call
    /// from the health handler without side effects.
    pub async fn list_connected_tool_ids(&self) -> Vec<ToolId> {
        let mut ids = Vec::new();
        for entry in self.slots.iter() {
            let slot = entry.value().clone();
            let guard = slot.connection.lock().await;
            let Some(connection) = guard.as_ref() else {
                continue;
            };
            if let Ok(tools) = connection.service.list_all_tools().await {
                ids.extend(
                    tools
                        .into_iter()
                        .map(|t| ToolId::new(slot.config.name.clone(), t.name.to_string())),
                );
            }
        }
        ids
    }

    pub fn connected_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .connection
                    .try_lock()
                    .map(|g| g.is_some())
                    .unwrap_or(true)
            })
            .count()
    }

    /// List every tool schema advertised by a single server, connecting
    /// on demand.
    pub async fn list_tool_schemas(&self, server: &str) -> Result<Vec<ToolSchema>> {
        let slot = self.slot(server)?;
        let connection = self.ensure_connected(&slot).await?;
        let tools = connection
            .service
            .list_all_tools()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(tools
            .into_iter()
            .map(|tool| ToolSchema {
                server: slot.config.name.clone(),
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
                input_schema: Value::Object(tool.input_schema.as_ref().clone()),
                output_schema: tool
                    .output_schema
                    .as_ref()
                    .map(|s| Value::Object(s.as_ref().clone())),
            })
            .collect())
    }

    /// Query all configured upstreams in parallel; a failed upstream
    /// contributes no tools and does not fail the aggregate (resilient
    /// aggregation).
    pub async fn list_all_tool_schemas(&self) -> Vec<ToolSchema> {
        let servers: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        let futures = servers.into_iter().map(|server| async move {
            match self.list_tool_schemas(&server).await {
                Ok(schemas) => schemas,
                Err(err) => {
                    warn!(server = %server, error = %err, "upstream failed to list tools, skipping");
                    Vec::new()
                }
            }
        });
        join_all(futures).await.into_iter().flatten().collect()
    }

    /// Invoke a tool, guarded by the upstream's circuit breaker. On a
    /// transport error the connection is dropped and one reconnect+retry
    /// is attempted before giving up, independent of the breaker's own
    /// half-open probing (§9).
    pub async fn call_tool(&self, tool_id: &ToolId, params: Map<String, Value>) -> Result<Value> {
        let slot = self.slot(tool_id.server())?;
        let tool_name = tool_id.tool().to_string();

        slot.breaker
            .guard(CIRCUIT_BREAKER_CALL_TIMEOUT, || async {
                match self.call_once(&slot, &tool_name, params.clone()).await {
                    Ok(value) => Ok(value),
                    Err(Error::Transport(_)) => {
                        warn!(server = %slot.config.name, "transport error calling upstream, retrying once");
                        *slot.connection.lock().await = None;
                        self.call_once(&slot, &tool_name, params).await
                    }
                    Err(other) => Err(other),
                }
            })
            .await
    }

    async fn call_once(&self, slot: &Slot, tool_name: &str, params: Map<String, Value>) -> Result<Value> {
        let connection = self.ensure_connected(slot).await?;
        let request = CallToolRequestParams {
            name: tool_name.to_string().into(),
            arguments: Some(params),
            task: None,
            meta: None,
        };
        let result = connection
            .service
            .call_tool(request)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let text = result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            return Err(Error::Transport(text));
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Close all client transports. Each `RunningService` cancels its
    /// subprocess transport when dropped.
    pub async fn cleanup(&self) {
        for entry in self.slots.iter() {
            *entry.value().connection.lock().await = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::ErrorData;
    use rmcp::ServerHandler;
    use rmcp::model::{CallToolResult, Content};
    use rmcp::service::{RequestContext, RoleServer};
    use rmcp::transport::async_rw::AsyncRwTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn unknown_server_is_rejected() {
        let pool = UpstreamPool::new(Vec::new());
        let result = pool.list_tool_schemas("ghost").await;
        assert!(matches!(result, Err(Error::UnknownServer(_))));
    }

    #[tokio::test]
    async fn connected_count_starts_at_zero() {
        let pool = UpstreamPool::new(vec![UpstreamConfig {
            name: "zen".into(),
            command: "true".into(),
            args: Vec::new(),
            env: HashMap::new(),
        }]);
        assert_eq!(pool.connected_count(), 0);
    }

    /// In-process upstream: calls numbered below `fail_first_n` (counted
    /// cumulatively across reconnects) fail with a protocol error; every
    /// later call echoes its arguments back as the result text.
    #[derive(Clone)]
    struct FakeUpstream {
        call_count: Arc<AtomicUsize>,
        fail_first_n: usize,
    }

    impl ServerHandler for FakeUpstream {
        fn call_tool(
            &self,
            request: CallToolRequestParams,
            _context: RequestContext<RoleServer>,
        ) -> impl std::future::Future<Output = std::result::Result<CallToolResult, ErrorData>> + Send + '_ {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            let fail_first_n = self.fail_first_n;
            async move {
                if count < fail_first_n {
                    return Err(ErrorData::internal_error("simulated upstream failure", None));
                }
                let echoed = Value::Object(request.arguments.unwrap_or_default());
                Ok(CallToolResult {
                    content: vec![Content::text(echoed.to_string())],
                    is_error: Some(false),
                    structured_content: None,
                    meta: None,
                })
            }
        }
    }

    /// A connector that hands out a fresh in-process duplex-backed
    /// `FakeUpstream` connection on every (re)connect, sharing one call
    /// counter across reconnects so `fail_first_n` counts total attempts.
    fn fake_connector(
        call_count: Arc<AtomicUsize>,
        fail_first_n: usize,
    ) -> impl Fn(UpstreamConfig) -> BoxFuture<'static, Result<Connection>> + Send + Sync + 'static {
        move |_config: UpstreamConfig| -> BoxFuture<'static, Result<Connection>> {
            let call_count = call_count.clone();
            Box::pin(async move {
                let (client_stream, server_stream) = tokio::io::duplex(4096);
                let (client_read, client_write) = tokio::io::split(client_stream);
                let (server_read, server_write) = tokio::io::split(server_stream);

                let client_transport = AsyncRwTransport::new_client(client_read, client_write);
                let server_transport = AsyncRwTransport::new_server(server_read, server_write);

                let upstream = FakeUpstream { call_count, fail_first_n };
                tokio::spawn(async move {
                    if let Ok(service) = upstream.serve(server_transport).await {
                        let _ = service.waiting().await;
                    }
                });

                let service =
                    ().serve(client_transport).await.map_err(|e| Error::Transport(e.to_string()))?;
                Ok(Connection::new(service))
            })
        }
    }

    fn pool_with_fake(fail_first_n: usize, failure_threshold: u32) -> UpstreamPool {
        UpstreamPool::with_connector(
            vec![UpstreamConfig {
                name: "fake".into(),
                command: "unused".into(),
                args: Vec::new(),
                env: HashMap::new(),
            }],
            failure_threshold,
            Duration::from_secs(60),
            fake_connector(Arc::new(AtomicUsize::new(0)), fail_first_n),
        )
    }

    #[tokio::test]
    async fn call_tool_success_path_round_trips_through_a_live_connection() {
        let pool = pool_with_fake(0, 5);
        let result = pool.call_tool(&ToolId::new("fake", "echo"), Map::new()).await.unwrap();
        assert_eq!(result, Value::Object(Map::new()));
    }

    #[tokio::test]
    async fn transport_error_triggers_one_retry_then_succeeds() {
        let pool = pool_with_fake(1, 5);
        let result = pool.call_tool(&ToolId::new("fake", "echo"), Map::new()).await;
        assert!(result.is_ok(), "a single failed attempt should be absorbed by the retry-once path");
    }

    #[tokio::test]
    async fn repeated_call_failures_open_the_circuit_breaker() {
        let pool = pool_with_fake(100, 2);
        for _ in 0..2 {
            let _ = pool.call_tool(&ToolId::new("fake", "echo"), Map::new()).await;
        }
        let result = pool.call_tool(&ToolId::new("fake", "echo"), Map::new()).await;
        assert!(matches!(result, Err(Error::CircuitOpen { .. })));
    }
}
