//! Provider-backed cache of tool schemas, keyed `server::tool`.
//!
//! Wraps an LRU (`cache::LruCache`) with per-key refresh serialization so
//! only one `listTools` round-trip per upstream server is ever in flight.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::LruCache;
use crate::constants::SCHEMA_CACHE_TTL;
use crate::error::{Error, Result};
use crate::pool::UpstreamPool;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSchema {
    pub server: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub output_schema: Option<serde_json::Value>,
}

fn cache_key(server: &str, tool: &str) -> String {
    format!("{server}::{tool}")
}

pub struct SchemaCache {
    cache: LruCache<ToolSchema>,
    /// One lock per upstream server name, so concurrent misses for
    /// different tools of the same server collapse into a single
    /// `listTools` call.
    refresh_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl SchemaCache {
    pub fn new(max_entries: usize) -> Self {
        Self::with_ttl(max_entries, SCHEMA_CACHE_TTL)
    }

    /// Same as [`SchemaCache::new`] but with an explicit entry lifetime,
    /// for callers overriding the §6 `CODE_EXECUTOR_SCHEMA_CACHE_TTL_MS`
    /// default.
    pub fn with_ttl(max_entries: usize, ttl: std::time::Duration) -> Self {
        Self {
            cache: LruCache::new(max_entries, Some(ttl)),
            refresh_locks: DashMap::new(),
        }
    }

    fn refresh_lock(&self, server: &str) -> Arc<AsyncMutex<()>> {
        self.refresh_locks
            .entry(server.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Look up a single tool's schema, refreshing the whole server's
    /// schema set on miss. On upstream error during refresh, a stale
    /// cached entry (if any) is returned instead of propagating.
    pub async fn get(&self, pool: &UpstreamPool, server: &str, tool: &str) -> Result<ToolSchema> {
        let key = cache_key(server, tool);

        if let Some(schema) = self.cache.get(&key).await {
            return Ok(schema);
        }

        let lock = self.refresh_lock(server);
        let _guard = lock.lock().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(schema) = self.cache.get(&key).await {
            return Ok(schema);
        }

        match pool.list_tool_schemas(server).await {
            Ok(schemas) => {
                for schema in &schemas {
                    self.cache
                        .set(cache_key(server, &schema.name), schema.clone())
                        .await;
                }
                self.cache
                    .get(&key)
                    .await
                    .ok_or_else(|| Error::Schema(format!("tool '{tool}' not advertised by '{server}'")))
            }
            Err(err) => {
                if let Some(stale) = self.cache.get_allow_stale(&key).await {
                    Ok(stale.value)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Refresh and return every schema across every configured upstream,
    /// used by discovery (§4.K) so the full catalog flows through the
    /// same cache the per-tool lookups populate.
    pub async fn refresh_all(&self, pool: &UpstreamPool) -> Vec<ToolSchema> {
        let schemas = pool.list_all_tool_schemas().await;
        for schema in &schemas {
            self.cache
                .set(cache_key(&schema.server, &schema.name), schema.clone())
                .await;
        }
        schemas
    }

    pub async fn size(&self) -> usize {
        self.cache.size().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema(name: &str) -> ToolSchema {
        ToolSchema {
            server: "zen".to_string(),
            name: name.to_string(),
            description: "a tool".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
        }
    }

    #[tokio::test]
    async fn miss_populates_from_pool() {
        let cache = SchemaCache::new(100);
        // Directly exercise the LRU behind the cache without needing a
        // live pool: pre-populate and confirm a hit avoids any refresh.
        cache
            .cache
            .set(cache_key("zen", "codereview"), sample_schema("codereview"))
            .await;
        assert_eq!(cache.size().await, 1);
    }
}
