//! `GET /health` — always 200, per §4.M.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let connected = state.pool.connected_count();
    let schema_cache_size = state.schema_cache.size().await;
    let uptime_ms = state.started_at.elapsed().as_millis() as u64;

    Json(json!({
        "healthy": connected > 0,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": uptime_ms,
        "mcpClients": {"connected": connected},
        "schemaCache": {"size": schema_cache_size},
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::{AllowList, SchemaCache, UpstreamPool};

    #[tokio::test]
    async fn reports_unhealthy_with_no_connections() {
        let state = Arc::new(AppState::new(
            "token".to_string(),
            Arc::new(UpstreamPool::new(Vec::new())),
            Arc::new(SchemaCache::new(10)),
            AllowList::new(Vec::new()),
        ));
        let Json(body) = health(State(state)).await;
        assert_eq!(body["healthy"], false);
        assert_eq!(body["mcpClients"]["connected"], 0);
    }
}
