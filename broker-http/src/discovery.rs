//! `GET /mcp/tools?q=<kw>&q=<kw>` — tool discovery, per §4.K.

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::response::Json;
use broker_core::constants::{DISCOVERY_DEADLINE, DISCOVERY_QUERY_MAX_LEN, RATE_LIMIT_WINDOW};
use broker_core::rate_limiter::{Decision, EndpointClass};
use serde_json::{Value, json};
use tracing::info;

use crate::error::{Error, Result};
use crate::state::AppState;

const LOCAL_CLIENT: &str = "local";

fn parse_keywords(raw_query: Option<&str>) -> std::result::Result<Vec<String>, String> {
    let Some(raw_query) = raw_query else {
        return Ok(Vec::new());
    };

    let mut keywords = Vec::new();
    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
        if key != "q" {
            continue;
        }
        if value.len() > DISCOVERY_QUERY_MAX_LEN {
            return Err(value.to_string());
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-') {
            return Err(value.to_string());
        }
        keywords.push(value.to_lowercase());
    }
    Ok(keywords)
}

fn matches_keywords(schema: &broker_core::schema_cache::ToolSchema, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let haystack = format!("{} {}", schema.name, schema.description).to_lowercase();
    keywords.iter().any(|kw| haystack.contains(kw.as_str()))
}

pub async fn discover_tools(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Value>> {
    if state.is_shutting_down() {
        return Err(Error::ShuttingDown);
    }

    let keywords = parse_keywords(raw_query.as_deref()).map_err(|bad_query| Error::InvalidQuery {
        message: format!("invalid query keyword: '{bad_query}'"),
        query: bad_query,
    })?;

    match state.rate_limiter.check(LOCAL_CLIENT, EndpointClass::Discovery).await {
        Decision::Allowed => {}
        Decision::Denied { retry_after } => {
            return Err(Error::RateLimited {
                retry_after_secs: retry_after.as_secs(),
                limit: broker_core::rate_limiter::LimiterConfig::for_class(EndpointClass::Discovery)
                    .max_requests,
                window_secs: RATE_LIMIT_WINDOW.as_secs(),
            });
        }
    }

    let schemas = tokio::time::timeout(DISCOVERY_DEADLINE, state.schema_cache.refresh_all(&state.pool))
        .await
        .map_err(|_| Error::Timeout(DISCOVERY_DEADLINE.as_millis() as u64))?;

    let filtered: Vec<&broker_core::schema_cache::ToolSchema> =
        schemas.iter().filter(|schema| matches_keywords(schema, &keywords)).collect();

    info!(keyword_count = keywords.len(), result_count = filtered.len(), "discovery request served");

    Ok(Json(json!({ "tools": filtered })))
}
