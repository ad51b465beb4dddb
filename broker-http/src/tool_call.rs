//! `POST /` — the tool-invocation pipeline, per §4.L.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use broker_common::ToolId;
use broker_core::rate_limiter::{Decision, EndpointClass, LimiterConfig};
use broker_core::{content_filter, network_filter, schema_validate};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::{Error, Result};
use crate::state::AppState;

const LOCAL_CLIENT: &str = "local";

#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub params: Map<String, Value>,
}

/// Tools whose schema or name marks them as fetching a remote URL get a
/// pre-invocation SSRF check against whichever `params` field looks like
/// a target URL, per §4.L step 7.
fn url_fetcher_target(request: &ToolCallRequest) -> Option<&str> {
    if !request.tool_name.to_lowercase().contains("fetch") {
        return None;
    }
    request.params.get("url").and_then(Value::as_str)
}

pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ToolCallRequest>,
) -> Result<Json<Value>> {
    if state.is_shutting_down() {
        return Err(Error::ShuttingDown);
    }

    // 1. Rate-limit (default class).
    match state.rate_limiter.check(LOCAL_CLIENT, EndpointClass::Default).await {
        Decision::Allowed => {}
        Decision::Denied { retry_after } => {
            return Err(Error::RateLimited {
                retry_after_secs: retry_after.as_secs(),
                limit: LimiterConfig::for_class(EndpointClass::Default).max_requests,
                window_secs: LimiterConfig::for_class(EndpointClass::Default).window.as_secs(),
            });
        }
    }

    // 2. Parse toolName as ToolId.
    let tool_id = ToolId::parse(&request.tool_name)
        .map_err(|_| Error::BadRequest(format!("invalid tool id: '{}'", request.tool_name)))?;

    // 3. Allow-list check.
    state.allow_list.validate(&tool_id).map_err(Error::Core)?;

    // 4. Schema lookup + param validation.
    if let Ok(schema) = state.schema_cache.get(&state.pool, tool_id.server(), tool_id.tool()).await {
        if let Err(formatted) = schema_validate::validate(&schema.input_schema, &Value::Object(request.params.clone())) {
            return Err(Error::BadRequest(formatted.user_friendly));
        }
    }

    // 7. Pre-validate a URL-fetcher target before invoking, per step 7.
    if let Some(target) = url_fetcher_target(&request) {
        if let network_filter::Classification::Blocked(reason) = network_filter::classify_url(target) {
            return Err(Error::Forbidden(reason.message(target)));
        }
    }

    // 5+6. Circuit-breaker-guarded invocation (enforced inside the pool),
    // tracked for duration/status.
    let started = Instant::now();
    let outcome = tokio::time::timeout(state.execution_timeout, state.pool.call_tool(&tool_id, request.params)).await;
    let duration = started.elapsed();

    let result = match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(broker_core::Error::Timeout(state.execution_timeout)),
    };

    let error_message = result.as_ref().err().map(ToString::to_string);
    state.call_tracker.record(
        tool_id.clone(),
        result.is_ok(),
        duration,
        error_message,
        chrono::Utc::now().timestamp_millis() as u64,
    );

    let value = result.map_err(Error::Core)?;

    // 8. Optional content filter on returned content, reject-mode.
    let filtered = if let Value::String(text) = &value {
        match content_filter::filter(text, true) {
            Ok(clean) => Value::String(clean),
            Err(_) => {
                warn!(tool = %tool_id, "content filter rejected tool output");
                return Err(Error::Forbidden("tool output contained a blocked secret".to_string()));
            }
        }
    } else {
        value
    };

    Ok(Json(json!({ "result": filtered })))
}
