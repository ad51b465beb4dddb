//! HTTP-facing error type. Wraps `broker_core::Error` plus request-shape
//! errors that only make sense at this layer (bad auth, malformed body),
//! and maps each variant to the status/body shape §6 specifies.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid authorization")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    InvalidQuery { message: String, query: String },
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Core(#[from] broker_core::Error),
    #[error("rate limited")]
    RateLimited {
        retry_after_secs: u64,
        limit: u32,
        window_secs: u64,
    },
    #[error("request timeout after {0}ms")]
    Timeout(u64),
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({"error": "Auth token invalid"}))).into_response()
            }
            Error::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
            }
            Error::InvalidQuery { message, query } => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": message, "query": query})),
            )
                .into_response(),
            Error::Forbidden(message) => {
                (StatusCode::FORBIDDEN, Json(json!({"error": message}))).into_response()
            }
            Error::Core(err @ broker_core::Error::CircuitOpen { retry_after_secs, .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": err.to_string(),
                    "retryAfter": retry_after_secs,
                })),
            )
                .into_response(),
            Error::Core(err @ broker_core::Error::NotAllowlisted(_)) => {
                (StatusCode::FORBIDDEN, Json(json!({"error": err.to_string()}))).into_response()
            }
            Error::Core(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()}))).into_response()
            }
            Error::RateLimited {
                retry_after_secs,
                limit,
                window_secs,
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "Rate limit exceeded",
                        "retryAfter": retry_after_secs,
                        "limit": limit,
                        "window": window_secs,
                    })),
                )
                    .into_response();
                response.headers_mut().insert(
                    axum::http::header::RETRY_AFTER,
                    axum::http::HeaderValue::from_str(&retry_after_secs.to_string())
                        .expect("integer formats as a valid header value"),
                );
                response
            }
            Error::Timeout(ms) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Request timeout after {ms}ms")})),
            )
                .into_response(),
            Error::ShuttingDown => {
                let mut response = (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"error": "Server is shutting down, please retry your request"})),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, axum::http::HeaderValue::from_static("1"));
                response
            }
            Error::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": message}))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn circuit_open_renders_the_exact_spec_message() {
        let error = Error::Core(broker_core::Error::CircuitOpen {
            server: "zen".to_string(),
            retry_after_secs: 30,
        });
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            "Circuit breaker is open for server 'zen'. Retry after 30s"
        );
        assert_eq!(body["retryAfter"], 30);
    }
}
