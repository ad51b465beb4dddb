//! Bearer-token auth middleware, applied to every route per §4.J.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::Error;
use crate::state::AppState;

pub async fn require_bearer_token(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = header.and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if state.token_matches(token) => Ok(next.run(request).await),
        _ => Err(Error::Unauthorized),
    }
}
