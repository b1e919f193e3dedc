//! API request handlers.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use super::ApiState;
use crate::policy::{Operation, Params, PolicyResponse};

/// Header carrying the shared secret.
pub const TOKEN_HEADER: &str = "x-dynfw-token";

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn index_handler() -> impl IntoResponse {
    Json(json!({"dynamic_firewall": "IPFW dynamic firewall"}))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET on a mutating endpoint: tell the caller how to use it.
pub(super) async fn usage_handler(
    op: Operation,
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = check_token(&state, &headers) {
        return denied;
    }
    Json(json!({"usage": op.usage()})).into_response()
}

/// POST on a mutating endpoint. A body that is not a valid form counts as
/// empty and ends up as a malformed request.
pub(super) async fn mutate_handler(
    op: Operation,
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    form: Option<Form<Params>>,
) -> Response {
    if let Some(denied) = check_token(&state, &headers) {
        return denied;
    }
    let params = form.map(|Form(p)| p).unwrap_or_default();
    Json(run_operation(state, op, params).await).into_response()
}

/// GET on a listing endpoint, parameters from the query string.
pub(super) async fn list_handler(
    op: Operation,
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    query: Option<Query<Params>>,
) -> Response {
    if let Some(denied) = check_token(&state, &headers) {
        return denied;
    }
    let params = query.map(|Query(p)| p).unwrap_or_default();
    Json(run_operation(state, op, params).await).into_response()
}

/// Engine commands block; keep them off the async workers.
async fn run_operation(state: Arc<ApiState>, op: Operation, params: Params) -> PolicyResponse {
    match tokio::task::spawn_blocking(move || state.engine().dispatch(op, &params)).await {
        Ok(response) => response,
        Err(e) => {
            error!("{} aborted: {}", op, e);
            PolicyResponse::failed()
        }
    }
}

fn check_token(state: &ApiState, headers: &HeaderMap) -> Option<Response> {
    let expected = state.shared_secret()?;
    let provided = headers.get(TOKEN_HEADER).map(|v| v.as_bytes());

    if provided.map_or(false, |p| constant_time_eq(p, expected.as_bytes())) {
        None
    } else {
        warn!("Rejected request without a valid {} header", TOKEN_HEADER);
        Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"result": "unauthorized"})),
            )
                .into_response(),
        )
    }
}

/// Byte comparison whose running time does not depend on where the inputs
/// differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"s3cret", b"s3crex"));
        assert!(!constant_time_eq(b"s3cret", b"s3cret!"));
        assert!(!constant_time_eq(b"", b"s3cret"));
    }
}
