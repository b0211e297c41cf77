//! Legacy bridge v1 REST surface
//!
//! `GET /health`, `GET /tools`, `POST /tools/{name}/call`. Backed by
//! the same registry as `/mcp`, so both surfaces always serve the
//! identical tool set; the fingerprint is published on every tools
//! listing so pollers can detect changes cheaply.

use super::BridgeState;
use crate::constants::{BRIDGE_V1_MAX_BODY_BYTES, BRIDGE_V1_PROTOCOL_VERSION};
use crate::registry::executor::HostContext;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

pub fn v1_routes(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/tools", get(handle_tools))
        .route("/tools/{name}/call", post(handle_call))
        .layer(DefaultBodyLimit::max(BRIDGE_V1_MAX_BODY_BYTES))
        .with_state(state)
}

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": BRIDGE_V1_PROTOCOL_VERSION,
    }))
}

async fn handle_tools(State(state): State<Arc<BridgeState>>) -> Json<Value> {
    Json(json!({
        "tools": state.registry.list(),
        "hash": state.registry.fingerprint(),
    }))
}

/// Invoke a tool.
///
/// Transport and validation failures are 4xx with
/// `{error, message, details?}`; tool execution failures stay 200
/// with `{success: false, isError: true, content}`.
async fn handle_call(
    State(state): State<Arc<BridgeState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return validation_error("invalid_json", "Request body is not valid JSON", Some(json!(e.to_string())));
        }
    };

    if !payload.is_object() {
        return validation_error("invalid_request", "Request body must be a JSON object", None);
    }

    let arguments = match payload.get("arguments") {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return validation_error(
                "invalid_request",
                "arguments must be a JSON object",
                Some(json!({"got": type_name(other)})),
            );
        }
        None => {
            return validation_error("invalid_request", "arguments is required", None);
        }
    };

    let result = state
        .executor
        .execute(
            &name,
            arguments,
            &HostContext::default(),
            state.v1_preconditions.as_ref(),
        )
        .await;

    let body = if result.is_error {
        json!({"success": false, "isError": true, "content": result.content})
    } else {
        json!({"success": true, "content": result.content})
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn validation_error(error: &str, message: &str, details: Option<Value>) -> Response {
    let mut body = json!({"error": error, "message": message});
    if let Some(details) = details {
        body["details"] = details;
    }
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod v1_test {
    include!("v1_test.rs");
}
