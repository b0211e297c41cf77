//! Streamable HTTP transport
//!
//! One `/mcp` endpoint per tier: POST carries JSON-RPC requests, GET
//! opens the SSE stream for server-initiated notifications, DELETE
//! tears the session down. The first `initialize` without a session
//! header creates the session and returns its id in `MCP-Session-Id`.

use crate::constants::{
    JSONRPC_INVALID_REQUEST, JSONRPC_PARSE_ERROR, JSONRPC_VERSION, MCP_PROTOCOL_HEADER,
    MCP_SESSION_HEADER, SSE_KEEP_ALIVE_SECS,
};
use crate::mcp::protocol::{
    InitializeParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, default_protocol_version,
    initialize_result,
};
use crate::mcp::server::McpServerCore;
use crate::mcp::session::SessionUser;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::post,
};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on `/mcp` request bodies; the v1 surface carries its
/// own tighter limit.
const MAX_MCP_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Build the `/mcp` routes over a server core
pub fn mcp_routes(core: Arc<McpServerCore>) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(core)
}

async fn handle_post(State(core): State<Arc<McpServerCore>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let headers = parts.headers;
    let user = parts
        .extensions
        .get::<SessionUser>()
        .map(|SessionUser(user_id)| user_id.clone());

    let body = match axum::body::to_bytes(body, MAX_MCP_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => {
            return rpc_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                Value::Null,
                JsonRpcError::new(JSONRPC_INVALID_REQUEST, "Request body too large"),
            );
        }
    };

    let wants_sse = accepts_event_stream(&headers);

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                Value::Null,
                JsonRpcError::new(
                    JSONRPC_PARSE_ERROR,
                    format!("Invalid JSON-RPC request: {}", e),
                ),
            );
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            request.id.unwrap_or(Value::Null),
            JsonRpcError::new(JSONRPC_INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        );
    }

    match session_header(&headers) {
        None => {
            if request.method != "initialize" {
                return rpc_error(
                    StatusCode::BAD_REQUEST,
                    request.id.unwrap_or(Value::Null),
                    JsonRpcError::session_error("Missing MCP-Session-Id header"),
                );
            }
            handle_initialize(&core, &headers, user, request, wants_sse)
        }
        Some(session_id) => {
            let Some(session) = core.sessions.get(&session_id) else {
                return rpc_error(
                    core.unknown_session_status(),
                    request.id.unwrap_or(Value::Null),
                    JsonRpcError::session_error("Unknown session id"),
                );
            };

            // Serialise handling within the session so responses come
            // back in the order requests were accepted.
            let _guard = session.serialize.lock().await;

            if request.is_notification() {
                tracing::debug!(session = %session.id, method = %request.method, "client notification");
                return StatusCode::ACCEPTED.into_response();
            }

            let response = core.dispatch(&session, request).await;
            rpc_response(wants_sse, &response)
        }
    }
}

/// The session creator: allocate the session, echo the protocol
/// version, answer with the session id header.
fn handle_initialize(
    core: &McpServerCore,
    headers: &HeaderMap,
    user: Option<String>,
    request: JsonRpcRequest,
    wants_sse: bool,
) -> Response {
    let params: InitializeParams = request
        .params
        .and_then(|p| serde_json::from_value(p).ok())
        .unwrap_or_default();

    let protocol_version = params
        .protocol_version
        .or_else(|| {
            headers
                .get(MCP_PROTOCOL_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        })
        .unwrap_or_else(|| default_protocol_version().to_string());

    let session = core.sessions.create(user);
    session.set_protocol_version(&protocol_version);
    tracing::info!(session = %session.id, user = ?session.user_id, "MCP session initialized");

    let result = initialize_result(core.identity(), &protocol_version);
    let response = JsonRpcResponse::success(request.id.unwrap_or(Value::Null), result);

    let mut http_response = rpc_response(wants_sse, &response);
    if let Ok(value) = HeaderValue::from_str(&session.id) {
        http_response
            .headers_mut()
            .insert(MCP_SESSION_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&protocol_version) {
        http_response
            .headers_mut()
            .insert(MCP_PROTOCOL_HEADER, value);
    }
    http_response
}

async fn handle_get(State(core): State<Arc<McpServerCore>>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            Value::Null,
            JsonRpcError::session_error("Missing MCP-Session-Id header"),
        );
    };

    let Some(session) = core.sessions.get(&session_id) else {
        return rpc_error(
            core.unknown_session_status(),
            Value::Null,
            JsonRpcError::session_error("Unknown session id"),
        );
    };

    let Some(receiver) = session.take_event_stream() else {
        return rpc_error(
            StatusCode::CONFLICT,
            Value::Null,
            JsonRpcError::session_error("SSE stream already open for session"),
        );
    };

    let stream = futures::stream::unfold(receiver, |mut rx| async move {
        let notification = rx.recv().await?;
        let data = serde_json::to_string(&notification).ok()?;
        Some((
            Ok::<Event, Infallible>(Event::default().event("message").data(data)),
            rx,
        ))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS)))
        .into_response()
}

async fn handle_delete(State(core): State<Arc<McpServerCore>>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            Value::Null,
            JsonRpcError::session_error("Missing MCP-Session-Id header"),
        );
    };

    if core.close_session(&session_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        rpc_error(
            core.unknown_session_status(),
            Value::Null,
            JsonRpcError::session_error("Unknown session id"),
        )
    }
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// A single JSON-RPC response, framed per the client's `Accept`:
/// plain JSON by default, a one-frame SSE stream when asked for.
fn rpc_response(wants_sse: bool, response: &JsonRpcResponse) -> Response {
    if wants_sse {
        let data = match serde_json::to_string(response) {
            Ok(data) => data,
            Err(e) => {
                return rpc_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Value::Null,
                    JsonRpcError::session_error(format!("Unencodable response: {}", e)),
                );
            }
        };
        let stream = futures::stream::iter(vec![Ok::<Event, Infallible>(
            Event::default().event("message").data(data),
        )]);
        Sse::new(stream).into_response()
    } else {
        (StatusCode::OK, Json(response)).into_response()
    }
}

fn rpc_error(status: StatusCode, id: Value, error: JsonRpcError) -> Response {
    (status, Json(JsonRpcResponse::error(id, error))).into_response()
}
